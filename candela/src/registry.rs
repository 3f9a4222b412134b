use crate::{config::EngineConfig, interval::Interval, window::Window};
use fnv::FnvHashMap;
use smol_str::SmolStr;
use vecmap::VecMap;

/// All windows and related state for a single trading pair, like BTCUSDT.
#[derive(Clone, Debug)]
pub struct SymbolWindows {
    symbol: SmolStr,
    windows: VecMap<Interval, Window>,
}

impl SymbolWindows {
    /// Build one Window per configured interval.
    pub fn new(symbol: SmolStr, config: &EngineConfig) -> Self {
        let windows = config
            .windows
            .iter()
            .map(|(interval, window_length)| {
                (*interval, Window::new(symbol.clone(), *interval, *window_length))
            })
            .collect();
        Self { symbol, windows }
    }

    pub fn symbol(&self) -> &SmolStr {
        &self.symbol
    }

    pub fn window(&self, interval: Interval) -> Option<&Window> {
        self.windows.get(&interval)
    }

    pub(crate) fn window_mut(&mut self, interval: Interval) -> Option<&mut Window> {
        self.windows.get_mut(&interval)
    }

    /// Windows in configured interval order.
    pub fn windows(&self) -> impl Iterator<Item = &Window> {
        self.windows.values()
    }

    pub(crate) fn windows_mut(&mut self) -> impl Iterator<Item = &mut Window> {
        self.windows.values_mut()
    }
}

/// The root of the data model: symbol -> [`SymbolWindows`].
///
/// Built once at startup from the filtered symbol universe and owned
/// exclusively by the consumer task; readers receive it back on shutdown or
/// access it through the read-only getters between processing steps.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    symbols: FnvHashMap<SmolStr, SymbolWindows>,
}

impl Registry {
    pub fn new(symbols: impl IntoIterator<Item = SmolStr>, config: &EngineConfig) -> Self {
        Self {
            symbols: symbols
                .into_iter()
                .map(|symbol| (symbol.clone(), SymbolWindows::new(symbol, config)))
                .collect(),
        }
    }

    /// Read-only access to one (symbol, interval) window; its TimeFrames
    /// iterate oldest to newest.
    pub fn get(&self, symbol: &str, interval: Interval) -> Option<&Window> {
        self.symbols.get(symbol).and_then(|entry| entry.window(interval))
    }

    pub fn symbol(&self, symbol: &str) -> Option<&SymbolWindows> {
        self.symbols.get(symbol)
    }

    pub(crate) fn symbol_mut(&mut self, symbol: &str) -> Option<&mut SymbolWindows> {
        self.symbols.get_mut(symbol)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &SymbolWindows> {
        self.symbols.values()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_one_window_per_configured_interval() {
        let config = EngineConfig::default().with_window(Interval::S2, 100);
        let registry = Registry::new([SmolStr::new("BTCUSDT"), SmolStr::new("ETHUSDT")], &config);

        assert_eq!(registry.len(), 2);
        for symbol in ["BTCUSDT", "ETHUSDT"] {
            let entry = registry.symbol(symbol).expect("registered at startup");
            assert_eq!(entry.windows().count(), config.windows.len());
            for (interval, window_length) in config.windows.iter() {
                let window = entry.window(*interval).expect("configured interval");
                assert_eq!(window.interval(), *interval);
                assert_eq!(window.capacity(), *window_length);
                assert_eq!(window.symbol(), symbol);
            }
        }

        assert!(registry.get("BTCUSDT", Interval::M1).is_some());
        assert!(registry.get("BTCUSDT", Interval::H4).is_none());
        assert!(registry.get("DOGEUSDT", Interval::M1).is_none());
    }
}
