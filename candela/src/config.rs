use crate::{error::EngineError, interval::Interval};
use smol_str::SmolStr;
use std::time::Duration;
use vecmap::VecMap;

/// Maximum retained history per (symbol, interval) window.
pub const MAX_WINDOW_LENGTH: usize = 500;

/// Default pause between historical window downloads per symbol, respecting
/// upstream rate limits.
pub const DEFAULT_HISTORY_PACE: Duration = Duration::from_secs(5);

/// Matches any asset in a base or quote filter.
pub const WILDCARD_ASSET: &str = "*";

/// User-facing engine options, read-only for the engine's lifetime.
///
/// The tracked symbol universe is every exchange symbol whose quote asset is
/// listed in `quote_assets` and whose remaining prefix is listed in
/// `base_assets` (either side may be the `"*"` wildcard).
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub base_assets: Vec<SmolStr>,
    pub quote_assets: Vec<SmolStr>,
    /// Interval -> number of TimeFrames to retain.
    pub windows: VecMap<Interval, usize>,
    pub history_pace: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_assets: vec![SmolStr::new("BTC")],
            quote_assets: vec![SmolStr::new("USDT")],
            windows: VecMap::from_iter([(Interval::M1, 500), (Interval::M15, 200)]),
            history_pace: DEFAULT_HISTORY_PACE,
        }
    }
}

impl EngineConfig {
    pub fn with_window(mut self, interval: Interval, window_length: usize) -> Self {
        self.windows.insert(interval, window_length);
        self
    }

    pub fn with_assets(mut self, base_assets: &[&str], quote_assets: &[&str]) -> Self {
        self.base_assets = base_assets.iter().map(|asset| SmolStr::new(asset)).collect();
        self.quote_assets = quote_assets.iter().map(|asset| SmolStr::new(asset)).collect();
        self
    }

    pub fn with_history_pace(mut self, history_pace: Duration) -> Self {
        self.history_pace = history_pace;
        self
    }

    /// Validate raw user input before any producer or consumer starts.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.windows.is_empty() {
            return Err(EngineError::Configuration(
                "option `windows` must configure at least one interval".to_string(),
            ));
        }
        for (interval, window_length) in self.windows.iter() {
            if !(1..=MAX_WINDOW_LENGTH).contains(window_length) {
                return Err(EngineError::Configuration(format!(
                    "invalid window length {window_length} for interval {interval}: \
                     must be between 1 and {MAX_WINDOW_LENGTH}"
                )));
            }
        }
        Self::validate_assets("base_assets", &self.base_assets)?;
        Self::validate_assets("quote_assets", &self.quote_assets)?;
        Ok(())
    }

    fn validate_assets(option: &str, assets: &[SmolStr]) -> Result<(), EngineError> {
        if assets.is_empty() {
            return Err(EngineError::Configuration(format!(
                "option `{option}` must list at least one asset"
            )));
        }
        for asset in assets {
            let valid = asset == WILDCARD_ASSET
                || (!asset.is_empty()
                    && asset.len() < 10
                    && asset.chars().all(|c| c.is_ascii_alphabetic()));
            if !valid {
                return Err(EngineError::Configuration(format!(
                    "invalid input {asset:?} for option `{option}`"
                )));
            }
        }
        Ok(())
    }

    /// Select the tracked symbols out of the full exchange symbol universe.
    pub fn filter_symbols(&self, all_symbols: impl IntoIterator<Item = SmolStr>) -> Vec<SmolStr> {
        let any_base = self.base_assets.iter().any(|asset| asset == WILDCARD_ASSET);
        let any_quote = self.quote_assets.iter().any(|asset| asset == WILDCARD_ASSET);

        all_symbols
            .into_iter()
            .filter(|symbol| {
                if any_quote {
                    return any_base
                        || self
                            .base_assets
                            .iter()
                            .any(|base| symbol.starts_with(base.as_str()));
                }
                self.quote_assets.iter().any(|quote| {
                    symbol.strip_suffix(quote.as_str()).is_some_and(|prefix| {
                        !prefix.is_empty()
                            && (any_base
                                || self.base_assets.iter().any(|base| base == prefix))
                    })
                })
            })
            .collect()
    }

    /// The (interval, window length) backfill plan, finest interval first,
    /// excluding derived intervals that have no upstream history.
    pub fn history_plan(&self) -> Vec<(Interval, usize)> {
        let mut plan: Vec<(Interval, usize)> = self
            .windows
            .iter()
            .filter(|(interval, _)| !interval.is_derived())
            .map(|(interval, window_length)| (*interval, *window_length))
            .collect();
        plan.sort_by_key(|(interval, _)| *interval);
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbols(raw: &[&str]) -> Vec<SmolStr> {
        raw.iter().map(|s| SmolStr::new(s)).collect()
    }

    #[test]
    fn test_config_validate() {
        struct TestCase {
            input: EngineConfig,
            expected_ok: bool,
        }

        let tests = vec![
            // TC0: defaults are valid
            TestCase {
                input: EngineConfig::default(),
                expected_ok: true,
            },
            // TC1: zero-length window rejected
            TestCase {
                input: EngineConfig::default().with_window(Interval::H1, 0),
                expected_ok: false,
            },
            // TC2: window length above the retention cap rejected
            TestCase {
                input: EngineConfig::default().with_window(Interval::H1, MAX_WINDOW_LENGTH + 1),
                expected_ok: false,
            },
            // TC3: non-alphabetic asset rejected
            TestCase {
                input: EngineConfig::default().with_assets(&["BTC1"], &["USDT"]),
                expected_ok: false,
            },
            // TC4: wildcard asset accepted
            TestCase {
                input: EngineConfig::default().with_assets(&["*"], &["USDT"]),
                expected_ok: true,
            },
            // TC5: empty asset list rejected
            TestCase {
                input: EngineConfig::default().with_assets(&["BTC"], &[]),
                expected_ok: false,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = test.input.validate();
            assert_eq!(actual.is_ok(), test.expected_ok, "TC{index} failed: {actual:?}");
        }
    }

    #[test]
    fn test_config_filter_symbols() {
        struct TestCase {
            base: Vec<&'static str>,
            quote: Vec<&'static str>,
            expected: Vec<&'static str>,
        }

        let universe = symbols(&["BTCUSDT", "ETHUSDT", "ETHBTC", "BNBBUSD", "USDTBTC"]);

        let tests = vec![
            // TC0: single base and quote pair
            TestCase {
                base: vec!["BTC"],
                quote: vec!["USDT"],
                expected: vec!["BTCUSDT"],
            },
            // TC1: multiple bases against one quote
            TestCase {
                base: vec!["BTC", "ETH"],
                quote: vec!["USDT"],
                expected: vec!["BTCUSDT", "ETHUSDT"],
            },
            // TC2: wildcard base selects every symbol with the quote suffix
            TestCase {
                base: vec!["*"],
                quote: vec!["USDT"],
                expected: vec!["BTCUSDT", "ETHUSDT"],
            },
            // TC3: multiple quotes
            TestCase {
                base: vec!["ETH", "BNB"],
                quote: vec!["BTC", "BUSD"],
                expected: vec!["ETHBTC", "BNBBUSD"],
            },
            // TC4: wildcard on both sides selects everything
            TestCase {
                base: vec!["*"],
                quote: vec!["*"],
                expected: vec!["BTCUSDT", "ETHUSDT", "ETHBTC", "BNBBUSD", "USDTBTC"],
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let config = EngineConfig::default()
                .with_assets(&test.base, &test.quote);
            let actual = config.filter_symbols(universe.clone());
            assert_eq!(actual, symbols(&test.expected), "TC{index} failed");
        }
    }

    #[test]
    fn test_config_history_plan_skips_derived_intervals() {
        let config = EngineConfig::default()
            .with_window(Interval::S2, 100)
            .with_window(Interval::H1, 50);

        let plan = config.history_plan();
        assert_eq!(
            plan,
            vec![(Interval::M1, 500), (Interval::M15, 200), (Interval::H1, 50)]
        );
    }
}
