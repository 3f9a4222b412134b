use crate::{candle::Candle, error::EngineError, interval::Interval, registry::Registry};
use smol_str::SmolStr;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use tracing::{debug, info};

/// One item on the ingestion queue, the only path into the Router.
///
/// Historical candles address a single (symbol, interval) window; a live
/// stream update addresses every configured interval of its symbol at once,
/// since the exchange provides only one live resolution and all others are
/// derived from it.
#[derive(Clone, Debug)]
pub enum IngestItem {
    HistoricalCandle {
        symbol: SmolStr,
        interval: Interval,
        raw: serde_json::Value,
    },
    StreamCandle {
        symbol: SmolStr,
        raw: serde_json::Value,
    },
    /// Control message: the backfill for (symbol, interval) is fully
    /// enqueued, live updates may mutate that window from here on.
    HistoryComplete { symbol: SmolStr, interval: Interval },
}

/// Per-content-type processed counters, for backpressure/health reporting
/// only. Shared as explicit process-scoped state, never a static.
#[derive(Debug, Default)]
pub struct Counters {
    candle_history: AtomicU64,
    candle_stream: AtomicU64,
}

impl Counters {
    pub fn candle_history(&self) -> u64 {
        self.candle_history.load(Ordering::Relaxed)
    }

    pub fn candle_stream(&self) -> u64 {
        self.candle_stream.load(Ordering::Relaxed)
    }

    fn record_history(&self) {
        self.candle_history.fetch_add(1, Ordering::Relaxed);
    }

    fn record_stream(&self) {
        self.candle_stream.fetch_add(1, Ordering::Relaxed);
    }
}

/// Routes each queue item to the Window operation it addresses.
///
/// Runs on the single consumer task and is the only writer of Registry
/// state. Per-payload errors are returned as non-fatal and dropped by the
/// caller; structural errors propagate because the affected window can no
/// longer be trusted gap-free.
#[derive(Debug, Clone)]
pub struct Router {
    counters: Arc<Counters>,
}

impl Router {
    pub fn new(counters: Arc<Counters>) -> Self {
        Self { counters }
    }

    pub fn process(&self, item: IngestItem, registry: &mut Registry) -> Result<(), EngineError> {
        match item {
            IngestItem::HistoricalCandle {
                symbol,
                interval,
                raw,
            } => {
                let candle = Candle::parse_from_rest(raw)?;
                let window = registry
                    .symbol_mut(&symbol)
                    .and_then(|entry| entry.window_mut(interval))
                    .ok_or_else(|| {
                        EngineError::UnroutablePayload(format!(
                            "no window registered for {symbol} {interval}"
                        ))
                    })?;
                window.apply_history(candle)?;
                self.counters.record_history();
                Ok(())
            }
            IngestItem::StreamCandle { symbol, raw } => {
                let update = Candle::parse_from_stream(raw)?;
                let entry = registry.symbol_mut(&symbol).ok_or_else(|| {
                    EngineError::UnroutablePayload(format!(
                        "no symbol registered for live update on {symbol}"
                    ))
                })?;

                for window in entry.windows_mut() {
                    if !window.history_downloaded() {
                        debug!(
                            symbol = %symbol,
                            interval = %window.interval(),
                            "dropping live update for window awaiting backfill"
                        );
                        continue;
                    }
                    window.apply_stream(&update)?;
                }
                self.counters.record_stream();
                Ok(())
            }
            IngestItem::HistoryComplete { symbol, interval } => {
                let window = registry
                    .symbol_mut(&symbol)
                    .and_then(|entry| entry.window_mut(interval))
                    .ok_or_else(|| {
                        EngineError::UnroutablePayload(format!(
                            "history completion for unregistered {symbol} {interval}"
                        ))
                    })?;
                window.mark_history_downloaded();
                info!(%symbol, %interval, "historical window downloaded");
                Ok(())
            }
        }
    }
}
