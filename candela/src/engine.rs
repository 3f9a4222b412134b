use crate::{
    config::EngineConfig,
    error::EngineError,
    exchange::MarketDataSource,
    interval::Interval,
    registry::Registry,
    router::{Counters, IngestItem, Router},
};
use futures::StreamExt;
use smol_str::SmolStr;
use std::{sync::Arc, time::Duration};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Requests a graceful engine shutdown: producers finish their current
/// network await and exit, the consumer stops accepting new work and
/// discards anything still queued.
#[derive(Debug, Clone)]
pub struct ShutdownHandle(watch::Sender<bool>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.0.send(true);
    }
}

/// The backfill/stream coordinator.
///
/// Spawns one historical-download task and one live-stream task per tracked
/// symbol, all funneling into a single ordered queue drained by exactly one
/// consumer that owns every Window. The queue is the only shared mutable
/// structure; everything downstream of it needs no locks, only the FIFO
/// ordering and the `history_downloaded` gate.
pub struct Engine<Source> {
    config: EngineConfig,
    source: Arc<Source>,
    counters: Arc<Counters>,
    shutdown_tx: watch::Sender<bool>,
}

impl<Source> Engine<Source>
where
    Source: MarketDataSource,
{
    /// Validates the configuration before any task can start.
    pub fn new(config: EngineConfig, source: Source) -> Result<Self, EngineError> {
        config.validate()?;
        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            config,
            source: Arc::new(source),
            counters: Arc::new(Counters::default()),
            shutdown_tx,
        })
    }

    /// Processed-item counters, readable while the engine runs.
    pub fn counters(&self) -> Arc<Counters> {
        Arc::clone(&self.counters)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.shutdown_tx.clone())
    }

    /// Build the registry and run producers plus the consumer until every
    /// producer finished, a fatal pipeline error surfaced, or shutdown was
    /// requested. Returns the registry for final read-only inspection.
    pub async fn run(self) -> Result<Registry, EngineError> {
        let tickers = self
            .source
            .fetch_symbols()
            .await
            .map_err(|error| EngineError::Source(error.to_string()))?;
        let selected = self
            .config
            .filter_symbols(tickers.into_iter().map(|ticker| ticker.symbol));
        if selected.is_empty() {
            return Err(EngineError::Configuration(
                "asset filters selected no symbols".to_string(),
            ));
        }
        info!(n_symbols = selected.len(), "tracking symbols");

        let registry = Registry::new(selected.iter().cloned(), &self.config);
        let history_plan = self.config.history_plan();
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();

        for symbol in selected {
            tokio::spawn(history_producer(
                Arc::clone(&self.source),
                symbol.clone(),
                history_plan.clone(),
                self.config.history_pace,
                queue_tx.clone(),
                self.shutdown_tx.subscribe(),
            ));
            tokio::spawn(stream_producer(
                Arc::clone(&self.source),
                symbol,
                queue_tx.clone(),
                self.shutdown_tx.subscribe(),
            ));
        }
        drop(queue_tx);

        let router = Router::new(Arc::clone(&self.counters));
        consume(queue_rx, router, registry, self.shutdown_tx.subscribe()).await
    }
}

/// Downloads the backfill for one symbol, one interval at a time, oldest
/// candle first, followed by a completion control message per interval and a
/// pacing pause between intervals.
async fn history_producer<Source>(
    source: Arc<Source>,
    symbol: SmolStr,
    history_plan: Vec<(Interval, usize)>,
    pace: Duration,
    queue_tx: mpsc::UnboundedSender<IngestItem>,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    Source: MarketDataSource,
{
    for (interval, window_length) in history_plan {
        if *shutdown_rx.borrow() {
            return;
        }

        match source.fetch_history(&symbol, interval, window_length).await {
            Ok(klines) => {
                debug!(%symbol, %interval, n_klines = klines.len(), "downloaded historical window");
                for raw in klines {
                    let item = IngestItem::HistoricalCandle {
                        symbol: symbol.clone(),
                        interval,
                        raw,
                    };
                    if queue_tx.send(item).is_err() {
                        return;
                    }
                }
                let complete = IngestItem::HistoryComplete {
                    symbol: symbol.clone(),
                    interval,
                };
                if queue_tx.send(complete).is_err() {
                    return;
                }
            }
            Err(error) => {
                error!(%symbol, %interval, %error, "historical download failed");
                return;
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(pace) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    return;
                }
            }
        }
    }
}

/// Forwards live kline events for one symbol onto the queue until the
/// stream ends or shutdown is requested.
async fn stream_producer<Source>(
    source: Arc<Source>,
    symbol: SmolStr,
    queue_tx: mpsc::UnboundedSender<IngestItem>,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    Source: MarketDataSource,
{
    let mut stream = match source.stream_live(&symbol).await {
        Ok(stream) => stream,
        Err(error) => {
            error!(%symbol, %error, "failed to open live kline stream");
            return;
        }
    };

    loop {
        tokio::select! {
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    return;
                }
            }
            next = stream.next() => match next {
                Some(Ok(raw)) => {
                    let item = IngestItem::StreamCandle {
                        symbol: symbol.clone(),
                        raw,
                    };
                    if queue_tx.send(item).is_err() {
                        return;
                    }
                }
                Some(Err(error)) => {
                    warn!(%symbol, %error, "live kline stream error");
                }
                None => {
                    info!(%symbol, "live kline stream ended");
                    return;
                }
            }
        }
    }
}

/// The single consumer: drains the queue strictly in FIFO order and applies
/// each item through the Router. Non-fatal errors drop the one payload;
/// fatal errors are returned to the orchestration layer because the
/// affected window's state can no longer be trusted.
async fn consume(
    mut queue_rx: mpsc::UnboundedReceiver<IngestItem>,
    router: Router,
    mut registry: Registry,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<Registry, EngineError> {
    loop {
        tokio::select! {
            biased;

            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    info!("shutdown requested, discarding queued items");
                    break;
                }
            }
            item = queue_rx.recv() => match item {
                Some(item) => {
                    if let Err(error) = router.process(item, &mut registry) {
                        if error.is_fatal() {
                            error!(%error, "pipeline integrity error");
                            return Err(error);
                        }
                        warn!(%error, "dropped payload");
                    }
                }
                None => break,
            }
        }
    }
    Ok(registry)
}
