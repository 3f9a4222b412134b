//! # Candela
//! Real-time multi-resolution candlestick aggregation engine for
//! cryptocurrency market data.
//!
//! Candela ingests one continuous stream of base-resolution (1-minute) kline
//! updates per trading pair and derives, in real time, a consistent family of
//! coarser-interval candles (3m, 5m, 15m, 1h, ... up to multi-day) plus a
//! synthetic sub-minute (2-second) candle, while absorbing a bulk historical
//! backfill for every interval without producing duplicate, out-of-order, or
//! inconsistent data.
//!
//! ## Architecture
//! Many producer tasks (one historical download and one live stream per
//! symbol) funnel into a single ordered queue drained by exactly one consumer
//! that owns all window state:
//!
//! producers -> queue -> [`Router`](router::Router) ->
//! [`Window`](window::Window) -> [`TimeFrame`](timeframe::TimeFrame) ->
//! [`Candle`](candle::Candle)
//!
//! The single-consumer design is deliberate: bucket classification reads the
//! last TimeFrame before writing, so two interleaved writers could both
//! observe the same bucket and double-apply. Making the queue the single
//! serialization point removes the need for per-window locks. Live updates
//! for a window are gated until its backfill completed, so a live roll-over
//! can never race ahead of the historical seed.
//!
//! ## Example
//! ```rust,no_run
//! use candela::{
//!     config::EngineConfig, engine::Engine, error::EngineError,
//!     exchange::binance::BinanceMarketData, interval::Interval,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), EngineError> {
//!     let config = EngineConfig::default()
//!         .with_assets(&["BTC", "ETH"], &["USDT"])
//!         .with_window(Interval::S2, 300)
//!         .with_window(Interval::H1, 100);
//!
//!     let engine = Engine::new(config, BinanceMarketData::new())?;
//!     let registry = engine.run().await?;
//!
//!     if let Some(window) = registry.get("BTCUSDT", Interval::H1) {
//!         for timeframe in window.timeframes() {
//!             println!("{:?}", timeframe.candle());
//!         }
//!     }
//!     Ok(())
//! }
//! ```

/// OHLCV candle value type, wire payload models and the merge/derive rules.
pub mod candle;

/// User-facing engine options and symbol universe filtering.
pub mod config;

/// Deserialization utilities for exchange wire formats.
pub mod de;

/// Backfill/stream coordinator: producers, ingestion queue, single consumer.
pub mod engine;

/// All errors generated by the engine.
pub mod error;

/// Market data source abstraction and shipped exchange adapters.
pub mod exchange;

/// The closed set of candlestick bucket durations.
pub mod interval;

/// Symbol registry: the addressing scheme from payload to window.
pub mod registry;

/// Payload classification and dispatch onto window operations.
pub mod router;

/// A single time bucket and its lifecycle.
pub mod timeframe;

/// Bounded per-(symbol, interval) TimeFrame history and roll-over logic.
pub mod window;

pub use crate::{
    candle::{Candle, StreamUpdate},
    config::EngineConfig,
    engine::{Engine, ShutdownHandle},
    error::EngineError,
    exchange::{MarketDataSource, SourceError, SymbolTicker},
    interval::Interval,
    registry::Registry,
    router::{Counters, IngestItem, Router},
    timeframe::TimeFrame,
    window::{Placement, Window},
};
