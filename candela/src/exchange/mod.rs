//! Market data source abstraction and shipped exchange adapters.

use crate::interval::Interval;
use async_trait::async_trait;
use derive_more::Constructor;
use futures::stream::BoxStream;
use rust_decimal::Decimal;
use serde::Deserialize;
use smol_str::SmolStr;
use thiserror::Error;

pub mod binance;

/// Transport failure reported by a [`MarketDataSource`] implementation.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct SourceError(pub String);

impl From<reqwest::Error> for SourceError {
    fn from(value: reqwest::Error) -> Self {
        Self(value.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SourceError {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        Self(value.to_string())
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(value: serde_json::Error) -> Self {
        Self(value.to_string())
    }
}

impl From<url::ParseError> for SourceError {
    fn from(value: url::ParseError) -> Self {
        Self(value.to_string())
    }
}

/// Latest price snapshot for one symbol, used to build the symbol universe.
#[derive(Clone, Debug, PartialEq, Deserialize, Constructor)]
pub struct SymbolTicker {
    pub symbol: SmolStr,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
}

/// The narrow capability the engine's producers need from an exchange.
///
/// Authentication, reconnect policy and rate limiting beyond the engine's
/// own backfill pacing are the implementation's concern. Raw payloads are
/// passed through as [`serde_json::Value`]; the engine parses them exactly
/// once at the router boundary.
#[async_trait]
pub trait MarketDataSource: Send + Sync + 'static {
    /// Every symbol currently listed on the exchange.
    async fn fetch_symbols(&self) -> Result<Vec<SymbolTicker>, SourceError>;

    /// The most recent `window_length` klines for (symbol, interval),
    /// oldest first, as 12-field kline arrays.
    async fn fetch_history(
        &self,
        symbol: &str,
        interval: Interval,
        window_length: usize,
    ) -> Result<Vec<serde_json::Value>, SourceError>;

    /// An ordered stream of live base-resolution kline events for `symbol`.
    async fn stream_live(
        &self,
        symbol: &str,
    ) -> Result<BoxStream<'static, Result<serde_json::Value, SourceError>>, SourceError>;
}
