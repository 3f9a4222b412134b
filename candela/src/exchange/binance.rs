//! Binance public market data endpoints.
//!
//! See docs: <https://developers.binance.com/docs/binance-spot-api-docs>

use super::{MarketDataSource, SourceError, SymbolTicker};
use crate::interval::Interval;
use async_trait::async_trait;
use futures::{StreamExt, stream::BoxStream};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::Url;

/// Binance REST base url.
///
/// See docs: <https://developers.binance.com/docs/binance-spot-api-docs/rest-api>
pub const BASE_URL_BINANCE_REST: &str = "https://api.binance.com";

/// Binance websocket market streams base url.
///
/// See docs: <https://developers.binance.com/docs/binance-spot-api-docs/web-socket-streams>
pub const BASE_URL_BINANCE_WS: &str = "wss://stream.binance.com:9443/ws";

/// Public (unauthenticated) Binance spot market data.
#[derive(Debug, Clone, Default)]
pub struct BinanceMarketData {
    http: reqwest::Client,
}

impl BinanceMarketData {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MarketDataSource for BinanceMarketData {
    async fn fetch_symbols(&self) -> Result<Vec<SymbolTicker>, SourceError> {
        let tickers = self
            .http
            .get(format!("{BASE_URL_BINANCE_REST}/api/v3/ticker/price"))
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<SymbolTicker>>()
            .await?;
        Ok(tickers)
    }

    async fn fetch_history(
        &self,
        symbol: &str,
        interval: Interval,
        window_length: usize,
    ) -> Result<Vec<serde_json::Value>, SourceError> {
        let limit = window_length.to_string();
        let klines = self
            .http
            .get(format!("{BASE_URL_BINANCE_REST}/api/v3/klines"))
            .query(&[
                ("symbol", symbol),
                ("interval", interval.as_str()),
                ("limit", limit.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<serde_json::Value>>()
            .await?;
        Ok(klines)
    }

    async fn stream_live(
        &self,
        symbol: &str,
    ) -> Result<BoxStream<'static, Result<serde_json::Value, SourceError>>, SourceError> {
        let url = Url::parse(&format!(
            "{BASE_URL_BINANCE_WS}/{}@kline_1m",
            symbol.to_lowercase()
        ))?;
        let (ws_stream, _) = connect_async(url.as_str()).await?;

        let stream = ws_stream
            .filter_map(|message| async move {
                match message {
                    Ok(Message::Text(text)) => {
                        Some(serde_json::from_str(&text).map_err(SourceError::from))
                    }
                    Ok(Message::Ping(_) | Message::Pong(_)) => None,
                    Ok(Message::Close(frame)) => {
                        warn!(?frame, "kline stream closed by exchange");
                        None
                    }
                    Ok(other) => {
                        debug!(?other, "ignoring non-text kline stream message");
                        None
                    }
                    Err(error) => Some(Err(SourceError::from(error))),
                }
            })
            .boxed();
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binance_kline_stream_url_shape() {
        let url = Url::parse(&format!("{BASE_URL_BINANCE_WS}/{}@kline_1m", "BTCUSDT".to_lowercase()))
            .expect("static url shape");
        assert_eq!(url.as_str(), "wss://stream.binance.com:9443/ws/btcusdt@kline_1m");
    }
}
