use crate::{de, error::EngineError};
use chrono::{DateTime, Utc};
use derive_more::Constructor;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// 12-field kline array returned by the exchange REST history endpoint.
///
/// ### Raw Payload Example
/// ```json
/// [
///     1499040000000,      // Open time
///     "0.01634790",       // Open
///     "0.80000000",       // High
///     "0.01575800",       // Low
///     "0.01577100",       // Close
///     "148976.11427815",  // Volume
///     1499644799999,      // Close time
///     "2434.19055334",    // Quote asset volume
///     308,                // Number of trades
///     "1756.87402397",    // Taker buy base asset volume
///     "28.46694368",      // Taker buy quote asset volume
///     "17928899.62484339" // Ignore
/// ]
/// ```
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct RestKline(
    #[serde(deserialize_with = "de::de_u64_epoch_ms_as_datetime_utc")] pub DateTime<Utc>,
    #[serde(with = "rust_decimal::serde::str")] pub Decimal,
    #[serde(with = "rust_decimal::serde::str")] pub Decimal,
    #[serde(with = "rust_decimal::serde::str")] pub Decimal,
    #[serde(with = "rust_decimal::serde::str")] pub Decimal,
    #[serde(with = "rust_decimal::serde::str")] pub Decimal,
    #[serde(deserialize_with = "de::de_u64_epoch_ms_as_datetime_utc")] pub DateTime<Utc>,
    #[serde(with = "rust_decimal::serde::str")] pub Decimal,
    pub u64,
    #[serde(with = "rust_decimal::serde::str")] pub Decimal,
    #[serde(with = "rust_decimal::serde::str")] pub Decimal,
    #[serde(default)] pub serde_json::Value,
);

/// Websocket kline event delivered on the live base-resolution stream.
///
/// ### Raw Payload Example
/// ```json
/// {
///   "e": "kline",
///   "E": 123456789,
///   "s": "BNBBTC",
///   "k": {
///     "t": 123400000,
///     "T": 123460000,
///     "s": "BNBBTC",
///     "i": "1m",
///     "o": "0.0010",
///     "c": "0.0020",
///     "h": "0.0025",
///     "l": "0.0015",
///     "v": "1000",
///     "n": 100,
///     "x": false,
///     "q": "1.0000",
///     "V": "500",
///     "Q": "0.500"
///   }
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct KlineEvent {
    #[serde(alias = "E", deserialize_with = "de::de_u64_epoch_ms_as_datetime_utc")]
    pub time: DateTime<Utc>,
    #[serde(rename = "s")]
    pub symbol: SmolStr,
    #[serde(rename = "k")]
    pub kline: StreamKline,
}

/// Kline sub-object of a [`KlineEvent`].
///
/// Volume fields are cumulative since the base bucket opened, not deltas.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct StreamKline {
    #[serde(alias = "t", deserialize_with = "de::de_u64_epoch_ms_as_datetime_utc")]
    pub open_time: DateTime<Utc>,
    #[serde(alias = "T", deserialize_with = "de::de_u64_epoch_ms_as_datetime_utc")]
    pub close_time: DateTime<Utc>,
    #[serde(rename = "o", with = "rust_decimal::serde::str")]
    pub open: Decimal,
    #[serde(rename = "c", with = "rust_decimal::serde::str")]
    pub close: Decimal,
    #[serde(rename = "h", with = "rust_decimal::serde::str")]
    pub high: Decimal,
    #[serde(rename = "l", with = "rust_decimal::serde::str")]
    pub low: Decimal,
    #[serde(rename = "v", with = "rust_decimal::serde::str")]
    pub volume_base: Decimal,
    #[serde(rename = "n")]
    pub trade_count: u64,
    #[serde(rename = "x")]
    pub is_closed: bool,
    #[serde(rename = "q", with = "rust_decimal::serde::str")]
    pub volume_quote: Decimal,
    #[serde(rename = "V", with = "rust_decimal::serde::str")]
    pub volume_taker_base: Decimal,
    #[serde(rename = "Q", with = "rust_decimal::serde::str")]
    pub volume_taker_quote: Decimal,
}

/// A parsed live base-resolution update: the candle itself, whether the
/// exchange marked its bucket closed, and the event timestamp it arrived with.
#[derive(Clone, Debug, PartialEq, Constructor)]
pub struct StreamUpdate {
    pub candle: Candle,
    pub is_closed: bool,
    pub event_time: DateTime<Utc>,
}

/// A single OHLCV candlestick covering one time bucket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume_base: Decimal,
    pub volume_quote: Decimal,
    pub volume_taker_base: Decimal,
    pub volume_taker_quote: Decimal,
    pub trade_count: u64,
    /// Set by the owning Window when this candle was involved in a structural
    /// integrity failure.
    pub corrupt: bool,
}

impl Candle {
    /// Parse a historical candle from a raw REST kline array.
    ///
    /// Fails with [`EngineError::MalformedPayload`] if any field is
    /// non-numeric or a price is not positive.
    pub fn parse_from_rest(raw: serde_json::Value) -> Result<Self, EngineError> {
        let RestKline(
            open_time,
            open,
            high,
            low,
            close,
            volume_base,
            close_time,
            volume_quote,
            trade_count,
            volume_taker_base,
            volume_taker_quote,
            _ignore,
        ) = serde_json::from_value(raw)?;

        let candle = Self {
            open_time,
            close_time,
            open,
            high,
            low,
            close,
            volume_base,
            volume_quote,
            volume_taker_base,
            volume_taker_quote,
            trade_count,
            corrupt: false,
        };
        candle.validate_prices()?;
        Ok(candle)
    }

    /// Parse a live candle update from a raw websocket kline event.
    pub fn parse_from_stream(raw: serde_json::Value) -> Result<StreamUpdate, EngineError> {
        let event: KlineEvent = serde_json::from_value(raw)?;
        let kline = event.kline;

        let candle = Self {
            open_time: kline.open_time,
            close_time: kline.close_time,
            open: kline.open,
            high: kline.high,
            low: kline.low,
            close: kline.close,
            volume_base: kline.volume_base,
            volume_quote: kline.volume_quote,
            volume_taker_base: kline.volume_taker_base,
            volume_taker_quote: kline.volume_taker_quote,
            trade_count: kline.trade_count,
            corrupt: false,
        };
        candle.validate_prices()?;
        Ok(StreamUpdate::new(candle, kline.is_closed, event.time))
    }

    fn validate_prices(&self) -> Result<(), EngineError> {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.into_iter().any(|price| price <= Decimal::ZERO) {
            return Err(EngineError::MalformedPayload(format!(
                "candle opening {} contains a non-positive price",
                self.open_time
            )));
        }
        Ok(())
    }

    /// Incorporate a newer base-resolution `update` into this candle.
    ///
    /// The live stream delivers volume fields cumulative since the base bucket
    /// opened. When the previous raw sample did not close a base candle, only
    /// the `update - prev_update` delta is new volume; when it did, `update`
    /// opened a fresh base bucket and its raw values are applied directly.
    pub fn merge(
        &self,
        update: &Candle,
        prev_update: Option<&Candle>,
        prev_update_closed: bool,
    ) -> Candle {
        let mut merged = self.clone();
        merged.close = update.close;
        merged.high = self.high.max(update.high);
        merged.low = self.low.min(update.low);

        match prev_update {
            Some(prev) if !prev_update_closed => {
                merged.volume_base += update.volume_base - prev.volume_base;
                merged.volume_quote += update.volume_quote - prev.volume_quote;
                merged.volume_taker_base += update.volume_taker_base - prev.volume_taker_base;
                merged.volume_taker_quote += update.volume_taker_quote - prev.volume_taker_quote;
                merged.trade_count += update.trade_count.saturating_sub(prev.trade_count);
            }
            _ => {
                merged.volume_base += update.volume_base;
                merged.volume_quote += update.volume_quote;
                merged.volume_taker_base += update.volume_taker_base;
                merged.volume_taker_quote += update.volume_taker_quote;
                merged.trade_count += update.trade_count;
            }
        }

        merged
    }

    /// Synthesize a candle for an interval finer than the base resolution
    /// from two consecutive base updates, covering `[open_time, close_time]`.
    ///
    /// True sub-resolution OHLC is not observable from base-resolution
    /// samples: open and close are the two consecutive close prices and
    /// high/low their extremes. Volumes follow the same delta/raw switch as
    /// [`Candle::merge`].
    pub fn derive_subinterval(
        update: &Candle,
        prev_update: &Candle,
        prev_update_closed: bool,
        open_time: DateTime<Utc>,
        close_time: DateTime<Utc>,
    ) -> Candle {
        let (open, close) = (prev_update.close, update.close);

        let mut derived = Candle {
            open_time,
            close_time,
            open,
            high: open.max(close),
            low: open.min(close),
            close,
            volume_base: update.volume_base,
            volume_quote: update.volume_quote,
            volume_taker_base: update.volume_taker_base,
            volume_taker_quote: update.volume_taker_quote,
            trade_count: update.trade_count,
            corrupt: false,
        };

        if !prev_update_closed {
            derived.volume_base -= prev_update.volume_base;
            derived.volume_quote -= prev_update.volume_quote;
            derived.volume_taker_base -= prev_update.volume_taker_base;
            derived.volume_taker_quote -= prev_update.volume_taker_quote;
            derived.trade_count = update.trade_count.saturating_sub(prev_update.trade_count);
        }

        derived
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::de::datetime_utc_from_epoch_duration;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::time::Duration;

    fn time(epoch_ms: u64) -> DateTime<Utc> {
        datetime_utc_from_epoch_duration(Duration::from_millis(epoch_ms))
    }

    fn update(close: Decimal, volume_base: Decimal, trade_count: u64) -> Candle {
        Candle {
            open_time: time(1_577_836_800_000),
            close_time: time(1_577_836_859_999),
            open: dec!(100),
            high: close.max(dec!(100)),
            low: close.min(dec!(100)),
            close,
            volume_base,
            volume_quote: volume_base * close,
            volume_taker_base: volume_base / dec!(2),
            volume_taker_quote: volume_base * close / dec!(2),
            trade_count,
            corrupt: false,
        }
    }

    #[test]
    fn test_candle_parse_from_rest() {
        struct TestCase {
            input: serde_json::Value,
            expected: Option<Candle>,
        }

        let tests = vec![
            // TC0: valid kline array round-trips every field
            TestCase {
                input: json!([
                    1499040000000u64,
                    "0.01634790",
                    "0.80000000",
                    "0.01575800",
                    "0.01577100",
                    "148976.11427815",
                    1499644799999u64,
                    "2434.19055334",
                    308,
                    "1756.87402397",
                    "28.46694368",
                    "17928899.62484339"
                ]),
                expected: Some(Candle {
                    open_time: time(1_499_040_000_000),
                    close_time: time(1_499_644_799_999),
                    open: dec!(0.01634790),
                    high: dec!(0.80000000),
                    low: dec!(0.01575800),
                    close: dec!(0.01577100),
                    volume_base: dec!(148976.11427815),
                    volume_quote: dec!(2434.19055334),
                    volume_taker_base: dec!(1756.87402397),
                    volume_taker_quote: dec!(28.46694368),
                    trade_count: 308,
                    corrupt: false,
                }),
            },
            // TC1: non-numeric price field is malformed
            TestCase {
                input: json!([
                    1499040000000u64,
                    "not-a-number",
                    "0.80000000",
                    "0.01575800",
                    "0.01577100",
                    "148976.11427815",
                    1499644799999u64,
                    "2434.19055334",
                    308,
                    "1756.87402397",
                    "28.46694368",
                    "17928899.62484339"
                ]),
                expected: None,
            },
            // TC2: non-positive price is malformed
            TestCase {
                input: json!([
                    1499040000000u64,
                    "0.00000000",
                    "0.80000000",
                    "0.01575800",
                    "0.01577100",
                    "148976.11427815",
                    1499644799999u64,
                    "2434.19055334",
                    308,
                    "1756.87402397",
                    "28.46694368",
                    "17928899.62484339"
                ]),
                expected: None,
            },
            // TC3: truncated array is malformed
            TestCase {
                input: json!([1499040000000u64, "0.01634790"]),
                expected: None,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = Candle::parse_from_rest(test.input);
            match (actual, test.expected) {
                (Ok(actual), Some(expected)) => assert_eq!(actual, expected, "TC{index} failed"),
                (Err(EngineError::MalformedPayload(_)), None) => {}
                (actual, expected) => panic!(
                    "TC{index} failed because actual != expected. \nActual: {actual:?}\nExpected: {expected:?}\n"
                ),
            }
        }
    }

    #[test]
    fn test_candle_parse_from_stream() {
        let raw = json!({
            "e": "kline",
            "E": 1577836801234u64,
            "s": "BTCUSDT",
            "k": {
                "t": 1577836800000u64,
                "T": 1577836859999u64,
                "s": "BTCUSDT",
                "i": "1m",
                "f": 100,
                "L": 200,
                "o": "7195.24",
                "c": "7196.25",
                "h": "7196.25",
                "l": "7195.24",
                "v": "51.42",
                "n": 18,
                "x": false,
                "q": "370046.45",
                "V": "27.31",
                "Q": "196542.06",
                "B": "123456"
            }
        });

        let actual = Candle::parse_from_stream(raw).expect("valid kline event");
        assert_eq!(actual.event_time, time(1_577_836_801_234));
        assert!(!actual.is_closed);
        assert_eq!(actual.candle.open_time, time(1_577_836_800_000));
        assert_eq!(actual.candle.close_time, time(1_577_836_859_999));
        assert_eq!(actual.candle.open, dec!(7195.24));
        assert_eq!(actual.candle.close, dec!(7196.25));
        assert_eq!(actual.candle.volume_base, dec!(51.42));
        assert_eq!(actual.candle.volume_taker_quote, dec!(196542.06));
        assert_eq!(actual.candle.trade_count, 18);
    }

    #[test]
    fn test_candle_merge_is_idempotent_under_noop_update() {
        let base = update(dec!(101), dec!(10), 5);
        let noop = base.clone();

        // A prev_update equal to the update itself makes every delta zero.
        let merged = base.merge(&noop, Some(&noop), false);
        assert_eq!(merged, base);
    }

    #[test]
    fn test_candle_merge_volume_switch() {
        struct TestCase {
            prev_update_closed: bool,
            expected_volume: Decimal,
            expected_trades: u64,
        }

        let base = update(dec!(100), dec!(10), 10);
        let prev = update(dec!(100.5), dec!(4), 4);
        let next = update(dec!(101), dec!(6), 7);

        let tests = vec![
            // TC0: previous sample still open, apply the cumulative delta
            TestCase {
                prev_update_closed: false,
                expected_volume: dec!(12),
                expected_trades: 13,
            },
            // TC1: previous sample closed its base bucket, apply raw values
            TestCase {
                prev_update_closed: true,
                expected_volume: dec!(16),
                expected_trades: 17,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let merged = base.merge(&next, Some(&prev), test.prev_update_closed);
            assert_eq!(merged.volume_base, test.expected_volume, "TC{index} failed");
            assert_eq!(merged.trade_count, test.expected_trades, "TC{index} failed");
            assert_eq!(merged.close, dec!(101), "TC{index} failed");
            assert_eq!(merged.high, dec!(101), "TC{index} failed");
            assert_eq!(merged.low, dec!(100), "TC{index} failed");
        }
    }

    #[test]
    fn test_candle_derive_subinterval_volume_conservation() {
        let prev = update(dec!(100.5), dec!(4), 4);
        let next = update(dec!(101), dec!(6), 7);
        let (open_time, close_time) = (time(1_577_836_800_000), time(1_577_836_801_999));

        // First sample not closed: the synthetic candle carries the delta.
        let derived = Candle::derive_subinterval(&next, &prev, false, open_time, close_time);
        assert_eq!(derived.volume_base, next.volume_base - prev.volume_base);
        assert_eq!(derived.trade_count, 3);
        assert_eq!(derived.open, dec!(100.5));
        assert_eq!(derived.close, dec!(101));
        assert_eq!(derived.high, dec!(101));
        assert_eq!(derived.low, dec!(100.5));
        assert_eq!(derived.open_time, open_time);
        assert_eq!(derived.close_time, close_time);

        // First sample closed: the synthetic candle carries raw values.
        let derived = Candle::derive_subinterval(&next, &prev, true, open_time, close_time);
        assert_eq!(derived.volume_base, next.volume_base);
        assert_eq!(derived.trade_count, 7);
    }
}
