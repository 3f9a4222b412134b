use crate::error::EngineError;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The base resolution delivered by the exchange live stream.
///
/// Every coarser interval is aggregated from it, and every finer interval is
/// synthesized from consecutive updates of it.
pub const BASE_INTERVAL: Interval = Interval::M1;

/// Fixed, closed set of candlestick bucket durations.
///
/// The set mirrors the exchange kline intervals plus the synthetic 2-second
/// interval derived from the live update cadence.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
pub enum Interval {
    #[serde(rename = "2s")]
    S2,
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "3m")]
    M3,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "2h")]
    H2,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "6h")]
    H6,
    #[serde(rename = "8h")]
    H8,
    #[serde(rename = "12h")]
    H12,
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "3d")]
    D3,
    #[serde(rename = "1w")]
    W1,
}

impl Interval {
    /// Every supported interval, finest first.
    pub const ALL: [Interval; 15] = [
        Interval::S2,
        Interval::M1,
        Interval::M3,
        Interval::M5,
        Interval::M15,
        Interval::M30,
        Interval::H1,
        Interval::H2,
        Interval::H4,
        Interval::H6,
        Interval::H8,
        Interval::H12,
        Interval::D1,
        Interval::D3,
        Interval::W1,
    ];

    /// Bucket duration in milliseconds.
    pub const fn duration_ms(&self) -> i64 {
        match self {
            Interval::S2 => 2_000,
            Interval::M1 => 60_000,
            Interval::M3 => 180_000,
            Interval::M5 => 300_000,
            Interval::M15 => 900_000,
            Interval::M30 => 1_800_000,
            Interval::H1 => 3_600_000,
            Interval::H2 => 7_200_000,
            Interval::H4 => 14_400_000,
            Interval::H6 => 21_600_000,
            Interval::H8 => 28_800_000,
            Interval::H12 => 43_200_000,
            Interval::D1 => 86_400_000,
            Interval::D3 => 259_200_000,
            Interval::W1 => 604_800_000,
        }
    }

    /// Bucket duration as a [`TimeDelta`].
    pub fn duration(&self) -> TimeDelta {
        TimeDelta::milliseconds(self.duration_ms())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::S2 => "2s",
            Interval::M1 => "1m",
            Interval::M3 => "3m",
            Interval::M5 => "5m",
            Interval::M15 => "15m",
            Interval::M30 => "30m",
            Interval::H1 => "1h",
            Interval::H2 => "2h",
            Interval::H4 => "4h",
            Interval::H6 => "6h",
            Interval::H8 => "8h",
            Interval::H12 => "12h",
            Interval::D1 => "1d",
            Interval::D3 => "3d",
            Interval::W1 => "1w",
        }
    }

    /// True for intervals finer than [`BASE_INTERVAL`], which cannot be
    /// backfilled upstream and are synthesized from live updates instead.
    pub const fn is_derived(&self) -> bool {
        self.duration_ms() < BASE_INTERVAL.duration_ms()
    }

    /// Recover the interval from candle bucket bounds, where the bucket spans
    /// `[open_time, close_time]` inclusive (duration minus one millisecond).
    pub fn from_bucket(open_time: DateTime<Utc>, close_time: DateTime<Utc>) -> Option<Interval> {
        let span_ms = (close_time - open_time).num_milliseconds() + 1;
        Interval::ALL
            .into_iter()
            .find(|interval| interval.duration_ms() == span_ms)
    }

    /// Floor `time` to the start of the bucket containing it, on a grid
    /// anchored at the unix epoch.
    pub fn align(&self, time: DateTime<Utc>) -> DateTime<Utc> {
        let ms = time.timestamp_millis();
        let aligned = ms - ms.rem_euclid(self.duration_ms());
        DateTime::UNIX_EPOCH + TimeDelta::milliseconds(aligned)
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Interval {
    type Err = EngineError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Interval::ALL
            .into_iter()
            .find(|interval| interval.as_str() == input)
            .ok_or_else(|| EngineError::Configuration(format!("invalid interval: {input}")))
    }
}
