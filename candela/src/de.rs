//! Deserialization utilities for exchange wire formats.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// Deserialize a `u64` millisecond unix epoch timestamp as a
/// `DateTime<Utc>`.
pub fn de_u64_epoch_ms_as_datetime_utc<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let epoch_ms = u64::deserialize(deserializer)?;
    Ok(datetime_utc_from_epoch_duration(Duration::from_millis(epoch_ms)))
}

/// Construct a `DateTime<Utc>` from the `Duration` since the unix epoch.
pub fn datetime_utc_from_epoch_duration(duration: Duration) -> DateTime<Utc> {
    DateTime::UNIX_EPOCH + TimeDelta::milliseconds(duration.as_millis() as i64)
}
