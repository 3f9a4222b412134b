use crate::{candle::Candle, error::EngineError};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

/// One time bucket within a `Window`, spanning `[open_time, close_time]`
/// inclusive (bucket duration minus one millisecond, the exchange kline
/// convention).
///
/// A TimeFrame is created empty, populated once (historical) or incrementally
/// (live), and becomes read-only once a successor bucket is appended to the
/// owning Window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TimeFrame {
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    candle: Option<Candle>,
}

impl TimeFrame {
    pub fn new(open_time: DateTime<Utc>, close_time: DateTime<Utc>) -> Self {
        Self {
            open_time,
            close_time,
            candle: None,
        }
    }

    /// The deterministic successor bucket: opens one millisecond after this
    /// bucket closes and spans the same duration.
    pub fn next_timeframe(&self) -> TimeFrame {
        let milli = TimeDelta::milliseconds(1);
        let delta = self.close_time - self.open_time;
        TimeFrame::new(self.close_time + milli, self.close_time + milli + delta)
    }

    pub fn candle(&self) -> Option<&Candle> {
        self.candle.as_ref()
    }

    /// Assign the first candle of this bucket. Occupied buckets reject the
    /// write: a populated frame is only ever advanced through [`replace`].
    ///
    /// [`replace`]: TimeFrame::replace
    pub fn insert(&mut self, candle: Candle) -> Result<(), EngineError> {
        if self.candle.is_some() {
            return Err(EngineError::InvalidRetroactiveWrite(format!(
                "bucket opening {} already holds a candle",
                self.open_time
            )));
        }
        self.candle = Some(candle);
        Ok(())
    }

    /// Advance the candle of an already-populated bucket (live merge writes).
    pub fn replace(&mut self, candle: Candle) -> Result<(), EngineError> {
        if self.candle.is_none() {
            return Err(EngineError::InvalidRetroactiveWrite(format!(
                "bucket opening {} holds no candle to update",
                self.open_time
            )));
        }
        self.candle = Some(candle);
        Ok(())
    }

    pub(crate) fn mark_corrupt(&mut self) {
        if let Some(candle) = self.candle.as_mut() {
            candle.corrupt = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::de::datetime_utc_from_epoch_duration;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn time(epoch_ms: u64) -> DateTime<Utc> {
        datetime_utc_from_epoch_duration(Duration::from_millis(epoch_ms))
    }

    fn candle(open_time: DateTime<Utc>, close_time: DateTime<Utc>) -> Candle {
        Candle {
            open_time,
            close_time,
            open: dec!(100),
            high: dec!(101),
            low: dec!(99),
            close: dec!(100.5),
            volume_base: dec!(1),
            volume_quote: dec!(100),
            volume_taker_base: dec!(0.5),
            volume_taker_quote: dec!(50),
            trade_count: 3,
            corrupt: false,
        }
    }

    #[test]
    fn test_timeframe_next_timeframe() {
        let tf = TimeFrame::new(time(1_577_836_800_000), time(1_577_836_859_999));
        let next = tf.next_timeframe();
        assert_eq!(next.open_time, time(1_577_836_860_000));
        assert_eq!(next.close_time, time(1_577_836_919_999));
        assert_eq!(next.close_time - next.open_time, tf.close_time - tf.open_time);
    }

    #[test]
    fn test_timeframe_insert_then_replace() {
        let mut tf = TimeFrame::new(time(1_577_836_800_000), time(1_577_836_859_999));
        let first = candle(tf.open_time, tf.close_time);

        // EMPTY -> OPEN
        assert!(tf.replace(first.clone()).is_err());
        assert!(tf.insert(first.clone()).is_ok());
        assert_eq!(tf.candle(), Some(&first));

        // OPEN -> OPEN only through replace
        assert!(tf.insert(first.clone()).is_err());
        let mut updated = first;
        updated.close = dec!(101);
        assert!(tf.replace(updated.clone()).is_ok());
        assert_eq!(tf.candle(), Some(&updated));
    }
}
