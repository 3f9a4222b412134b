use crate::{
    candle::{Candle, StreamUpdate},
    error::EngineError,
    interval::{BASE_INTERVAL, Interval},
    timeframe::TimeFrame,
};
use chrono::{DateTime, Utc};
use smol_str::SmolStr;
use std::collections::VecDeque;
use tracing::debug;

/// Which timeframe of a [`Window`] an incoming payload belongs to.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Placement {
    First,
    Next,
    Current,
    Previous,
}

/// Ordered, bounded history of [`TimeFrame`]s for one (symbol, interval)
/// pair.
///
/// A Window is owned by exactly one symbol entry and mutated only on the
/// single consumer task, so classification (a read of the last TimeFrame
/// followed by a write) is never concurrent.
#[derive(Clone, Debug)]
pub struct Window {
    symbol: SmolStr,
    interval: Interval,
    capacity: usize,
    timeframes: VecDeque<TimeFrame>,
    history_downloaded: bool,
    last_update: Option<Candle>,
    last_update_closed: bool,
}

impl Window {
    pub fn new(symbol: SmolStr, interval: Interval, capacity: usize) -> Self {
        Self {
            symbol,
            interval,
            capacity,
            timeframes: VecDeque::with_capacity(capacity + 1),
            // Sub-minute buckets cannot be backfilled upstream, so derived
            // windows are born with the gate open.
            history_downloaded: interval.is_derived(),
            last_update: None,
            last_update_closed: false,
        }
    }

    pub fn symbol(&self) -> &SmolStr {
        &self.symbol
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.timeframes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timeframes.is_empty()
    }

    /// TimeFrames oldest to newest.
    pub fn timeframes(&self) -> impl Iterator<Item = &TimeFrame> {
        self.timeframes.iter()
    }

    pub fn latest(&self) -> Option<&TimeFrame> {
        self.timeframes.back()
    }

    pub fn history_downloaded(&self) -> bool {
        self.history_downloaded
    }

    pub(crate) fn mark_history_downloaded(&mut self) {
        self.history_downloaded = true;
    }

    /// Classify the timeframe a payload closing at `close_time` belongs to.
    ///
    /// With `delta` the bucket duration and `tf` the last retained TimeFrame:
    /// anything beyond `tf.close_time + delta` means bucket creation was
    /// skipped, anything at or before `tf.open_time - delta` lags behind the
    /// retained state. The Previous branch encodes the tolerated single
    /// bucket of lateness.
    pub fn classify(&self, close_time: DateTime<Utc>) -> Result<Placement, EngineError> {
        let Some(tf) = self.timeframes.back() else {
            return Ok(Placement::First);
        };
        let delta = self.interval.duration();

        if close_time > tf.close_time + delta {
            Err(EngineError::DataCorruption {
                symbol: self.symbol.clone(),
                interval: self.interval,
                detail: "timeframe creation skipped a bucket".to_string(),
            })
        } else if close_time > tf.close_time {
            Ok(Placement::Next)
        } else if close_time > tf.open_time {
            Ok(Placement::Current)
        } else if close_time > tf.open_time - delta {
            Ok(Placement::Previous)
        } else {
            Err(EngineError::DataLeakage {
                symbol: self.symbol.clone(),
                interval: self.interval,
            })
        }
    }

    /// Apply one backfilled candle.
    ///
    /// Backfill is append-only and strictly contiguous: the candle must carry
    /// the bounds of the next deterministic bucket, and updates to existing
    /// buckets are rejected. Mismatches mark the window corrupt and surface
    /// as [`EngineError::DataCorruption`] rather than being repaired
    /// silently.
    pub fn apply_history(&mut self, candle: Candle) -> Result<(), EngineError> {
        match self.classify_mut(candle.close_time)? {
            Placement::First => {
                if Interval::from_bucket(candle.open_time, candle.close_time)
                    != Some(self.interval)
                {
                    return Err(self.corruption(
                        "historical candle span does not match the window interval",
                    ));
                }
                let mut tf = TimeFrame::new(candle.open_time, candle.close_time);
                tf.insert(candle)?;
                self.push(tf);
            }
            Placement::Next => {
                let mut tf = self.last_timeframe()?.next_timeframe();
                if tf.open_time != candle.open_time || tf.close_time != candle.close_time {
                    self.mark_latest_corrupt();
                    return Err(self.corruption(
                        "inconsistent open and close times in historical candle data",
                    ));
                }
                tf.insert(candle)?;
                self.push(tf);
            }
            Placement::Current | Placement::Previous => {
                return Err(EngineError::InvalidRetroactiveWrite(format!(
                    "historical data cannot retroactively update a closed {} {} bucket",
                    self.symbol, self.interval
                )));
            }
        }
        Ok(())
    }

    /// Apply one live base-resolution update.
    ///
    /// Non-derived windows are classified by the update's bucket close time;
    /// the derived sub-minute window is classified by the event time and its
    /// candles are synthesized from consecutive update pairs. Every
    /// successful apply records the raw sample for the delta/raw volume
    /// switch.
    pub fn apply_stream(&mut self, update: &StreamUpdate) -> Result<(), EngineError> {
        if self.interval.is_derived() {
            self.apply_stream_derived(update)?;
        } else {
            self.apply_stream_direct(update)?;
        }

        self.last_update = Some(update.candle.clone());
        self.last_update_closed = update.is_closed;
        Ok(())
    }

    fn apply_stream_direct(&mut self, update: &StreamUpdate) -> Result<(), EngineError> {
        match self.classify_mut(update.candle.close_time)? {
            Placement::First => {
                if self.interval == BASE_INTERVAL {
                    let mut tf = TimeFrame::new(update.candle.open_time, update.candle.close_time);
                    tf.insert(update.candle.clone())?;
                    self.push(tf);
                } else {
                    // A coarser bucket's bounds cannot be recovered from one
                    // base-resolution sample.
                    debug!(
                        symbol = %self.symbol,
                        interval = %self.interval,
                        "dropping live update for an unseeded window"
                    );
                }
            }
            Placement::Next => {
                let mut tf = self.last_timeframe()?.next_timeframe();
                let mut candle = update.candle.clone();
                candle.open_time = tf.open_time;
                candle.close_time = tf.close_time;
                tf.insert(candle)?;
                self.push(tf);
            }
            Placement::Current => self.merge_at(1, update)?,
            Placement::Previous => self.merge_at(2, update)?,
        }
        Ok(())
    }

    fn apply_stream_derived(&mut self, update: &StreamUpdate) -> Result<(), EngineError> {
        let Some(prev_update) = self.last_update.clone() else {
            // The first base sample only seeds the delta baseline; deriving a
            // candle takes two consecutive samples.
            debug!(
                symbol = %self.symbol,
                interval = %self.interval,
                "seeding derived window, awaiting second stream sample"
            );
            return Ok(());
        };
        let prev_closed = self.last_update_closed;

        match self.classify_mut(update.event_time)? {
            Placement::First => {
                let open_time = self.interval.align(update.event_time);
                let close_time =
                    open_time + self.interval.duration() - chrono::TimeDelta::milliseconds(1);
                let candle = Candle::derive_subinterval(
                    &update.candle,
                    &prev_update,
                    prev_closed,
                    open_time,
                    close_time,
                );
                let mut tf = TimeFrame::new(open_time, close_time);
                tf.insert(candle)?;
                self.push(tf);
            }
            Placement::Next => {
                let mut tf = self.last_timeframe()?.next_timeframe();
                let candle = Candle::derive_subinterval(
                    &update.candle,
                    &prev_update,
                    prev_closed,
                    tf.open_time,
                    tf.close_time,
                );
                tf.insert(candle)?;
                self.push(tf);
            }
            Placement::Current => self.merge_derived_at(1, update, &prev_update, prev_closed)?,
            Placement::Previous => self.merge_derived_at(2, update, &prev_update, prev_closed)?,
        }
        Ok(())
    }

    /// Merge a live update into the timeframe `offset_from_newest` positions
    /// from the newest (1 = current, 2 = previous).
    fn merge_at(&mut self, offset_from_newest: usize, update: &StreamUpdate) -> Result<(), EngineError> {
        let prev_update = self.last_update.clone();
        let prev_closed = self.last_update_closed;
        let tf = self.timeframe_from_newest(offset_from_newest)?;

        let merged = tf
            .candle()
            .map(|base| base.merge(&update.candle, prev_update.as_ref(), prev_closed));
        match merged {
            Some(merged) => tf.replace(merged),
            None => tf.insert(update.candle.clone()),
        }
    }

    fn merge_derived_at(
        &mut self,
        offset_from_newest: usize,
        update: &StreamUpdate,
        prev_update: &Candle,
        prev_closed: bool,
    ) -> Result<(), EngineError> {
        let tf = self.timeframe_from_newest(offset_from_newest)?;
        let derived = Candle::derive_subinterval(
            &update.candle,
            prev_update,
            prev_closed,
            tf.open_time,
            tf.close_time,
        );

        // The derived candle already carries delta-corrected volumes, so it
        // accumulates raw into the open bucket.
        let merged = tf.candle().map(|base| base.merge(&derived, None, true));
        match merged {
            Some(merged) => tf.replace(merged),
            None => tf.insert(derived),
        }
    }

    fn classify_mut(&mut self, close_time: DateTime<Utc>) -> Result<Placement, EngineError> {
        match self.classify(close_time) {
            Err(error @ EngineError::DataCorruption { .. }) => {
                self.mark_latest_corrupt();
                Err(error)
            }
            other => other,
        }
    }

    fn timeframe_from_newest(
        &mut self,
        offset_from_newest: usize,
    ) -> Result<&mut TimeFrame, EngineError> {
        let symbol = self.symbol.clone();
        let interval = self.interval;
        let len = self.timeframes.len();
        len.checked_sub(offset_from_newest)
            .and_then(|index| self.timeframes.get_mut(index))
            .ok_or(EngineError::DataLeakage { symbol, interval })
    }

    fn last_timeframe(&self) -> Result<&TimeFrame, EngineError> {
        self.timeframes.back().ok_or_else(|| {
            self.corruption("next bucket requested on an empty window")
        })
    }

    fn push(&mut self, tf: TimeFrame) {
        self.timeframes.push_back(tf);
        if self.timeframes.len() > self.capacity {
            self.timeframes.pop_front();
        }
    }

    fn mark_latest_corrupt(&mut self) {
        if let Some(tf) = self.timeframes.back_mut() {
            tf.mark_corrupt();
        }
    }

    fn corruption(&self, detail: &str) -> EngineError {
        EngineError::DataCorruption {
            symbol: self.symbol.clone(),
            interval: self.interval,
            detail: detail.to_string(),
        }
    }
}
