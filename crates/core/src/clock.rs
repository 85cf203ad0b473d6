//! Time source and calendar-day arithmetic.
//!
//! The engine never calls `Utc::now()` directly; it asks a [`Clock`]. Day
//! boundaries (daily cap resets, streak continuation) are computed in a
//! single reference offset fixed for the whole system.

use std::sync::Mutex;

use chrono::{Duration, FixedOffset, NaiveDate, Offset, Utc};

use crate::types::Timestamp;

/// Supplies "now" to the engine.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// A clock that only moves when told to. Used by tests and replay tooling.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Jump to an absolute instant.
    pub fn set(&self, instant: Timestamp) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = instant;
    }

    /// Move forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Build the reference offset from seconds east of UTC.
///
/// Out-of-range values (beyond +/- 24h) fall back to UTC.
pub fn reference_offset(seconds_east: i32) -> FixedOffset {
    FixedOffset::east_opt(seconds_east).unwrap_or_else(|| Utc.fix())
}

/// Calendar day of `instant` in the reference offset.
pub fn calendar_day(instant: Timestamp, offset: FixedOffset) -> NaiveDate {
    instant.with_timezone(&offset).date_naive()
}

/// Whole calendar days from `earlier` to `later` in the reference offset.
///
/// Negative when `later` falls on an earlier day (clock skew).
pub fn days_between(earlier: Timestamp, later: Timestamp, offset: FixedOffset) -> i64 {
    (calendar_day(later, offset) - calendar_day(earlier, offset)).num_days()
}
