//! Daily XP cap arithmetic.

use chrono::FixedOffset;

use crate::clock::days_between;
use crate::types::Timestamp;

/// Cap applied to accounts that have no per-user or tier override.
pub const DEFAULT_DAILY_XP_CAP: i64 = 500;

/// Whether `now` falls on a later reference-calendar day than the last reset.
///
/// A clock that steps backwards across midnight never opens a second
/// window for the same day.
pub fn is_new_day(last_reset: Timestamp, now: Timestamp, offset: FixedOffset) -> bool {
    days_between(last_reset, now, offset) > 0
}

/// XP still available today: `max(0, cap - earned)`.
pub fn available(cap: i64, earned_today: i64) -> i64 {
    (cap.max(0) - earned_today.max(0)).max(0)
}

/// XP actually granted for a request: `min(requested, available)`, never negative.
pub fn grantable(requested: i64, cap: i64, earned_today: i64) -> i64 {
    requested.max(0).min(available(cap, earned_today))
}
