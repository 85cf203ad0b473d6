//! Daily streak transitions.
//!
//! A streak counts consecutive reference-calendar days with at least one
//! streak-qualifying activity. Only the awarder advances streaks, and only
//! when a qualifying activity actually grants XP.

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::clock::days_between;
use crate::types::Timestamp;

/// Persisted streak fields of a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakState {
    pub current: i32,
    /// Never below `current`.
    pub longest: i32,
    pub last_activity_at: Option<Timestamp>,
}

/// What a qualifying activity did to the streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum StreakChange {
    /// First qualifying activity ever.
    Started,
    /// Last activity was yesterday; the streak grew by one.
    Extended,
    /// Already counted today.
    Unchanged,
    /// A gap of two or more days; the streak restarted at 1.
    Reset { previous: i32 },
}

impl StreakState {
    /// Apply a qualifying activity at `now`.
    pub fn advance(&self, now: Timestamp, offset: FixedOffset) -> (StreakState, StreakChange) {
        let Some(last) = self.last_activity_at else {
            let next = StreakState {
                current: 1,
                longest: self.longest.max(1),
                last_activity_at: Some(now),
            };
            return (next, StreakChange::Started);
        };

        let gap = days_between(last, now, offset);
        let (current, change) = match gap {
            // Same day, or `now` lies on an earlier day than the last activity.
            i64::MIN..=0 => (self.current.max(1), StreakChange::Unchanged),
            1 => (self.current.saturating_add(1), StreakChange::Extended),
            _ => (
                1,
                StreakChange::Reset {
                    previous: self.current,
                },
            ),
        };

        let next = StreakState {
            current,
            longest: self.longest.max(current),
            // Never move the marker backwards under clock skew.
            last_activity_at: Some(last.max(now)),
        };
        (next, change)
    }

    /// Whether the streak can still be continued: activity today or yesterday.
    pub fn is_alive(&self, now: Timestamp, offset: FixedOffset) -> bool {
        match self.last_activity_at {
            Some(last) => days_between(last, now, offset) <= 1,
            None => false,
        }
    }
}
