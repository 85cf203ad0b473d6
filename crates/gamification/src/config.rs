//! Engine tuning knobs.

use std::time::Duration;

use chrono::FixedOffset;
use edquest_core::activity::DEFAULT_STREAK_ACTIVITIES;
use edquest_core::clock::reference_offset;
use edquest_core::daily_cap::DEFAULT_DAILY_XP_CAP;
use edquest_core::leaderboard::MAX_PAGE_SIZE;

/// Default cap on XP-granting achievement rewards per top-level call.
pub const DEFAULT_MAX_CHAIN_AWARDS: u32 = 50;

/// Default number of optimistic-concurrency retries after the first attempt.
pub const DEFAULT_MAX_UPDATE_RETRIES: u32 = 3;

/// Default budget for a single CourseActivity lookup.
pub const DEFAULT_EVALUATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Default budget for one whole evaluation pass, store calls included.
pub const DEFAULT_EVALUATION_PASS_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration shared by every engine component.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Cap given to newly enrolled users unless overridden.
    pub default_daily_xp_cap: i64,
    /// Offset east of UTC, in seconds, of the reference calendar used for
    /// daily-cap resets and streak days.
    pub reference_utc_offset_secs: i32,
    /// Activity types that advance the daily streak.
    pub streak_activity_types: Vec<String>,
    pub max_chain_awards: u32,
    pub max_update_retries: u32,
    pub evaluation_timeout: Duration,
    /// Bound on one evaluation pass. A pass that runs out is reported as
    /// failed and the user is queued for reconciliation.
    pub evaluation_pass_timeout: Duration,
    /// When set, an achievement with a predecessor is only evaluated once
    /// the predecessor is completed.
    pub gate_chained_achievements: bool,
    pub max_page_size: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_daily_xp_cap: DEFAULT_DAILY_XP_CAP,
            reference_utc_offset_secs: 0,
            streak_activity_types: DEFAULT_STREAK_ACTIVITIES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_chain_awards: DEFAULT_MAX_CHAIN_AWARDS,
            max_update_retries: DEFAULT_MAX_UPDATE_RETRIES,
            evaluation_timeout: DEFAULT_EVALUATION_TIMEOUT,
            evaluation_pass_timeout: DEFAULT_EVALUATION_PASS_TIMEOUT,
            gate_chained_achievements: false,
            max_page_size: MAX_PAGE_SIZE,
        }
    }
}

impl EngineConfig {
    pub fn reference_offset(&self) -> FixedOffset {
        reference_offset(self.reference_utc_offset_secs)
    }

    /// Total write attempts per state update, including the first.
    pub fn max_update_attempts(&self) -> u32 {
        self.max_update_retries.saturating_add(1)
    }
}
