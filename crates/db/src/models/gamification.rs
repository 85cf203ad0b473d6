//! Per-user gamification state.

use edquest_core::streaks::StreakState;
use edquest_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `user_gamification` table.
///
/// `version` is the optimistic-concurrency token: every successful write
/// increments it, and a write carrying a stale version is rejected.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct UserGamificationState {
    pub id: DbId,
    pub user_id: DbId,
    pub xp: i64,
    pub level: i32,
    pub daily_xp_earned: i64,
    pub daily_xp_cap: i64,
    pub last_xp_reset: Timestamp,
    pub streak_current: i32,
    pub streak_longest: i32,
    pub streak_last_activity_at: Option<Timestamp>,
    pub version: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl UserGamificationState {
    pub fn streak(&self) -> StreakState {
        StreakState {
            current: self.streak_current,
            longest: self.streak_longest,
            last_activity_at: self.streak_last_activity_at,
        }
    }

    pub fn set_streak(&mut self, streak: StreakState) {
        self.streak_current = streak.current;
        self.streak_longest = streak.longest;
        self.streak_last_activity_at = streak.last_activity_at;
    }
}

/// DTO for creating the state row at account creation.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateGamificationState {
    pub user_id: DbId,
    pub daily_xp_cap: i64,
    /// Start of the first daily-cap window.
    pub last_xp_reset: Timestamp,
}
