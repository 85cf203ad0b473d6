//! Leaderboard query rows.

use edquest_core::leaderboard::{RankedStanding, Standing};
use edquest_core::types::DbId;
use sqlx::FromRow;

/// One ranked row produced by the leaderboard window query.
#[derive(Debug, Clone, FromRow)]
pub struct LeaderboardRow {
    pub rank: i64,
    /// Size of the whole ranking, repeated on every row.
    pub total_count: i64,
    pub user_id: DbId,
    pub xp: i64,
    pub level: i32,
    pub achievement_count: i64,
    pub streak_current: i32,
}

impl From<LeaderboardRow> for RankedStanding {
    fn from(row: LeaderboardRow) -> Self {
        RankedStanding {
            rank: row.rank,
            standing: Standing {
                user_id: row.user_id,
                xp: row.xp,
                level: row.level,
                achievement_count: row.achievement_count,
                streak_current: row.streak_current,
            },
        }
    }
}
