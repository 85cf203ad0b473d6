//! Persistence seam for the engine.
//!
//! [`ProgressStore`] covers per-user state, per-user achievement progress,
//! the achievement catalog, leaderboard reads and the reconciliation
//! queue. [`PgProgressStore`] backs it with Postgres; [`MemoryProgressStore`]
//! keeps everything in process for tests and embedding.

use async_trait::async_trait;
use edquest_core::leaderboard::{LeaderboardMetric, RankedStanding};
use edquest_core::types::DbId;
use edquest_db::models::achievement::Achievement;
use edquest_db::models::achievement_progress::{UpsertProgress, UserAchievementProgress};
use edquest_db::models::gamification::{CreateGamificationState, UserGamificationState};

pub mod memory;
pub mod pg;

pub use memory::MemoryProgressStore;
pub use pg::PgProgressStore;

/// Failure of a store call.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The stored version of the user's state no longer matches.
    #[error("Stale state for user {user_id}: expected version {expected}")]
    VersionConflict { user_id: DbId, expected: i64 },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// One page of ranked standings plus the size of the full ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardSlice {
    pub entries: Vec<RankedStanding>,
    pub total_count: i64,
}

#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Create the user's state row, or return the existing one unchanged.
    async fn create_user_state(
        &self,
        input: &CreateGamificationState,
    ) -> Result<UserGamificationState, StoreError>;

    async fn get_user_state(
        &self,
        user_id: DbId,
    ) -> Result<Option<UserGamificationState>, StoreError>;

    /// Write `state` if the stored version equals `state.version`.
    ///
    /// Returns the saved row (version bumped) or
    /// [`StoreError::VersionConflict`].
    async fn save_user_state(
        &self,
        state: &UserGamificationState,
    ) -> Result<UserGamificationState, StoreError>;

    async fn get_progress(
        &self,
        user_id: DbId,
        achievement_id: DbId,
    ) -> Result<Option<UserAchievementProgress>, StoreError>;

    async fn list_progress(&self, user_id: DbId)
        -> Result<Vec<UserAchievementProgress>, StoreError>;

    /// Merge a progress observation monotonically.
    ///
    /// Returns `None` when nothing changed: the record is already
    /// completed, or the observation would not raise it.
    async fn save_progress(
        &self,
        input: &UpsertProgress,
    ) -> Result<Option<UserAchievementProgress>, StoreError>;

    async fn list_active_achievements(&self) -> Result<Vec<Achievement>, StoreError>;

    async fn count_completed_achievements(&self, user_id: DbId) -> Result<i64, StoreError>;

    /// Ranked standings for `metric`, `limit` rows starting at `offset`.
    async fn leaderboard(
        &self,
        metric: LeaderboardMetric,
        offset: i64,
        limit: i64,
    ) -> Result<LeaderboardSlice, StoreError>;

    /// Queue a user for achievement re-evaluation.
    async fn flag_for_reevaluation(&self, user_id: DbId, reason: &str) -> Result<(), StoreError>;

    /// Remove and return up to `limit` queued users, oldest first.
    async fn take_reevaluation_batch(&self, limit: i64) -> Result<Vec<DbId>, StoreError>;
}
