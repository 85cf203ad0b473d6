//! [`ProgressStore`] over the Postgres repositories.

use async_trait::async_trait;
use edquest_core::leaderboard::{LeaderboardMetric, RankedStanding};
use edquest_core::types::DbId;
use edquest_db::models::achievement::Achievement;
use edquest_db::models::achievement_progress::{UpsertProgress, UserAchievementProgress};
use edquest_db::models::gamification::{CreateGamificationState, UserGamificationState};
use edquest_db::repositories::{
    AchievementProgressRepo, AchievementRepo, GamificationRepo, LeaderboardRepo, ReevaluationRepo,
};
use edquest_db::DbPool;

use super::{LeaderboardSlice, ProgressStore, StoreError};

#[derive(Clone)]
pub struct PgProgressStore {
    pool: DbPool,
}

impl PgProgressStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProgressStore for PgProgressStore {
    async fn create_user_state(
        &self,
        input: &CreateGamificationState,
    ) -> Result<UserGamificationState, StoreError> {
        Ok(GamificationRepo::create(&self.pool, input).await?)
    }

    async fn get_user_state(
        &self,
        user_id: DbId,
    ) -> Result<Option<UserGamificationState>, StoreError> {
        Ok(GamificationRepo::find_by_user(&self.pool, user_id).await?)
    }

    async fn save_user_state(
        &self,
        state: &UserGamificationState,
    ) -> Result<UserGamificationState, StoreError> {
        GamificationRepo::compare_and_swap(&self.pool, state)
            .await?
            .ok_or(StoreError::VersionConflict {
                user_id: state.user_id,
                expected: state.version,
            })
    }

    async fn get_progress(
        &self,
        user_id: DbId,
        achievement_id: DbId,
    ) -> Result<Option<UserAchievementProgress>, StoreError> {
        Ok(AchievementProgressRepo::find(&self.pool, user_id, achievement_id).await?)
    }

    async fn list_progress(
        &self,
        user_id: DbId,
    ) -> Result<Vec<UserAchievementProgress>, StoreError> {
        Ok(AchievementProgressRepo::list_for_user(&self.pool, user_id).await?)
    }

    async fn save_progress(
        &self,
        input: &UpsertProgress,
    ) -> Result<Option<UserAchievementProgress>, StoreError> {
        Ok(AchievementProgressRepo::upsert(&self.pool, input).await?)
    }

    async fn list_active_achievements(&self) -> Result<Vec<Achievement>, StoreError> {
        Ok(AchievementRepo::list_active(&self.pool).await?)
    }

    async fn count_completed_achievements(&self, user_id: DbId) -> Result<i64, StoreError> {
        Ok(AchievementProgressRepo::count_completed(&self.pool, user_id).await?)
    }

    async fn leaderboard(
        &self,
        metric: LeaderboardMetric,
        offset: i64,
        limit: i64,
    ) -> Result<LeaderboardSlice, StoreError> {
        let rows = LeaderboardRepo::page(&self.pool, metric, offset, limit).await?;
        let total_count = match rows.first() {
            Some(row) => row.total_count,
            None => LeaderboardRepo::count(&self.pool).await?,
        };
        Ok(LeaderboardSlice {
            entries: rows.into_iter().map(RankedStanding::from).collect(),
            total_count,
        })
    }

    async fn flag_for_reevaluation(&self, user_id: DbId, reason: &str) -> Result<(), StoreError> {
        ReevaluationRepo::flag(&self.pool, user_id, reason).await?;
        Ok(())
    }

    async fn take_reevaluation_batch(&self, limit: i64) -> Result<Vec<DbId>, StoreError> {
        Ok(ReevaluationRepo::take_batch(&self.pool, limit).await?)
    }
}
