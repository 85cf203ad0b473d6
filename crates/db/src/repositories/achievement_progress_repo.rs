//! Repository for the `user_achievement_progress` table.

use edquest_core::types::DbId;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::achievement_progress::{UpsertProgress, UserAchievementProgress};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, user_id, achievement_id, progress, is_completed, earned_at, \
                        progress_history, created_at, updated_at";

/// Provides monotonic progress tracking per user x achievement.
pub struct AchievementProgressRepo;

impl AchievementProgressRepo {
    /// Find the progress row for one user x achievement pair.
    pub async fn find(
        pool: &PgPool,
        user_id: DbId,
        achievement_id: DbId,
    ) -> Result<Option<UserAchievementProgress>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM user_achievement_progress \
             WHERE user_id = $1 AND achievement_id = $2"
        );
        sqlx::query_as::<_, UserAchievementProgress>(&query)
            .bind(user_id)
            .bind(achievement_id)
            .fetch_optional(pool)
            .await
    }

    /// List all progress rows for a user, ordered by achievement.
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Vec<UserAchievementProgress>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM user_achievement_progress \
             WHERE user_id = $1 \
             ORDER BY achievement_id"
        );
        sqlx::query_as::<_, UserAchievementProgress>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// Merge a progress observation into the row, creating it if needed.
    ///
    /// Progress only rises (`GREATEST`), completion is sticky, `earned_at`
    /// is written once, and the history entry is appended. A completed row
    /// is never touched, and an observation that would not raise progress
    /// or complete the row is dropped; both cases return `None`.
    pub async fn upsert(
        pool: &PgPool,
        input: &UpsertProgress,
    ) -> Result<Option<UserAchievementProgress>, sqlx::Error> {
        let query = format!(
            "INSERT INTO user_achievement_progress \
                 (user_id, achievement_id, progress, is_completed, earned_at, progress_history) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (user_id, achievement_id) DO UPDATE SET \
                 progress = GREATEST(user_achievement_progress.progress, EXCLUDED.progress), \
                 is_completed = user_achievement_progress.is_completed OR EXCLUDED.is_completed, \
                 earned_at = COALESCE(user_achievement_progress.earned_at, EXCLUDED.earned_at), \
                 progress_history = \
                     user_achievement_progress.progress_history || EXCLUDED.progress_history \
             WHERE NOT user_achievement_progress.is_completed \
               AND (EXCLUDED.is_completed \
                    OR EXCLUDED.progress > user_achievement_progress.progress) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, UserAchievementProgress>(&query)
            .bind(input.user_id)
            .bind(input.achievement_id)
            .bind(input.progress)
            .bind(input.is_completed)
            .bind(input.earned_at)
            .bind(Json(vec![input.entry.clone()]))
            .fetch_optional(pool)
            .await
    }

    /// Count completed achievements for a user.
    pub async fn count_completed(pool: &PgPool, user_id: DbId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM user_achievement_progress \
             WHERE user_id = $1 AND is_completed",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await
    }
}
