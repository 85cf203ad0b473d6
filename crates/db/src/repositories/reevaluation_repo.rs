//! Repository for the `gamification_reevaluation_queue` table.

use edquest_core::types::DbId;
use sqlx::PgPool;

use crate::models::reevaluation::ReevaluationEntry;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, user_id, reason, attempts, flagged_at, created_at, updated_at";

/// Queue of users needing achievement re-evaluation.
pub struct ReevaluationRepo;

impl ReevaluationRepo {
    /// Flag a user. Re-flagging refreshes the reason and bumps `attempts`.
    pub async fn flag(
        pool: &PgPool,
        user_id: DbId,
        reason: &str,
    ) -> Result<ReevaluationEntry, sqlx::Error> {
        let query = format!(
            "INSERT INTO gamification_reevaluation_queue (user_id, reason, attempts) \
             VALUES ($1, $2, 1) \
             ON CONFLICT (user_id) DO UPDATE SET \
                 reason = EXCLUDED.reason, \
                 attempts = gamification_reevaluation_queue.attempts + 1, \
                 flagged_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ReevaluationEntry>(&query)
            .bind(user_id)
            .bind(reason)
            .fetch_one(pool)
            .await
    }

    /// Remove and return up to `limit` flagged users, oldest first.
    ///
    /// Uses `FOR UPDATE SKIP LOCKED` so concurrent reconcilers never take
    /// the same user.
    pub async fn take_batch(pool: &PgPool, limit: i64) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar(
            "DELETE FROM gamification_reevaluation_queue \
             WHERE id IN ( \
                 SELECT id FROM gamification_reevaluation_queue \
                 ORDER BY flagged_at \
                 LIMIT $1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING user_id",
        )
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// List queued users, oldest first.
    pub async fn list(pool: &PgPool) -> Result<Vec<ReevaluationEntry>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM gamification_reevaluation_queue ORDER BY flagged_at"
        );
        sqlx::query_as::<_, ReevaluationEntry>(&query)
            .fetch_all(pool)
            .await
    }
}
