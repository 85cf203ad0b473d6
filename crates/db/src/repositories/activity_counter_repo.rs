//! Repository for the `activity_counters` table.

use edquest_core::types::DbId;
use sqlx::PgPool;

use crate::models::activity_counter::ActivityCounter;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, user_id, criteria_type, domain, count, created_at, updated_at";

/// Provides reads and increments of raw activity counts.
pub struct ActivityCounterRepo;

impl ActivityCounterRepo {
    /// Current count for a user and criteria type.
    ///
    /// With a domain, only that domain's counter is read; without one, the
    /// counters for every domain are summed. Missing counters count as 0.
    pub async fn get_count(
        pool: &PgPool,
        user_id: DbId,
        criteria_type: &str,
        domain: Option<&str>,
    ) -> Result<i64, sqlx::Error> {
        match domain {
            Some(domain) => {
                let count: Option<i64> = sqlx::query_scalar(
                    "SELECT count FROM activity_counters \
                     WHERE user_id = $1 AND criteria_type = $2 AND domain = $3",
                )
                .bind(user_id)
                .bind(criteria_type)
                .bind(domain)
                .fetch_optional(pool)
                .await?;
                Ok(count.unwrap_or(0))
            }
            None => {
                sqlx::query_scalar(
                    "SELECT COALESCE(SUM(count), 0)::BIGINT FROM activity_counters \
                     WHERE user_id = $1 AND criteria_type = $2",
                )
                .bind(user_id)
                .bind(criteria_type)
                .fetch_one(pool)
                .await
            }
        }
    }

    /// Add `by` to a counter, creating it at `by` if absent.
    ///
    /// The result is floored at zero so a decrement (e.g. a deleted
    /// review) never drives a counter negative.
    pub async fn increment(
        pool: &PgPool,
        user_id: DbId,
        criteria_type: &str,
        domain: Option<&str>,
        by: i64,
    ) -> Result<ActivityCounter, sqlx::Error> {
        let query = format!(
            "INSERT INTO activity_counters (user_id, criteria_type, domain, count) \
             VALUES ($1, $2, $3, GREATEST($4, 0)) \
             ON CONFLICT (user_id, criteria_type, domain) DO UPDATE SET \
                 count = GREATEST(activity_counters.count + $4, 0) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ActivityCounter>(&query)
            .bind(user_id)
            .bind(criteria_type)
            .bind(domain.unwrap_or(""))
            .bind(by)
            .fetch_one(pool)
            .await
    }
}
