//! Repository for the `user_gamification` table.

use edquest_core::types::DbId;
use sqlx::PgPool;

use crate::models::gamification::{CreateGamificationState, UserGamificationState};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, user_id, xp, level, daily_xp_earned, daily_xp_cap, last_xp_reset, \
                        streak_current, streak_longest, streak_last_activity_at, version, \
                        created_at, updated_at";

/// Provides reads and versioned writes of per-user gamification state.
pub struct GamificationRepo;

impl GamificationRepo {
    /// Insert the state row for a new account.
    ///
    /// Idempotent: if the user already has a row, that row is returned
    /// unchanged.
    pub async fn create(
        pool: &PgPool,
        input: &CreateGamificationState,
    ) -> Result<UserGamificationState, sqlx::Error> {
        let query = format!(
            "INSERT INTO user_gamification (user_id, daily_xp_cap, last_xp_reset) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (user_id) DO NOTHING \
             RETURNING {COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, UserGamificationState>(&query)
            .bind(input.user_id)
            .bind(input.daily_xp_cap)
            .bind(input.last_xp_reset)
            .fetch_optional(pool)
            .await?;

        match inserted {
            Some(state) => Ok(state),
            None => Self::find_by_user(pool, input.user_id)
                .await?
                .ok_or(sqlx::Error::RowNotFound),
        }
    }

    /// Find the state row for a user.
    pub async fn find_by_user(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Option<UserGamificationState>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM user_gamification WHERE user_id = $1");
        sqlx::query_as::<_, UserGamificationState>(&query)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Write every mutable field of `state` if the stored version still
    /// equals `state.version`, bumping the version.
    ///
    /// Returns `None` when the version no longer matches (another writer
    /// got there first) or the row does not exist.
    pub async fn compare_and_swap(
        pool: &PgPool,
        state: &UserGamificationState,
    ) -> Result<Option<UserGamificationState>, sqlx::Error> {
        let query = format!(
            "UPDATE user_gamification SET \
                 xp = $3, \
                 level = $4, \
                 daily_xp_earned = $5, \
                 daily_xp_cap = $6, \
                 last_xp_reset = $7, \
                 streak_current = $8, \
                 streak_longest = $9, \
                 streak_last_activity_at = $10, \
                 version = version + 1 \
             WHERE user_id = $1 AND version = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, UserGamificationState>(&query)
            .bind(state.user_id)
            .bind(state.version)
            .bind(state.xp)
            .bind(state.level)
            .bind(state.daily_xp_earned)
            .bind(state.daily_xp_cap)
            .bind(state.last_xp_reset)
            .bind(state.streak_current)
            .bind(state.streak_longest)
            .bind(state.streak_last_activity_at)
            .fetch_optional(pool)
            .await
    }
}
