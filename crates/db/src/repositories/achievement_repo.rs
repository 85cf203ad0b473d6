//! Repository for the `achievements` table.

use edquest_core::achievements::RARITY_COMMON;
use edquest_core::types::DbId;
use sqlx::PgPool;

use crate::models::achievement::{Achievement, CreateAchievement, UpdateAchievement};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, name, description, category, criteria_type, threshold, domain_filter, \
                        xp_reward, rarity, is_active, chained_from, season_starts_at, \
                        season_ends_at, created_at, updated_at";

/// Provides CRUD operations for achievement definitions.
pub struct AchievementRepo;

impl AchievementRepo {
    /// Insert a new achievement, returning the created row.
    pub async fn create(
        pool: &PgPool,
        input: &CreateAchievement,
    ) -> Result<Achievement, sqlx::Error> {
        let query = format!(
            "INSERT INTO achievements \
                 (name, description, category, criteria_type, threshold, domain_filter, \
                  xp_reward, rarity, is_active, chained_from, season_starts_at, season_ends_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Achievement>(&query)
            .bind(&input.name)
            .bind(&input.description)
            .bind(&input.category)
            .bind(&input.criteria_type)
            .bind(input.threshold)
            .bind(&input.domain_filter)
            .bind(input.xp_reward.unwrap_or(0))
            .bind(input.rarity.as_deref().unwrap_or(RARITY_COMMON))
            .bind(input.is_active.unwrap_or(true))
            .bind(input.chained_from)
            .bind(input.season_starts_at)
            .bind(input.season_ends_at)
            .fetch_one(pool)
            .await
    }

    /// Find an achievement by ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Achievement>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM achievements WHERE id = $1");
        sqlx::query_as::<_, Achievement>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List active achievements ordered by ID.
    pub async fn list_active(pool: &PgPool) -> Result<Vec<Achievement>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM achievements WHERE is_active ORDER BY id");
        sqlx::query_as::<_, Achievement>(&query).fetch_all(pool).await
    }

    /// List every achievement, active or not, ordered by ID.
    pub async fn list(pool: &PgPool) -> Result<Vec<Achievement>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM achievements ORDER BY id");
        sqlx::query_as::<_, Achievement>(&query).fetch_all(pool).await
    }

    /// Update an achievement. Only non-`None` fields in `input` are applied.
    ///
    /// Returns `None` if no row with the given `id` exists.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &UpdateAchievement,
    ) -> Result<Option<Achievement>, sqlx::Error> {
        let query = format!(
            "UPDATE achievements SET \
                 name = COALESCE($2, name), \
                 description = COALESCE($3, description), \
                 threshold = COALESCE($4, threshold), \
                 xp_reward = COALESCE($5, xp_reward), \
                 rarity = COALESCE($6, rarity), \
                 is_active = COALESCE($7, is_active), \
                 chained_from = COALESCE($8, chained_from) \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Achievement>(&query)
            .bind(id)
            .bind(&input.name)
            .bind(&input.description)
            .bind(input.threshold)
            .bind(input.xp_reward)
            .bind(&input.rarity)
            .bind(input.is_active)
            .bind(input.chained_from)
            .fetch_optional(pool)
            .await
    }

    /// Activate or deactivate an achievement. Existing progress is untouched.
    ///
    /// Returns `true` if a row was updated.
    pub async fn set_active(pool: &PgPool, id: DbId, is_active: bool) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE achievements SET is_active = $2 WHERE id = $1")
            .bind(id)
            .bind(is_active)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
