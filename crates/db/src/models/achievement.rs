//! Achievement definition models and DTOs.

use edquest_core::achievements::is_in_season;
use edquest_core::chains::ChainLink;
use edquest_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `achievements` table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct Achievement {
    pub id: DbId,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub criteria_type: String,
    pub threshold: i64,
    /// Narrows activity counts to one domain (e.g. a course category).
    pub domain_filter: Option<String>,
    pub xp_reward: i64,
    pub rarity: String,
    pub is_active: bool,
    pub chained_from: Option<DbId>,
    pub season_starts_at: Option<Timestamp>,
    pub season_ends_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Achievement {
    pub fn chain_link(&self) -> ChainLink {
        ChainLink {
            id: self.id,
            chained_from: self.chained_from,
        }
    }

    /// Whether the seasonal window (if any) is open at `now`.
    pub fn is_in_season(&self, now: Timestamp) -> bool {
        is_in_season(self.season_starts_at, self.season_ends_at, now)
    }
}

/// DTO for creating an achievement.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAchievement {
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub criteria_type: String,
    pub threshold: i64,
    pub domain_filter: Option<String>,
    pub xp_reward: Option<i64>,
    pub rarity: Option<String>,
    pub is_active: Option<bool>,
    pub chained_from: Option<DbId>,
    pub season_starts_at: Option<Timestamp>,
    pub season_ends_at: Option<Timestamp>,
}

/// DTO for updating an achievement. All fields are optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateAchievement {
    pub name: Option<String>,
    pub description: Option<String>,
    pub threshold: Option<i64>,
    pub xp_reward: Option<i64>,
    pub rarity: Option<String>,
    pub is_active: Option<bool>,
    pub chained_from: Option<DbId>,
}
