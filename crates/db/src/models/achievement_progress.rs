//! Per-user achievement progress models.

use edquest_core::achievements::ProgressHistoryEntry;
use edquest_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::FromRow;

/// A row from the `user_achievement_progress` table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct UserAchievementProgress {
    pub id: DbId,
    pub user_id: DbId,
    pub achievement_id: DbId,
    /// Whole percentage, 0-100. Never decreases.
    pub progress: i16,
    pub is_completed: bool,
    /// Set once, when `is_completed` flips to true.
    pub earned_at: Option<Timestamp>,
    /// Append-only.
    pub progress_history: Json<Vec<ProgressHistoryEntry>>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A progress observation to merge into the user x achievement row.
///
/// The store applies it monotonically: progress only rises, completion
/// is sticky, and nothing changes once the row is completed.
#[derive(Debug, Clone)]
pub struct UpsertProgress {
    pub user_id: DbId,
    pub achievement_id: DbId,
    pub progress: i16,
    pub is_completed: bool,
    pub earned_at: Option<Timestamp>,
    pub entry: ProgressHistoryEntry,
}
