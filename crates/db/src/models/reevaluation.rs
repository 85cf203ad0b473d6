//! Reconciliation queue entries.

use edquest_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `gamification_reevaluation_queue` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ReevaluationEntry {
    pub id: DbId,
    pub user_id: DbId,
    pub reason: String,
    /// How many times the user has been flagged since the last drain.
    pub attempts: i32,
    pub flagged_at: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
