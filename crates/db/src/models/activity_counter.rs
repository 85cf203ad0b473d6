//! Activity counters supplied by the course platform.

use edquest_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `activity_counters` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ActivityCounter {
    pub id: DbId,
    pub user_id: DbId,
    pub criteria_type: String,
    /// Empty string for counts without a domain.
    pub domain: String,
    pub count: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
