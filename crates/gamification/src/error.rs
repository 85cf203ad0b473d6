//! Engine errors and non-fatal warnings.
//!
//! Errors abort the operation. Warnings ride along on a successful result
//! and are also logged where they are raised.

use edquest_core::error::CoreError;
use edquest_core::types::DbId;
use serde::Serialize;

use crate::store::StoreError;

/// Failure of an engine operation.
#[derive(Debug, thiserror::Error)]
pub enum GamificationError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    #[error("Concurrent updates to user {user_id} did not settle after {attempts} attempts")]
    ConcurrentUpdate { user_id: DbId, attempts: u32 },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl GamificationError {
    /// Whether the caller may retry the whole operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::ConcurrentUpdate { .. })
    }
}

/// Something went wrong that did not fail the operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum EngineWarning {
    /// A malformed achievement definition was evaluated with a fallback.
    #[error("Achievement {achievement_id} is misconfigured: {message}")]
    Configuration { achievement_id: DbId, message: String },

    /// Achievement rewards hit the per-call cap; remaining rewards were not granted.
    #[error("Achievement rewards stopped after {limit} awards")]
    AchievementChainTooDeep { limit: u32 },

    #[error("Achievement evaluation failed: {message}")]
    EvaluationFailed { message: String },

    #[error("Activity lookup timed out after {after_ms} ms")]
    EvaluationTimedOut { after_ms: u64 },

    #[error("Reward for achievement {achievement_id} was not granted: {message}")]
    RewardFailed { achievement_id: DbId, message: String },
}

/// How the achievement pass of an award went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    /// Every active achievement was evaluated.
    Completed,
    /// No XP was granted, so nothing was evaluated.
    Skipped,
    /// Some or all achievements could not be evaluated; the user is queued
    /// for reconciliation.
    Failed,
}
