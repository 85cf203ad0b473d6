//! Read-only leaderboard pages.

use std::sync::Arc;

use edquest_core::leaderboard::{page_window, LeaderboardMetric, RankedStanding};
use serde::Serialize;

use crate::config::EngineConfig;
use crate::error::GamificationError;
use crate::store::ProgressStore;

/// One page of a leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardPage {
    pub metric: LeaderboardMetric,
    pub page: i64,
    /// Effective page size after clamping.
    pub page_size: i64,
    /// Ranked users across all pages.
    pub total_count: i64,
    /// Ranks are positions in the full ordering, not within the page.
    pub items: Vec<RankedStanding>,
}

pub struct LeaderboardRanker {
    store: Arc<dyn ProgressStore>,
    config: Arc<EngineConfig>,
}

impl LeaderboardRanker {
    pub fn new(store: Arc<dyn ProgressStore>, config: Arc<EngineConfig>) -> Self {
        Self { store, config }
    }

    /// Rank users by `metric`, highest first, ties by ascending user id.
    ///
    /// Pages past the end are empty, not errors.
    pub async fn rank(
        &self,
        metric: LeaderboardMetric,
        page: i64,
        page_size: i64,
    ) -> Result<LeaderboardPage, GamificationError> {
        let window = page_window(page, page_size, self.config.max_page_size)
            .map_err(GamificationError::Validation)?;
        let slice = self
            .store
            .leaderboard(metric, window.offset, window.limit)
            .await?;

        Ok(LeaderboardPage {
            metric,
            page: window.page,
            page_size: window.page_size,
            total_count: slice.total_count,
            items: slice.entries,
        })
    }
}
