//! Leaderboard ordering and pagination.
//!
//! Rankings are a total order: the chosen metric descending, then user id
//! ascending. Ranks are 1-based positions in the full ordering, so two
//! users never share a rank and repeated reads of unchanged data agree.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::types::DbId;

/// Largest page a caller may request.
pub const MAX_PAGE_SIZE: i64 = 100;

pub const METRIC_XP: &str = "xp";
pub const METRIC_ACHIEVEMENT_COUNT: &str = "achievement_count";
pub const METRIC_STREAK: &str = "streak";

/// All valid leaderboard metric names.
pub const VALID_METRICS: &[&str] = &[METRIC_XP, METRIC_ACHIEVEMENT_COUNT, METRIC_STREAK];

/// What users are ranked by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaderboardMetric {
    Xp,
    AchievementCount,
    Streak,
}

impl LeaderboardMetric {
    /// Parse a metric name. Accepts `achievementCount` as an alias.
    pub fn from_str_value(s: &str) -> Result<Self, String> {
        match s {
            METRIC_XP => Ok(Self::Xp),
            METRIC_ACHIEVEMENT_COUNT | "achievementCount" => Ok(Self::AchievementCount),
            METRIC_STREAK => Ok(Self::Streak),
            _ => Err(format!(
                "Invalid leaderboard metric '{s}'. Must be one of: {}",
                VALID_METRICS.join(", ")
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Xp => METRIC_XP,
            Self::AchievementCount => METRIC_ACHIEVEMENT_COUNT,
            Self::Streak => METRIC_STREAK,
        }
    }
}

/// Per-user figures shown on the leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Standing {
    pub user_id: DbId,
    pub xp: i64,
    pub level: i32,
    pub achievement_count: i64,
    pub streak_current: i32,
}

impl Standing {
    /// The sort key value for `metric`.
    pub fn metric_value(&self, metric: LeaderboardMetric) -> i64 {
        match metric {
            LeaderboardMetric::Xp => self.xp,
            LeaderboardMetric::AchievementCount => self.achievement_count,
            LeaderboardMetric::Streak => i64::from(self.streak_current),
        }
    }
}

/// A standing with its position in the full ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedStanding {
    pub rank: i64,
    #[serde(flatten)]
    pub standing: Standing,
}

/// Leaderboard comparator: metric descending, then user id ascending.
pub fn compare(a: &Standing, b: &Standing, metric: LeaderboardMetric) -> Ordering {
    b.metric_value(metric)
        .cmp(&a.metric_value(metric))
        .then_with(|| a.user_id.cmp(&b.user_id))
}

/// Sort all standings and assign 1-based ranks.
pub fn rank_standings(
    mut standings: Vec<Standing>,
    metric: LeaderboardMetric,
) -> Vec<RankedStanding> {
    standings.sort_by(|a, b| compare(a, b, metric));
    standings
        .into_iter()
        .enumerate()
        .map(|(i, standing)| RankedStanding {
            rank: i as i64 + 1,
            standing,
        })
        .collect()
}

/// A validated page request translated to SQL-style offset/limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: i64,
    pub page_size: i64,
    pub offset: i64,
    pub limit: i64,
}

/// Validate `page >= 1` and `page_size >= 1`, clamp the size to `max_page_size`.
///
/// Pages past the end are valid; they simply select nothing.
pub fn page_window(page: i64, page_size: i64, max_page_size: i64) -> Result<PageWindow, String> {
    if page < 1 {
        return Err(format!("Page must be at least 1, got {page}"));
    }
    if page_size < 1 {
        return Err(format!("Page size must be at least 1, got {page_size}"));
    }
    let limit = page_size.min(max_page_size.max(1));
    let offset = (page - 1).saturating_mul(limit);
    Ok(PageWindow {
        page,
        page_size: limit,
        offset,
        limit,
    })
}
