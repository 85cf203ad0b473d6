//! Achievement definitions: categories, criteria, rarity, and progress math.
//!
//! Definitions are created by administrators and are read-only to the
//! engine. This module holds the string <-> enum mappings used by the
//! `achievements` table and the pure functions the evaluator relies on.

use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const CATEGORY_COURSE: &str = "course";
pub const CATEGORY_ASSESSMENT: &str = "assessment";
pub const CATEGORY_STREAK: &str = "streak";
pub const CATEGORY_COMMUNITY: &str = "community";
pub const CATEGORY_SPECIAL: &str = "special";

/// All valid achievement categories.
pub const VALID_CATEGORIES: &[&str] = &[
    CATEGORY_COURSE,
    CATEGORY_ASSESSMENT,
    CATEGORY_STREAK,
    CATEGORY_COMMUNITY,
    CATEGORY_SPECIAL,
];

pub const RARITY_COMMON: &str = "common";
pub const RARITY_UNCOMMON: &str = "uncommon";
pub const RARITY_RARE: &str = "rare";
pub const RARITY_EPIC: &str = "epic";
pub const RARITY_LEGENDARY: &str = "legendary";

/// All valid rarities, least to most rare.
pub const VALID_RARITIES: &[&str] = &[
    RARITY_COMMON,
    RARITY_UNCOMMON,
    RARITY_RARE,
    RARITY_EPIC,
    RARITY_LEGENDARY,
];

/// Progress is stored as a whole percentage.
pub const PROGRESS_COMPLETE: i16 = 100;

/// Highest progress an incomplete achievement may show.
pub const PROGRESS_MAX_INCOMPLETE: i16 = 99;

/// Progress marks recorded as milestones in the history.
pub const PROGRESS_MILESTONES: &[i16] = &[25, 50, 75, 100];

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Grouping used for display and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementCategory {
    Course,
    Assessment,
    Streak,
    Community,
    Special,
}

impl AchievementCategory {
    /// Convert from a database string value.
    pub fn from_str_value(s: &str) -> Result<Self, String> {
        match s {
            CATEGORY_COURSE => Ok(Self::Course),
            CATEGORY_ASSESSMENT => Ok(Self::Assessment),
            CATEGORY_STREAK => Ok(Self::Streak),
            CATEGORY_COMMUNITY => Ok(Self::Community),
            CATEGORY_SPECIAL => Ok(Self::Special),
            _ => Err(format!(
                "Invalid achievement category '{s}'. Must be one of: {}",
                VALID_CATEGORIES.join(", ")
            )),
        }
    }

    /// Convert to the database string value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Course => CATEGORY_COURSE,
            Self::Assessment => CATEGORY_ASSESSMENT,
            Self::Streak => CATEGORY_STREAK,
            Self::Community => CATEGORY_COMMUNITY,
            Self::Special => CATEGORY_SPECIAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

impl Rarity {
    /// Convert from a database string value.
    pub fn from_str_value(s: &str) -> Result<Self, String> {
        match s {
            RARITY_COMMON => Ok(Self::Common),
            RARITY_UNCOMMON => Ok(Self::Uncommon),
            RARITY_RARE => Ok(Self::Rare),
            RARITY_EPIC => Ok(Self::Epic),
            RARITY_LEGENDARY => Ok(Self::Legendary),
            _ => Err(format!(
                "Invalid rarity '{s}'. Must be one of: {}",
                VALID_RARITIES.join(", ")
            )),
        }
    }

    /// Convert to the database string value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Common => RARITY_COMMON,
            Self::Uncommon => RARITY_UNCOMMON,
            Self::Rare => RARITY_RARE,
            Self::Epic => RARITY_EPIC,
            Self::Legendary => RARITY_LEGENDARY,
        }
    }
}

/// Where the evaluator gets the value compared against the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriteriaSource {
    /// Computed from the user's own gamification state.
    UserState,
    /// Counted by the external course-activity collaborator.
    CourseActivity,
}

/// What an achievement measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriteriaType {
    /// Completed courses.
    CourseCount,
    /// Assessments passed at or above their pass mark.
    AssessmentScore,
    /// Current consecutive-day streak.
    DailyStreak,
    /// Longest streak ever held.
    LongestStreak,
    /// Reviews posted.
    ReviewCount,
    /// Videos watched to completion.
    VideoCount,
    /// Assessments finished with a perfect score.
    PerfectScore,
    /// Courses completed faster than their expected duration.
    SpeedRun,
    /// Distinct course domains with at least one completed course.
    Explorer,
    /// Total XP.
    XpTotal,
    /// Current level.
    Level,
}

/// All criteria type strings accepted in the `achievements` table.
pub const VALID_CRITERIA_TYPES: &[&str] = &[
    "course_count",
    "assessment_score",
    "daily_streak",
    "longest_streak",
    "review_count",
    "video_count",
    "perfect_score",
    "speed_run",
    "explorer",
    "xp_total",
    "level",
];

impl CriteriaType {
    /// Convert from a database string value.
    pub fn from_str_value(s: &str) -> Result<Self, String> {
        match s {
            "course_count" => Ok(Self::CourseCount),
            "assessment_score" => Ok(Self::AssessmentScore),
            "daily_streak" => Ok(Self::DailyStreak),
            "longest_streak" => Ok(Self::LongestStreak),
            "review_count" => Ok(Self::ReviewCount),
            "video_count" => Ok(Self::VideoCount),
            "perfect_score" => Ok(Self::PerfectScore),
            "speed_run" => Ok(Self::SpeedRun),
            "explorer" => Ok(Self::Explorer),
            "xp_total" => Ok(Self::XpTotal),
            "level" => Ok(Self::Level),
            _ => Err(format!(
                "Invalid criteria type '{s}'. Must be one of: {}",
                VALID_CRITERIA_TYPES.join(", ")
            )),
        }
    }

    /// Convert to the database string value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CourseCount => "course_count",
            Self::AssessmentScore => "assessment_score",
            Self::DailyStreak => "daily_streak",
            Self::LongestStreak => "longest_streak",
            Self::ReviewCount => "review_count",
            Self::VideoCount => "video_count",
            Self::PerfectScore => "perfect_score",
            Self::SpeedRun => "speed_run",
            Self::Explorer => "explorer",
            Self::XpTotal => "xp_total",
            Self::Level => "level",
        }
    }

    pub fn source(&self) -> CriteriaSource {
        match self {
            Self::DailyStreak | Self::LongestStreak | Self::XpTotal | Self::Level => {
                CriteriaSource::UserState
            }
            _ => CriteriaSource::CourseActivity,
        }
    }
}

// ---------------------------------------------------------------------------
// Structs
// ---------------------------------------------------------------------------

/// One entry in a progress record's append-only history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressHistoryEntry {
    pub date: Timestamp,
    pub progress: i16,
    /// The milestone mark crossed by this update, if any.
    pub milestone: Option<i16>,
}

// ---------------------------------------------------------------------------
// Evaluation functions
// ---------------------------------------------------------------------------

/// Percentage of `threshold` reached by `value`, rounded half up, clamped to 0-100.
///
/// A non-positive threshold counts as fully reached.
pub fn progress_pct(value: i64, threshold: i64) -> i16 {
    if threshold <= 0 {
        return PROGRESS_COMPLETE;
    }
    if value <= 0 {
        return 0;
    }
    let value = i128::from(value);
    let threshold = i128::from(threshold);
    let pct = (200 * value + threshold) / (2 * threshold);
    pct.min(i128::from(PROGRESS_COMPLETE)) as i16
}

/// Progress to store for an achievement whose criteria are not yet met.
///
/// Rounding may reach 100 just below the threshold (199 of 200); an
/// incomplete record never shows 100.
pub fn incomplete_progress(value: i64, threshold: i64) -> i16 {
    progress_pct(value, threshold).min(PROGRESS_MAX_INCOMPLETE)
}

/// Whether `value` satisfies `threshold`.
pub fn is_satisfied(value: i64, threshold: i64) -> bool {
    threshold <= 0 || value >= threshold
}

/// Highest milestone mark `m` with `previous < m <= current`, if any.
pub fn milestone_crossed(previous: i16, current: i16) -> Option<i16> {
    PROGRESS_MILESTONES
        .iter()
        .rev()
        .find(|&&m| previous < m && m <= current)
        .copied()
}

/// Whether `now` lies inside an optional seasonal window.
///
/// The start is inclusive and the end exclusive. A missing bound is open.
pub fn is_in_season(
    starts_at: Option<Timestamp>,
    ends_at: Option<Timestamp>,
    now: Timestamp,
) -> bool {
    starts_at.map_or(true, |start| now >= start) && ends_at.map_or(true, |end| now < end)
}
