//! Activity type names reported by the platform when awarding XP.

pub const ACTIVITY_DAILY_LOGIN: &str = "daily_login";
pub const ACTIVITY_COURSE_PROGRESS: &str = "course_progress";
pub const ACTIVITY_COURSE_COMPLETION: &str = "course_completion";
pub const ACTIVITY_LESSON_COMPLETION: &str = "lesson_completion";
pub const ACTIVITY_ASSESSMENT_COMPLETION: &str = "assessment_completion";
pub const ACTIVITY_REVIEW_POSTED: &str = "review_posted";

/// Reward XP granted for unlocking an achievement. Never streak-qualifying.
pub const ACTIVITY_ACHIEVEMENT_EARNED: &str = "achievement_earned";

/// Activity types that advance the daily streak unless configured otherwise.
pub const DEFAULT_STREAK_ACTIVITIES: &[&str] = &[
    ACTIVITY_DAILY_LOGIN,
    ACTIVITY_COURSE_PROGRESS,
    ACTIVITY_COURSE_COMPLETION,
    ACTIVITY_LESSON_COMPLETION,
];

/// Maximum length of an activity type name.
pub const MAX_ACTIVITY_TYPE_LENGTH: usize = 64;

/// Validate an activity type name: non-empty, bounded, `[a-z0-9_.]` only.
pub fn validate_activity_type(activity_type: &str) -> Result<(), String> {
    if activity_type.is_empty() {
        return Err("Activity type must not be empty".to_string());
    }
    if activity_type.len() > MAX_ACTIVITY_TYPE_LENGTH {
        return Err(format!(
            "Activity type exceeds {MAX_ACTIVITY_TYPE_LENGTH} characters"
        ));
    }
    if !activity_type
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '.')
    {
        return Err(format!(
            "Invalid activity type '{activity_type}'. Use lowercase letters, digits, '_' or '.'"
        ));
    }
    Ok(())
}

/// Whether `activity_type` advances the streak given the configured list.
///
/// Achievement reward XP never qualifies, whatever the configuration says.
pub fn is_streak_qualifying(activity_type: &str, streak_activities: &[String]) -> bool {
    activity_type != ACTIVITY_ACHIEVEMENT_EARNED
        && streak_activities.iter().any(|a| a == activity_type)
}
