//! Read-only leaderboard queries over `user_gamification` and
//! `user_achievement_progress`.

use edquest_core::leaderboard::LeaderboardMetric;
use sqlx::PgPool;

use crate::models::leaderboard::LeaderboardRow;

/// Provides ranked, paginated standings.
pub struct LeaderboardRepo;

impl LeaderboardRepo {
    /// Fetch one page of the ranking for `metric`.
    ///
    /// Ranks come from `ROW_NUMBER()` over the full ordering (metric
    /// descending, then `user_id` ascending), so they are unique and
    /// stable across pages. Every row carries `total_count`, the size of
    /// the ranking in the same snapshot.
    pub async fn page(
        pool: &PgPool,
        metric: LeaderboardMetric,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<LeaderboardRow>, sqlx::Error> {
        let sort_column = sort_column(metric);
        let query = format!(
            "WITH completed AS ( \
                 SELECT user_id, COUNT(*) AS achievement_count \
                 FROM user_achievement_progress \
                 WHERE is_completed \
                 GROUP BY user_id \
             ), standings AS ( \
                 SELECT g.user_id, g.xp, g.level, g.streak_current, \
                        COALESCE(c.achievement_count, 0) AS achievement_count \
                 FROM user_gamification g \
                 LEFT JOIN completed c ON c.user_id = g.user_id \
             ) \
             SELECT ROW_NUMBER() OVER (ORDER BY {sort_column} DESC, user_id ASC) AS rank, \
                    COUNT(*) OVER () AS total_count, \
                    user_id, xp, level, achievement_count, streak_current \
             FROM standings \
             ORDER BY rank \
             LIMIT $1 OFFSET $2"
        );
        sqlx::query_as::<_, LeaderboardRow>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Number of ranked users.
    ///
    /// Only needed when [`page`](Self::page) returns no rows.
    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM user_gamification")
            .fetch_one(pool)
            .await
    }
}

/// Column in the `standings` CTE that `metric` sorts by.
fn sort_column(metric: LeaderboardMetric) -> &'static str {
    match metric {
        LeaderboardMetric::Xp => "xp",
        LeaderboardMetric::AchievementCount => "achievement_count",
        LeaderboardMetric::Streak => "streak_current",
    }
}
