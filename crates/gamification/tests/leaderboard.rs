//! Leaderboard ranking and the per-user summary.

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use common::{achievement, Harness};
use edquest_core::achievements::CriteriaType;
use edquest_core::leaderboard::LeaderboardMetric;
use edquest_gamification::GamificationError;

/// Users 1..=5 with distinct XP, and users 6 and 7 tied.
async fn seeded() -> Harness {
    let h = Harness::new();
    for (user_id, xp) in [(1, 50), (2, 400), (3, 120), (4, 0), (5, 250), (7, 90), (6, 90)] {
        h.enroll(user_id, 500).await;
        if xp > 0 {
            h.engine.award(user_id, "course_progress", xp, None).await.unwrap();
        }
    }
    h
}

fn order(page: &edquest_gamification::LeaderboardPage) -> Vec<(i64, i64)> {
    page.items
        .iter()
        .map(|r| (r.rank, r.standing.user_id))
        .collect()
}

#[tokio::test]
async fn xp_ranking_breaks_ties_by_user_id() {
    let h = seeded().await;

    let page = h.engine.rank(LeaderboardMetric::Xp, 1, 10).await.unwrap();
    assert_eq!(
        order(&page),
        vec![(1, 2), (2, 5), (3, 3), (4, 6), (5, 7), (6, 1), (7, 4)]
    );
    assert_eq!(page.total_count, 7);
}

#[tokio::test]
async fn repeated_reads_are_identical() {
    let h = seeded().await;

    let first = h.engine.rank(LeaderboardMetric::Xp, 1, 10).await.unwrap();
    let second = h.engine.rank(LeaderboardMetric::Xp, 1, 10).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn ranks_are_global_across_pages() {
    let h = seeded().await;

    let page2 = h.engine.rank(LeaderboardMetric::Xp, 2, 3).await.unwrap();
    assert_eq!(order(&page2), vec![(4, 6), (5, 7), (6, 1)]);
    assert_eq!(page2.page, 2);
    assert_eq!(page2.page_size, 3);
}

#[tokio::test]
async fn page_past_the_end_is_empty() {
    let h = seeded().await;

    let page = h.engine.rank(LeaderboardMetric::Xp, 9, 10).await.unwrap();
    assert!(page.items.is_empty());
    assert_eq!(page.total_count, 7);
}

#[tokio::test]
async fn invalid_page_parameters_are_rejected() {
    let h = seeded().await;

    let err = h.engine.rank(LeaderboardMetric::Xp, 0, 10).await.unwrap_err();
    assert_matches!(err, GamificationError::Validation(_));

    let err = h.engine.rank(LeaderboardMetric::Streak, 1, 0).await.unwrap_err();
    assert_matches!(err, GamificationError::Validation(_));
}

#[tokio::test]
async fn page_size_is_clamped() {
    let h = seeded().await;

    let page = h.engine.rank(LeaderboardMetric::Xp, 1, 10_000).await.unwrap();
    assert_eq!(page.page_size, 100);
    assert_eq!(page.items.len(), 7);
}

#[tokio::test]
async fn achievement_count_ranking() {
    let h = Harness::new();
    h.enroll(1, 500).await;
    h.enroll(2, 500).await;
    h.store.add_achievement(achievement("One", "course_count", 1, 0));
    h.store.add_achievement(achievement("Two", "course_count", 2, 0));
    h.activity.set_count(1, CriteriaType::CourseCount, None, 1);
    h.activity.set_count(2, CriteriaType::CourseCount, None, 2);
    h.engine.evaluate(1).await.unwrap();
    h.engine.evaluate(2).await.unwrap();

    let page = h
        .engine
        .rank(LeaderboardMetric::AchievementCount, 1, 10)
        .await
        .unwrap();
    assert_eq!(order(&page), vec![(1, 2), (2, 1)]);
    assert_eq!(page.items[0].standing.achievement_count, 2);
}

#[tokio::test]
async fn streak_ranking() {
    let h = Harness::new();
    h.enroll(1, 500).await;
    h.enroll(2, 500).await;

    h.engine.award(1, "daily_login", 10, None).await.unwrap();
    h.advance_days(1);
    h.engine.award(1, "daily_login", 10, None).await.unwrap();
    h.engine.award(2, "daily_login", 10, None).await.unwrap();

    let page = h.engine.rank(LeaderboardMetric::Streak, 1, 10).await.unwrap();
    assert_eq!(order(&page), vec![(1, 1), (2, 2)]);
    assert_eq!(page.items[0].standing.streak_current, 2);
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[tokio::test]
async fn summary_reflects_level_and_daily_allowance() {
    let h = Harness::new();
    h.enroll(1, 500).await;
    h.engine.award(1, "course_progress", 450, None).await.unwrap();

    let summary = h.engine.summary(1).await.unwrap();
    assert_eq!(summary.xp, 450);
    assert_eq!(summary.level, 2);
    assert_eq!(summary.next_level_xp, 900);
    assert_eq!(summary.xp_to_next_level, 450);
    assert_eq!(summary.daily_xp_remaining, 50);
    assert_eq!(summary.achievement_count, 0);

    h.advance_days(1);
    let tomorrow = h.engine.summary(1).await.unwrap();
    assert_eq!(tomorrow.daily_xp_earned, 0);
    assert_eq!(tomorrow.daily_xp_remaining, 500);
}

#[tokio::test]
async fn summary_of_unknown_user_is_not_found() {
    let h = Harness::new();
    assert_matches!(
        h.engine.summary(5).await,
        Err(GamificationError::NotFound { id: 5, .. })
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reads_during_awards_never_repeat_a_rank() {
    let h = Harness::new();
    for user_id in 1..=8 {
        h.enroll(user_id, 10_000).await;
    }

    let mut writers = Vec::new();
    for user_id in 1..=8 {
        let engine = Arc::clone(&h.engine);
        writers.push(tokio::spawn(async move {
            for round in 0..10 {
                engine
                    .award(user_id, "lesson_completion", 5 + (user_id + round) % 7, None)
                    .await
                    .unwrap();
            }
        }));
    }

    let mut readers = Vec::new();
    for page in 1..=3 {
        let engine = Arc::clone(&h.engine);
        readers.push(tokio::spawn(async move {
            let mut pages = Vec::new();
            for _ in 0..20 {
                pages.push(engine.rank(LeaderboardMetric::Xp, page, 3).await.unwrap());
                tokio::task::yield_now().await;
            }
            pages
        }));
    }

    for writer in writers {
        writer.await.unwrap();
    }
    for reader in readers {
        for page in reader.await.unwrap() {
            assert_eq!(page.total_count, 8);
            let first_rank = (page.page - 1) * page.page_size + 1;
            let ranks: Vec<i64> = page.items.iter().map(|r| r.rank).collect();
            let expected: Vec<i64> = (first_rank..first_rank + ranks.len() as i64).collect();
            assert_eq!(ranks, expected);

            let mut users: Vec<i64> = page.items.iter().map(|r| r.standing.user_id).collect();
            users.sort_unstable();
            users.dedup();
            assert_eq!(users.len(), page.items.len());
        }
    }
}
