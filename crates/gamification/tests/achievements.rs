//! Achievement evaluation, rewards, chains and reconciliation.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use common::{achievement, start, Harness};
use edquest_core::achievements::CriteriaType;
use edquest_core::clock::ManualClock;
use edquest_core::leaderboard::LeaderboardMetric;
use edquest_core::types::DbId;
use edquest_db::models::achievement::Achievement;
use edquest_db::models::achievement_progress::{UpsertProgress, UserAchievementProgress};
use edquest_db::models::gamification::{CreateGamificationState, UserGamificationState};
use edquest_gamification::activity::StaticCourseActivity;
use edquest_gamification::store::{LeaderboardSlice, MemoryProgressStore, ProgressStore, StoreError};
use edquest_gamification::{
    EngineConfig, EngineWarning, EvaluationStatus, GamificationEngine, GamificationError,
};

// ---------------------------------------------------------------------------
// Progress records
// ---------------------------------------------------------------------------

#[tokio::test]
async fn completion_is_irreversible() {
    let h = Harness::new();
    h.enroll(1, 500).await;
    let a = h.store.add_achievement(achievement("Triple", "course_count", 3, 0));

    h.activity.set_count(1, CriteriaType::CourseCount, None, 3);
    let result = h.engine.award(1, "course_completion", 10, None).await.unwrap();
    assert_eq!(result.new_achievements.len(), 1);
    let completed = h.store.get_progress(1, a.id).await.unwrap().unwrap();

    h.activity.set_count(1, CriteriaType::CourseCount, None, 0);
    h.advance_days(1);
    let again = h.engine.evaluate(1).await.unwrap();
    assert!(again.new_achievements.is_empty());

    let after = h.store.get_progress(1, a.id).await.unwrap().unwrap();
    assert_eq!(after, completed);
}

#[tokio::test]
async fn progress_never_decreases() {
    let h = Harness::new();
    h.enroll(1, 500).await;
    let a = h.store.add_achievement(achievement("Ten Reviews", "review_count", 10, 0));

    h.activity.set_count(1, CriteriaType::ReviewCount, None, 5);
    h.engine.award(1, "review_posted", 5, None).await.unwrap();
    assert_eq!(h.store.get_progress(1, a.id).await.unwrap().unwrap().progress, 50);

    // A review was deleted.
    h.activity.set_count(1, CriteriaType::ReviewCount, None, 3);
    h.engine.evaluate(1).await.unwrap();
    let record = h.store.get_progress(1, a.id).await.unwrap().unwrap();
    assert_eq!(record.progress, 50);
    assert_eq!(record.progress_history.0.len(), 1);

    h.activity.set_count(1, CriteriaType::ReviewCount, None, 6);
    h.engine.evaluate(1).await.unwrap();
    let record = h.store.get_progress(1, a.id).await.unwrap().unwrap();
    assert_eq!(record.progress, 60);
    assert_eq!(record.progress_history.0.len(), 2);
    assert_eq!(record.progress_history.0[0].milestone, Some(50));
    assert_eq!(record.progress_history.0[1].milestone, None);
}

#[tokio::test]
async fn no_record_without_progress() {
    let h = Harness::new();
    h.enroll(1, 500).await;
    let a = h.store.add_achievement(achievement("Watcher", "video_count", 5, 0));

    h.engine.award(1, "course_progress", 10, None).await.unwrap();
    assert!(h.store.get_progress(1, a.id).await.unwrap().is_none());
}

#[tokio::test]
async fn domain_filter_narrows_the_count() {
    let h = Harness::new();
    h.enroll(1, 500).await;
    let mut def = achievement("Mathematician", "course_count", 2, 0);
    def.domain_filter = Some("math".to_string());
    let a = h.store.add_achievement(def);

    h.activity.set_count(1, CriteriaType::CourseCount, Some("math"), 1);
    h.activity.set_count(1, CriteriaType::CourseCount, Some("art"), 5);
    h.engine.award(1, "course_completion", 10, None).await.unwrap();

    let record = h.store.get_progress(1, a.id).await.unwrap().unwrap();
    assert_eq!(record.progress, 50);
    assert!(!record.is_completed);
}

// ---------------------------------------------------------------------------
// Catalog edge cases
// ---------------------------------------------------------------------------

#[tokio::test]
async fn inactive_achievement_is_skipped_and_resumes() {
    let h = Harness::new();
    h.enroll(1, 500).await;
    let a = h.store.add_achievement(achievement("Scholar", "course_count", 10, 0));

    h.activity.set_count(1, CriteriaType::CourseCount, None, 4);
    h.engine.evaluate(1).await.unwrap();
    assert_eq!(h.store.get_progress(1, a.id).await.unwrap().unwrap().progress, 40);

    assert!(h.store.set_achievement_active(a.id, false));
    h.activity.set_count(1, CriteriaType::CourseCount, None, 10);
    let paused = h.engine.evaluate(1).await.unwrap();
    assert!(paused.new_achievements.is_empty());
    assert_eq!(h.store.get_progress(1, a.id).await.unwrap().unwrap().progress, 40);

    assert!(h.store.set_achievement_active(a.id, true));
    let resumed = h.engine.evaluate(1).await.unwrap();
    assert_eq!(resumed.new_achievements.len(), 1);
    let record = h.store.get_progress(1, a.id).await.unwrap().unwrap();
    assert_eq!(record.progress_history.0.len(), 2);
}

#[tokio::test]
async fn non_positive_threshold_completes_with_warning() {
    let h = Harness::new();
    h.enroll(1, 500).await;
    let a = h.store.add_achievement(achievement("Freebie", "course_count", 0, 0));

    let result = h.engine.award(1, "daily_login", 10, None).await.unwrap();
    assert_eq!(result.new_achievements[0].id, a.id);
    assert_eq!(result.evaluation, EvaluationStatus::Completed);
    assert!(result.warnings.iter().any(|w| matches!(
        w,
        EngineWarning::Configuration { achievement_id, .. } if *achievement_id == a.id
    )));
}

#[tokio::test]
async fn unknown_criteria_type_is_reported_not_fatal() {
    let h = Harness::new();
    h.enroll(1, 500).await;
    let a = h.store.add_achievement(achievement("Mystery", "telepathy", 1, 0));

    let result = h.engine.award(1, "daily_login", 10, None).await.unwrap();
    assert!(result.new_achievements.is_empty());
    assert_eq!(result.evaluation, EvaluationStatus::Completed);
    assert_matches!(
        result.warnings.as_slice(),
        [EngineWarning::Configuration { achievement_id, .. }] if *achievement_id == a.id
    );
}

#[tokio::test]
async fn seasonal_achievement_only_counts_inside_its_window() {
    let h = Harness::new();
    h.enroll(1, 500).await;
    let mut def = achievement("Spring Sprint", "course_count", 1, 0);
    def.season_starts_at = Some(start() + chrono::Duration::days(2));
    def.season_ends_at = Some(start() + chrono::Duration::days(4));
    let a = h.store.add_achievement(def);
    h.activity.set_count(1, CriteriaType::CourseCount, None, 1);

    let before = h.engine.evaluate(1).await.unwrap();
    assert!(before.new_achievements.is_empty());
    assert!(h.store.get_progress(1, a.id).await.unwrap().is_none());

    h.advance_days(2);
    let during = h.engine.evaluate(1).await.unwrap();
    assert_eq!(during.new_achievements.len(), 1);
}

#[tokio::test]
async fn season_end_is_exclusive() {
    let h = Harness::new();
    h.enroll(1, 500).await;
    let mut def = achievement("Flash", "course_count", 1, 0);
    def.season_ends_at = Some(start());
    h.store.add_achievement(def);
    h.activity.set_count(1, CriteriaType::CourseCount, None, 1);

    let result = h.engine.evaluate(1).await.unwrap();
    assert!(result.new_achievements.is_empty());
}

// ---------------------------------------------------------------------------
// Rewards
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reward_xp_can_unlock_xp_achievements() {
    let h = Harness::new();
    h.enroll(1, 500).await;
    let first = h.store.add_achievement(achievement("First Course", "course_count", 1, 300));
    let rich = h.store.add_achievement(achievement("Rich", "xp_total", 300, 50));
    h.activity.set_count(1, CriteriaType::CourseCount, None, 1);

    let result = h.engine.award(1, "course_completion", 10, None).await.unwrap();

    let ids: Vec<i64> = result.new_achievements.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![first.id, rich.id]);
    assert_eq!(result.bonus_granted, 350);
    assert_eq!(result.xp, 360);
    assert_eq!(result.evaluation, EvaluationStatus::Completed);
}

#[tokio::test]
async fn rewards_respect_the_daily_cap() {
    let h = Harness::new();
    h.enroll(1, 50).await;
    h.store.add_achievement(achievement("Big Prize", "course_count", 1, 100));
    h.activity.set_count(1, CriteriaType::CourseCount, None, 1);

    let result = h.engine.award(1, "course_completion", 40, None).await.unwrap();
    assert_eq!(result.granted, 40);
    assert_eq!(result.bonus_granted, 10);
    assert!(result.daily_cap_reached);
}

#[tokio::test]
async fn reward_cap_stops_processing_with_warning() {
    let h = Harness::with_config(EngineConfig {
        max_chain_awards: 2,
        ..EngineConfig::default()
    });
    h.enroll(1, 1_000).await;
    for name in ["One", "Two", "Three"] {
        h.store.add_achievement(achievement(name, "course_count", 1, 10));
    }
    h.activity.set_count(1, CriteriaType::CourseCount, None, 1);

    let result = h.engine.award(1, "course_completion", 10, None).await.unwrap();

    assert_eq!(result.new_achievements.len(), 3);
    assert_eq!(result.bonus_granted, 20);
    assert!(result
        .warnings
        .contains(&EngineWarning::AchievementChainTooDeep { limit: 2 }));
    assert_eq!(h.store.count_completed_achievements(1).await.unwrap(), 3);
}

#[tokio::test]
async fn manual_evaluation_grants_rewards() {
    let h = Harness::new();
    h.enroll(1, 500).await;
    h.engine.award(1, "daily_login", 10, None).await.unwrap();
    let a = h.store.add_achievement(achievement("Critic", "review_count", 2, 25));

    h.activity.set_count(1, CriteriaType::ReviewCount, None, 2);
    let result = h.engine.evaluate(1).await.unwrap();

    assert_eq!(result.new_achievements[0].id, a.id);
    assert_eq!(result.bonus_granted, 25);
    assert_eq!(result.xp, 35);
}

#[tokio::test]
async fn evaluating_unknown_user_is_not_found() {
    let h = Harness::new();
    let err = h.engine.evaluate(9).await.unwrap_err();
    assert_matches!(err, GamificationError::NotFound { id: 9, .. });
}

// ---------------------------------------------------------------------------
// Chains
// ---------------------------------------------------------------------------

#[tokio::test]
async fn gated_successor_waits_for_predecessor() {
    let h = Harness::with_config(EngineConfig {
        gate_chained_achievements: true,
        ..EngineConfig::default()
    });
    h.enroll(1, 500).await;
    let base = h.store.add_achievement(achievement("Five Courses", "course_count", 5, 0));
    let mut next = achievement("First Review", "review_count", 1, 0);
    next.chained_from = Some(base.id);
    let next = h.store.add_achievement(next);

    h.activity.set_count(1, CriteriaType::CourseCount, None, 1);
    h.activity.set_count(1, CriteriaType::ReviewCount, None, 1);
    let blocked = h.engine.evaluate(1).await.unwrap();
    assert!(blocked.new_achievements.is_empty());
    assert!(h.store.get_progress(1, next.id).await.unwrap().is_none());

    h.activity.set_count(1, CriteriaType::CourseCount, None, 5);
    let unlocked = h.engine.evaluate(1).await.unwrap();
    let ids: Vec<i64> = unlocked.new_achievements.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![base.id, next.id]);
}

#[tokio::test]
async fn chains_do_not_gate_by_default() {
    let h = Harness::new();
    h.enroll(1, 500).await;
    let base = h.store.add_achievement(achievement("Five Courses", "course_count", 5, 0));
    let mut next = achievement("First Review", "review_count", 1, 0);
    next.chained_from = Some(base.id);
    let next = h.store.add_achievement(next);

    h.activity.set_count(1, CriteriaType::ReviewCount, None, 1);
    let result = h.engine.evaluate(1).await.unwrap();
    assert_eq!(result.new_achievements[0].id, next.id);
}

#[tokio::test]
async fn cyclic_chain_is_evaluated_ungated_and_reported() {
    let h = Harness::with_config(EngineConfig {
        gate_chained_achievements: true,
        ..EngineConfig::default()
    });
    h.enroll(1, 500).await;
    let a = h.store.add_achievement(achievement("Loop A", "course_count", 1, 0));
    let b = h.store.add_achievement(achievement("Loop B", "course_count", 1, 0));
    h.store.set_chained_from(a.id, Some(b.id));
    h.store.set_chained_from(b.id, Some(a.id));
    h.activity.set_count(1, CriteriaType::CourseCount, None, 1);

    let result = h.engine.evaluate(1).await.unwrap();
    assert_eq!(result.new_achievements.len(), 2);
    let flagged: Vec<i64> = result
        .warnings
        .iter()
        .filter_map(|w| match w {
            EngineWarning::Configuration { achievement_id, .. } => Some(*achievement_id),
            _ => None,
        })
        .collect();
    assert_eq!(flagged, vec![a.id, b.id]);

    let chains = h.engine.achievement_chains(1).await.unwrap();
    assert!(chains.chains.is_empty());
    assert_eq!(chains.warnings.len(), 2);
}

#[tokio::test]
async fn chain_view_shows_user_progress() {
    let h = Harness::new();
    h.enroll(1, 500).await;
    let one = h.store.add_achievement(achievement("1 Course", "course_count", 1, 0));
    let mut five = achievement("5 Courses", "course_count", 5, 0);
    five.chained_from = Some(one.id);
    let five = h.store.add_achievement(five);
    let mut ten = achievement("10 Courses", "course_count", 10, 0);
    ten.chained_from = Some(five.id);
    let ten = h.store.add_achievement(ten);
    h.store.add_achievement(achievement("Loner", "review_count", 1, 0));

    h.activity.set_count(1, CriteriaType::CourseCount, None, 2);
    h.engine.evaluate(1).await.unwrap();

    let report = h.engine.achievement_chains(1).await.unwrap();
    assert_eq!(report.chains.len(), 1);
    let chain = &report.chains[0];
    assert_eq!(chain.root_id, one.id);
    let view: Vec<(i64, i16, bool)> = chain
        .links
        .iter()
        .map(|l| (l.achievement_id, l.progress, l.is_completed))
        .collect();
    assert_eq!(view, vec![(one.id, 100, true), (five.id, 40, false), (ten.id, 20, false)]);
}

// ---------------------------------------------------------------------------
// Partial failure and reconciliation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_evaluation_keeps_xp_and_queues_user() {
    let h = Harness::new();
    h.enroll(1, 500).await;
    let a = h.store.add_achievement(achievement("First Course", "course_count", 1, 20));
    h.activity.set_unavailable(true);

    let result = h.engine.award(1, "course_completion", 10, None).await.unwrap();
    assert_eq!(result.granted, 10);
    assert_eq!(result.xp, 10);
    assert_eq!(result.evaluation, EvaluationStatus::Failed);
    assert_matches!(
        result.warnings.as_slice(),
        [EngineWarning::EvaluationFailed { .. }]
    );
    assert_eq!(h.store.queued_users(), vec![1]);

    h.activity.set_unavailable(false);
    h.activity.set_count(1, CriteriaType::CourseCount, None, 1);
    let stats = h.engine.reconcile(10).await.unwrap();
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.unlocked, 1);
    assert_eq!(stats.failed, 0);
    assert!(h.store.queued_users().is_empty());

    let record = h.store.get_progress(1, a.id).await.unwrap().unwrap();
    assert!(record.is_completed);
    let state = h.store.get_user_state(1).await.unwrap().unwrap();
    assert_eq!(state.xp, 30);
}

#[tokio::test]
async fn one_failed_lookup_does_not_hide_other_unlocks() {
    let h = Harness::new();
    h.enroll(1, 500).await;
    let streak = h.store.add_achievement(achievement("Day One", "daily_streak", 1, 0));
    h.store.add_achievement(achievement("First Course", "course_count", 1, 0));
    h.activity.set_unavailable(true);

    let result = h.engine.award(1, "daily_login", 10, None).await.unwrap();
    let ids: Vec<i64> = result.new_achievements.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![streak.id]);
    assert_eq!(result.evaluation, EvaluationStatus::Failed);
    assert_eq!(h.store.queued_users(), vec![1]);
}

#[tokio::test(start_paused = true)]
async fn slow_activity_lookup_times_out() {
    let h = Harness::with_config(EngineConfig {
        evaluation_timeout: Duration::from_millis(20),
        ..EngineConfig::default()
    });
    h.enroll(1, 500).await;
    h.store.add_achievement(achievement("First Course", "course_count", 1, 0));
    h.activity.set_delay(Some(Duration::from_secs(5)));

    let result = h.engine.award(1, "course_completion", 10, None).await.unwrap();
    assert_eq!(result.granted, 10);
    assert_eq!(result.evaluation, EvaluationStatus::Failed);
    assert!(result
        .warnings
        .contains(&EngineWarning::EvaluationTimedOut { after_ms: 20 }));
    assert_eq!(h.store.queued_users(), vec![1]);
}

/// A memory store whose catalog reads, and progress writes after the
/// first `fast_saves`, stall for `delay`.
struct StallingStore {
    inner: Arc<MemoryProgressStore>,
    delay: Duration,
    stall_catalog: bool,
    fast_saves: AtomicUsize,
}

#[async_trait]
impl ProgressStore for StallingStore {
    async fn create_user_state(
        &self,
        input: &CreateGamificationState,
    ) -> Result<UserGamificationState, StoreError> {
        self.inner.create_user_state(input).await
    }

    async fn get_user_state(
        &self,
        user_id: DbId,
    ) -> Result<Option<UserGamificationState>, StoreError> {
        self.inner.get_user_state(user_id).await
    }

    async fn save_user_state(
        &self,
        state: &UserGamificationState,
    ) -> Result<UserGamificationState, StoreError> {
        self.inner.save_user_state(state).await
    }

    async fn get_progress(
        &self,
        user_id: DbId,
        achievement_id: DbId,
    ) -> Result<Option<UserAchievementProgress>, StoreError> {
        self.inner.get_progress(user_id, achievement_id).await
    }

    async fn list_progress(
        &self,
        user_id: DbId,
    ) -> Result<Vec<UserAchievementProgress>, StoreError> {
        self.inner.list_progress(user_id).await
    }

    async fn save_progress(
        &self,
        input: &UpsertProgress,
    ) -> Result<Option<UserAchievementProgress>, StoreError> {
        let fast = self
            .fast_saves
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !fast {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.save_progress(input).await
    }

    async fn list_active_achievements(&self) -> Result<Vec<Achievement>, StoreError> {
        if self.stall_catalog {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.list_active_achievements().await
    }

    async fn count_completed_achievements(&self, user_id: DbId) -> Result<i64, StoreError> {
        self.inner.count_completed_achievements(user_id).await
    }

    async fn leaderboard(
        &self,
        metric: LeaderboardMetric,
        offset: i64,
        limit: i64,
    ) -> Result<LeaderboardSlice, StoreError> {
        self.inner.leaderboard(metric, offset, limit).await
    }

    async fn flag_for_reevaluation(&self, user_id: DbId, reason: &str) -> Result<(), StoreError> {
        self.inner.flag_for_reevaluation(user_id, reason).await
    }

    async fn take_reevaluation_batch(&self, limit: i64) -> Result<Vec<DbId>, StoreError> {
        self.inner.take_reevaluation_batch(limit).await
    }
}

fn stalling_engine(store: StallingStore) -> GamificationEngine {
    GamificationEngine::new(
        Arc::new(store),
        Arc::new(StaticCourseActivity::new()),
        Arc::new(ManualClock::new(start())),
        EngineConfig {
            evaluation_pass_timeout: Duration::from_millis(50),
            ..EngineConfig::default()
        },
    )
}

#[tokio::test(start_paused = true)]
async fn stalled_catalog_read_reports_partial_success() {
    let inner = Arc::new(MemoryProgressStore::new());
    let engine = stalling_engine(StallingStore {
        inner: Arc::clone(&inner),
        delay: Duration::from_secs(3600),
        stall_catalog: true,
        fast_saves: AtomicUsize::new(usize::MAX),
    });
    engine.enroll(1, Some(500)).await.unwrap();

    let result = tokio::time::timeout(
        Duration::from_secs(10),
        engine.award(1, "daily_login", 40, None),
    )
    .await
    .expect("award must not wait on a stalled store")
    .unwrap();

    assert_eq!(result.granted, 40);
    assert_eq!(result.evaluation, EvaluationStatus::Failed);
    assert!(result
        .warnings
        .contains(&EngineWarning::EvaluationTimedOut { after_ms: 50 }));
    assert_eq!(inner.get_user_state(1).await.unwrap().unwrap().xp, 40);
    assert_eq!(inner.queued_users(), vec![1]);
}

#[tokio::test(start_paused = true)]
async fn unlocks_written_before_a_stall_keep_their_rewards() {
    let inner = Arc::new(MemoryProgressStore::new());
    let first = inner.add_achievement(achievement("Day One", "daily_streak", 1, 20));
    let second = inner.add_achievement(achievement("Also Day One", "daily_streak", 1, 0));
    let engine = stalling_engine(StallingStore {
        inner: Arc::clone(&inner),
        delay: Duration::from_secs(3600),
        stall_catalog: false,
        fast_saves: AtomicUsize::new(1),
    });
    engine.enroll(1, Some(500)).await.unwrap();

    let result = tokio::time::timeout(
        Duration::from_secs(10),
        engine.award(1, "daily_login", 10, None),
    )
    .await
    .expect("award must not wait on a stalled store")
    .unwrap();

    let ids: Vec<i64> = result.new_achievements.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![first.id]);
    assert_eq!(result.bonus_granted, 20);
    assert_eq!(result.xp, 30);
    assert_eq!(result.evaluation, EvaluationStatus::Failed);
    assert!(inner.get_progress(1, second.id).await.unwrap().is_none());
    assert_eq!(inner.queued_users(), vec![1]);
}

#[tokio::test(start_paused = true)]
async fn stalled_manual_evaluation_is_queued() {
    let inner = Arc::new(MemoryProgressStore::new());
    let engine = stalling_engine(StallingStore {
        inner: Arc::clone(&inner),
        delay: Duration::from_secs(3600),
        stall_catalog: true,
        fast_saves: AtomicUsize::new(usize::MAX),
    });
    engine.enroll(1, Some(500)).await.unwrap();

    let result = engine.evaluate(1).await.unwrap();
    assert_eq!(result.evaluation, EvaluationStatus::Failed);
    assert!(result.new_achievements.is_empty());
    assert_eq!(inner.queued_users(), vec![1]);
}

#[tokio::test]
async fn reconcile_drops_users_without_state() {
    let h = Harness::new();
    h.store.flag_for_reevaluation(77, "timeout").await.unwrap();

    let stats = h.engine.reconcile(10).await.unwrap();
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.failed, 0);
    assert!(h.store.queued_users().is_empty());
}
