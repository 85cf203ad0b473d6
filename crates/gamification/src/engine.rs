//! The engine facade.
//!
//! [`GamificationEngine`] composes the awarder, evaluator and ranker over
//! one store, serializes mutations per user, settles achievement rewards
//! and publishes events.

use std::sync::Arc;

use edquest_core::activity::{validate_activity_type, ACTIVITY_ACHIEVEMENT_EARNED};
use edquest_core::clock::Clock;
use edquest_core::daily_cap::{available, is_new_day};
use edquest_core::error::CoreError;
use edquest_core::leaderboard::LeaderboardMetric;
use edquest_core::levels::level_progress;
use edquest_core::streaks::{StreakChange, StreakState};
use edquest_core::types::DbId;
use edquest_db::models::achievement::Achievement;
use edquest_db::models::gamification::{CreateGamificationState, UserGamificationState};
use edquest_events::{EventBus, PlatformEvent};
use serde::Serialize;

use crate::activity::CourseActivity;
use crate::awarder::{AppliedXp, XpAwarder};
use crate::config::EngineConfig;
use crate::error::{EngineWarning, EvaluationStatus, GamificationError};
use crate::evaluator::{AchievementEvaluator, ChainsReport, EvaluationReport};
use crate::locks::UserLocks;
use crate::ranker::{LeaderboardPage, LeaderboardRanker};
use crate::store::ProgressStore;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Outcome of [`GamificationEngine::award`].
#[derive(Debug, Clone, Serialize)]
pub struct AwardResult {
    pub user_id: DbId,
    pub activity_type: String,
    pub requested: i64,
    /// XP granted for the activity itself, after the daily cap.
    pub granted: i64,
    /// XP granted from rewards of achievements unlocked by this award.
    pub bonus_granted: i64,
    pub xp: i64,
    pub new_level: i32,
    pub level_up: bool,
    pub new_achievements: Vec<Achievement>,
    pub daily_cap_reached: bool,
    pub streak: StreakState,
    pub evaluation: EvaluationStatus,
    pub warnings: Vec<EngineWarning>,
}

/// Outcome of [`GamificationEngine::evaluate`].
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResult {
    pub user_id: DbId,
    pub new_achievements: Vec<Achievement>,
    pub bonus_granted: i64,
    pub xp: i64,
    pub level: i32,
    pub evaluation: EvaluationStatus,
    pub warnings: Vec<EngineWarning>,
}

/// A user's gamification standing, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GamificationSummary {
    pub user_id: DbId,
    pub xp: i64,
    pub level: i32,
    pub next_level_xp: i64,
    pub xp_to_next_level: i64,
    /// Percentage through the current level, 0-100.
    pub level_percent: u8,
    pub daily_xp_earned: i64,
    pub daily_xp_cap: i64,
    pub daily_xp_remaining: i64,
    pub streak: StreakState,
    /// Whether the streak can still be continued today.
    pub streak_alive: bool,
    pub achievement_count: i64,
}

/// Totals from one reconciliation batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    pub processed: usize,
    pub unlocked: usize,
    /// Users re-queued because evaluation failed again.
    pub failed: usize,
}

/// Achievements settled after an evaluation, with their rewards.
struct Settlement {
    unlocked: Vec<Achievement>,
    bonus_granted: i64,
    /// Latest state written by a reward, if any.
    state: Option<UserGamificationState>,
    status: EvaluationStatus,
    warnings: Vec<EngineWarning>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct GamificationEngine {
    store: Arc<dyn ProgressStore>,
    clock: Arc<dyn Clock>,
    config: Arc<EngineConfig>,
    awarder: XpAwarder,
    evaluator: AchievementEvaluator,
    ranker: LeaderboardRanker,
    locks: UserLocks,
    events: Option<Arc<EventBus>>,
}

impl GamificationEngine {
    pub fn new(
        store: Arc<dyn ProgressStore>,
        activity: Arc<dyn CourseActivity>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        let config = Arc::new(config);
        Self {
            awarder: XpAwarder::new(Arc::clone(&store), Arc::clone(&clock), Arc::clone(&config)),
            evaluator: AchievementEvaluator::new(
                Arc::clone(&store),
                activity,
                Arc::clone(&clock),
                Arc::clone(&config),
            ),
            ranker: LeaderboardRanker::new(Arc::clone(&store), Arc::clone(&config)),
            locks: UserLocks::new(),
            events: None,
            store,
            clock,
            config,
        }
    }

    /// Publish engine events on `bus`.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create the user's gamification state with zeroed counters.
    ///
    /// Idempotent: an existing state is returned unchanged.
    pub async fn enroll(
        &self,
        user_id: DbId,
        daily_xp_cap: Option<i64>,
    ) -> Result<UserGamificationState, GamificationError> {
        let daily_xp_cap = daily_xp_cap.unwrap_or(self.config.default_daily_xp_cap);
        if daily_xp_cap < 0 {
            return Err(GamificationError::Validation(format!(
                "Daily XP cap must not be negative, got {daily_xp_cap}"
            )));
        }
        let state = self
            .store
            .create_user_state(&CreateGamificationState {
                user_id,
                daily_xp_cap,
                last_xp_reset: self.clock.now(),
            })
            .await?;
        tracing::info!(user_id, daily_xp_cap = state.daily_xp_cap, "User enrolled");
        Ok(state)
    }

    /// Award XP for an activity, then evaluate achievements and grant their
    /// rewards.
    ///
    /// The XP write is committed before evaluation starts. If evaluation
    /// fails the award still succeeds: the result reports
    /// [`EvaluationStatus::Failed`] and the user is queued for
    /// reconciliation.
    pub async fn award(
        &self,
        user_id: DbId,
        activity_type: &str,
        amount: i64,
        metadata: Option<serde_json::Value>,
    ) -> Result<AwardResult, GamificationError> {
        validate_activity_type(activity_type).map_err(CoreError::Validation)?;
        let _guard = self.locks.lock(user_id).await;

        let applied = self.awarder.apply(user_id, activity_type, amount).await?;
        self.publish_applied(&applied, activity_type, metadata);

        if applied.granted <= 0 {
            tracing::debug!(
                user_id,
                activity_type,
                daily_cap_reached = applied.daily_cap_reached,
                "Nothing granted"
            );
            return Ok(AwardResult {
                user_id,
                activity_type: activity_type.to_string(),
                requested: amount,
                granted: 0,
                bonus_granted: 0,
                xp: applied.state.xp,
                new_level: applied.state.level,
                level_up: false,
                new_achievements: Vec::new(),
                daily_cap_reached: applied.daily_cap_reached,
                streak: applied.state.streak(),
                evaluation: EvaluationStatus::Skipped,
                warnings: Vec::new(),
            });
        }

        let first = self.evaluate_pass(user_id).await.map_err(|e| {
            EngineWarning::EvaluationFailed {
                message: e.to_string(),
            }
        });
        let settlement = self.settle(user_id, first).await;

        let state = settlement.state.unwrap_or(applied.state);
        let daily_cap_reached = applied.daily_cap_reached
            || available(state.daily_xp_cap, state.daily_xp_earned) == 0;
        Ok(AwardResult {
            user_id,
            activity_type: activity_type.to_string(),
            requested: amount,
            granted: applied.granted,
            bonus_granted: settlement.bonus_granted,
            xp: state.xp,
            new_level: state.level,
            level_up: state.level > applied.previous_level,
            new_achievements: settlement.unlocked,
            daily_cap_reached,
            streak: state.streak(),
            evaluation: settlement.status,
            warnings: settlement.warnings,
        })
    }

    /// Re-evaluate a user's achievements and grant any rewards.
    ///
    /// Unlike the pass inside [`award`](Self::award), a failure to load the
    /// user's state or the catalog is returned as an error.
    pub async fn evaluate(&self, user_id: DbId) -> Result<EvaluationResult, GamificationError> {
        let _guard = self.locks.lock(user_id).await;

        let first = self.evaluate_pass(user_id).await?;
        let settlement = self.settle(user_id, Ok(first)).await;

        let state = match settlement.state {
            Some(state) => state,
            None => self.load_state(user_id).await?,
        };
        Ok(EvaluationResult {
            user_id,
            new_achievements: settlement.unlocked,
            bonus_granted: settlement.bonus_granted,
            xp: state.xp,
            level: state.level,
            evaluation: settlement.status,
            warnings: settlement.warnings,
        })
    }

    /// One page of the leaderboard for `metric`.
    pub async fn rank(
        &self,
        metric: LeaderboardMetric,
        page: i64,
        page_size: i64,
    ) -> Result<LeaderboardPage, GamificationError> {
        self.ranker.rank(metric, page, page_size).await
    }

    /// Override a user's daily XP cap.
    pub async fn set_daily_xp_cap(
        &self,
        user_id: DbId,
        cap: i64,
    ) -> Result<UserGamificationState, GamificationError> {
        let _guard = self.locks.lock(user_id).await;
        self.awarder.set_daily_cap(user_id, cap).await
    }

    pub async fn summary(&self, user_id: DbId) -> Result<GamificationSummary, GamificationError> {
        let state = self.load_state(user_id).await?;
        let achievement_count = self.store.count_completed_achievements(user_id).await?;
        let now = self.clock.now();
        let offset = self.config.reference_offset();

        let daily_xp_earned = if is_new_day(state.last_xp_reset, now, offset) {
            0
        } else {
            state.daily_xp_earned
        };
        let level = level_progress(state.xp);
        let streak = state.streak();

        Ok(GamificationSummary {
            user_id,
            xp: state.xp,
            level: state.level,
            next_level_xp: level.next_level_xp,
            xp_to_next_level: level.xp_to_next_level,
            level_percent: level.percent,
            daily_xp_earned,
            daily_xp_cap: state.daily_xp_cap,
            daily_xp_remaining: available(state.daily_xp_cap, daily_xp_earned),
            streak_alive: streak.is_alive(now, offset),
            streak,
            achievement_count,
        })
    }

    /// Display chains with the user's progress on each link.
    pub async fn achievement_chains(&self, user_id: DbId) -> Result<ChainsReport, GamificationError> {
        self.evaluator.chains(user_id).await
    }

    /// Drain up to `limit` users from the reconciliation queue and
    /// re-evaluate each.
    pub async fn reconcile(&self, limit: i64) -> Result<ReconcileStats, GamificationError> {
        let users = self.store.take_reevaluation_batch(limit).await?;
        let mut stats = ReconcileStats::default();

        for user_id in users {
            stats.processed += 1;
            match self.evaluate(user_id).await {
                Ok(result) => {
                    stats.unlocked += result.new_achievements.len();
                    if result.evaluation == EvaluationStatus::Failed {
                        stats.failed += 1;
                    }
                }
                Err(GamificationError::NotFound { .. }) => {
                    tracing::warn!(user_id, "Queued user has no gamification state, dropping");
                }
                Err(e) => {
                    stats.failed += 1;
                    tracing::error!(user_id, error = %e, "Reconciliation failed");
                    self.flag(user_id, &e.to_string()).await;
                }
            }
        }

        if stats.processed > 0 {
            tracing::info!(
                processed = stats.processed,
                unlocked = stats.unlocked,
                failed = stats.failed,
                "Reconciliation batch complete"
            );
        }
        Ok(stats)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Grant rewards for unlocked achievements, re-evaluating after any
    /// reward that granted XP, until nothing new unlocks.
    ///
    /// At most `max_chain_awards` rewards are granted per call. Rewards go
    /// through the daily cap like any other XP.
    async fn settle(
        &self,
        user_id: DbId,
        first: Result<EvaluationReport, EngineWarning>,
    ) -> Settlement {
        let mut settlement = Settlement {
            unlocked: Vec::new(),
            bonus_granted: 0,
            state: None,
            status: EvaluationStatus::Completed,
            warnings: Vec::new(),
        };
        let limit = self.config.max_chain_awards;
        let mut rewards_granted = 0u32;
        let mut next = Some(first);

        while let Some(round) = next.take() {
            let report = match round {
                Ok(report) => report,
                Err(warning) => {
                    tracing::warn!(user_id, %warning, "Achievement evaluation failed");
                    settlement.warnings.push(warning);
                    settlement.status = EvaluationStatus::Failed;
                    break;
                }
            };
            if !report.is_complete() {
                settlement.status = EvaluationStatus::Failed;
            }
            settlement.warnings.extend(report.warnings);

            let mut xp_changed = false;
            let mut exhausted = false;
            for achievement in report.unlocked {
                self.publish(PlatformEvent::achievement_unlocked(
                    user_id,
                    achievement.id,
                    &achievement.name,
                    &achievement.rarity,
                    achievement.xp_reward,
                    self.clock.now(),
                ));

                if achievement.xp_reward > 0 && !exhausted {
                    if rewards_granted >= limit {
                        let warning = EngineWarning::AchievementChainTooDeep { limit };
                        tracing::warn!(user_id, %warning, "Stopping achievement rewards");
                        settlement.warnings.push(warning);
                        exhausted = true;
                    } else {
                        rewards_granted += 1;
                        match self
                            .awarder
                            .apply(user_id, ACTIVITY_ACHIEVEMENT_EARNED, achievement.xp_reward)
                            .await
                        {
                            Ok(applied) => {
                                self.publish_applied(&applied, ACTIVITY_ACHIEVEMENT_EARNED, None);
                                settlement.bonus_granted += applied.granted;
                                xp_changed |= applied.granted > 0;
                                settlement.state = Some(applied.state);
                            }
                            Err(e) => {
                                let warning = EngineWarning::RewardFailed {
                                    achievement_id: achievement.id,
                                    message: e.to_string(),
                                };
                                tracing::warn!(user_id, %warning, "Achievement reward failed");
                                settlement.warnings.push(warning);
                            }
                        }
                    }
                }
                settlement.unlocked.push(achievement);
            }

            // XP-based criteria can only change if a reward granted XP.
            if xp_changed && !exhausted {
                next = Some(self.evaluate_pass(user_id).await.map_err(|e| {
                    EngineWarning::EvaluationFailed {
                        message: e.to_string(),
                    }
                }));
            }
        }

        if settlement.status == EvaluationStatus::Failed {
            let reason = settlement
                .warnings
                .iter()
                .rev()
                .find(|w| {
                    matches!(
                        w,
                        EngineWarning::EvaluationFailed { .. }
                            | EngineWarning::EvaluationTimedOut { .. }
                    )
                })
                .map_or_else(|| "evaluation incomplete".to_string(), ToString::to_string);
            self.flag(user_id, &reason).await;
        }
        settlement
    }

    /// One evaluation pass bounded by `evaluation_pass_timeout`.
    ///
    /// A pass that runs out keeps the unlocks it already wrote and is
    /// reported incomplete, so [`settle`](Self::settle) still grants their
    /// rewards and queues the user for reconciliation.
    async fn evaluate_pass(&self, user_id: DbId) -> Result<EvaluationReport, GamificationError> {
        let limit = self.config.evaluation_pass_timeout;
        let mut report = EvaluationReport::new(user_id);
        let outcome =
            tokio::time::timeout(limit, self.evaluator.evaluate_into(user_id, &mut report)).await;
        match outcome {
            Ok(result) => result.map(|()| report),
            Err(_) => {
                report.fail(EngineWarning::EvaluationTimedOut {
                    after_ms: limit.as_millis() as u64,
                });
                Ok(report)
            }
        }
    }

    async fn flag(&self, user_id: DbId, reason: &str) {
        match self.store.flag_for_reevaluation(user_id, reason).await {
            Ok(()) => tracing::info!(user_id, reason, "User queued for re-evaluation"),
            Err(e) => tracing::error!(
                user_id,
                error = %e,
                "Failed to queue user for re-evaluation"
            ),
        }
    }

    async fn load_state(&self, user_id: DbId) -> Result<UserGamificationState, GamificationError> {
        self.store
            .get_user_state(user_id)
            .await?
            .ok_or(GamificationError::NotFound {
                entity: "user_gamification",
                id: user_id,
            })
    }

    fn publish(&self, event: PlatformEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }

    fn publish_applied(
        &self,
        applied: &AppliedXp,
        activity_type: &str,
        metadata: Option<serde_json::Value>,
    ) {
        if self.events.is_none() || applied.granted <= 0 {
            return;
        }
        let now = self.clock.now();
        let state = &applied.state;

        let mut awarded =
            PlatformEvent::xp_awarded(state.user_id, activity_type, applied.granted, state.xp, now);
        if let Some(metadata) = metadata {
            awarded.payload["metadata"] = metadata;
        }
        self.publish(awarded);

        if applied.level_up() {
            self.publish(PlatformEvent::level_up(
                state.user_id,
                applied.previous_level,
                state.level,
                now,
            ));
        }
        match applied.streak_change {
            Some(StreakChange::Started | StreakChange::Extended) => {
                self.publish(PlatformEvent::streak_extended(
                    state.user_id,
                    state.streak_current,
                    state.streak_longest,
                    now,
                ));
            }
            Some(StreakChange::Reset { previous }) => {
                self.publish(PlatformEvent::streak_reset(
                    state.user_id,
                    previous,
                    state.streak_current,
                    state.streak_longest,
                    now,
                ));
            }
            Some(StreakChange::Unchanged) | None => {}
        }
    }
}
