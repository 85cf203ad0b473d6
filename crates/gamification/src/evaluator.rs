//! Achievement evaluation.
//!
//! Walks the active catalog for one user, computes each achievement's
//! criteria value, and merges progress into the store. Completed records
//! are never revisited and stored progress never goes down.
//!
//! One achievement failing to evaluate (activity lookup error or timeout,
//! failed write) does not stop the pass: it is counted in
//! [`EvaluationReport::failed`] and the rest are still evaluated, so every
//! unlock that was written is reported.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use edquest_core::achievements::{
    incomplete_progress, is_satisfied, milestone_crossed, CriteriaSource, CriteriaType,
    ProgressHistoryEntry, PROGRESS_COMPLETE,
};
use edquest_core::chains::{evaluation_order, find_cycles, group_chains, ChainLink};
use edquest_core::clock::Clock;
use edquest_core::types::{DbId, Timestamp};
use edquest_db::models::achievement::Achievement;
use edquest_db::models::achievement_progress::{UpsertProgress, UserAchievementProgress};
use edquest_db::models::gamification::UserGamificationState;
use serde::Serialize;

use crate::activity::CourseActivity;
use crate::config::EngineConfig;
use crate::error::{EngineWarning, GamificationError};
use crate::store::ProgressStore;

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Result of one evaluation pass.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub user_id: DbId,
    /// Achievements that became completed in this pass, in evaluation order.
    pub unlocked: Vec<Achievement>,
    pub warnings: Vec<EngineWarning>,
    /// Achievements that could not be evaluated and should be retried.
    pub failed: usize,
}

impl EvaluationReport {
    pub fn new(user_id: DbId) -> Self {
        Self {
            user_id,
            unlocked: Vec::new(),
            warnings: Vec::new(),
            failed: 0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }

    fn warn(&mut self, warning: EngineWarning) {
        tracing::warn!(user_id = self.user_id, %warning, "Achievement evaluation warning");
        self.warnings.push(warning);
    }

    pub(crate) fn fail(&mut self, warning: EngineWarning) {
        self.failed += 1;
        self.warn(warning);
    }
}

/// One achievement in a chain, with the user's standing on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainLinkView {
    pub achievement_id: DbId,
    pub name: String,
    pub rarity: String,
    pub threshold: i64,
    pub xp_reward: i64,
    pub progress: i16,
    pub is_completed: bool,
    pub earned_at: Option<Timestamp>,
}

/// A chain root followed by its successors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AchievementChain {
    pub root_id: DbId,
    pub links: Vec<ChainLinkView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChainsReport {
    pub user_id: DbId,
    pub chains: Vec<AchievementChain>,
    pub warnings: Vec<EngineWarning>,
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

pub struct AchievementEvaluator {
    store: Arc<dyn ProgressStore>,
    activity: Arc<dyn CourseActivity>,
    clock: Arc<dyn Clock>,
    config: Arc<EngineConfig>,
}

impl AchievementEvaluator {
    pub fn new(
        store: Arc<dyn ProgressStore>,
        activity: Arc<dyn CourseActivity>,
        clock: Arc<dyn Clock>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            store,
            activity,
            clock,
            config,
        }
    }

    /// Evaluate every active, incomplete, in-season achievement for a user.
    ///
    /// Fails only when the user's state, catalog or progress cannot be
    /// loaded; per-achievement problems are reported in the result.
    pub async fn evaluate(&self, user_id: DbId) -> Result<EvaluationReport, GamificationError> {
        let mut report = EvaluationReport::new(user_id);
        self.evaluate_into(user_id, &mut report).await?;
        Ok(report)
    }

    /// Like [`evaluate`](Self::evaluate), recording into `report` as it goes.
    ///
    /// An unlock is pushed as soon as its completion is written, so a
    /// caller that abandons the pass part way still sees what was unlocked.
    pub async fn evaluate_into(
        &self,
        user_id: DbId,
        report: &mut EvaluationReport,
    ) -> Result<(), GamificationError> {
        let state = self.load_state(user_id).await?;
        let catalog = self.store.list_active_achievements().await?;
        let mut progress = self.progress_by_achievement(user_id).await?;

        let links: Vec<ChainLink> = catalog.iter().map(Achievement::chain_link).collect();
        let cyclic = find_cycles(&links);
        let by_id: HashMap<DbId, &Achievement> = catalog.iter().map(|a| (a.id, a)).collect();
        let now = self.clock.now();

        for id in evaluation_order(&links) {
            let Some(&achievement) = by_id.get(&id) else {
                continue;
            };
            let previous = match progress.get(&id) {
                Some(record) if record.is_completed => continue,
                Some(record) => record.progress,
                None => 0,
            };
            if !achievement.is_in_season(now) {
                continue;
            }

            if cyclic.contains(&id) {
                report.warn(EngineWarning::Configuration {
                    achievement_id: id,
                    message: "chained_from forms a cycle; link ignored".to_string(),
                });
            } else if self.config.gate_chained_achievements
                && !predecessor_completed(achievement, &by_id, &progress)
            {
                continue;
            }

            let criteria = match CriteriaType::from_str_value(&achievement.criteria_type) {
                Ok(criteria) => criteria,
                Err(message) => {
                    report.warn(EngineWarning::Configuration {
                        achievement_id: id,
                        message,
                    });
                    continue;
                }
            };

            let value = if achievement.threshold <= 0 {
                report.warn(EngineWarning::Configuration {
                    achievement_id: id,
                    message: format!(
                        "threshold {} is not positive; treated as satisfied",
                        achievement.threshold
                    ),
                });
                0
            } else {
                match self.criteria_value(&state, achievement, criteria).await {
                    Ok(value) => value,
                    Err(warning) => {
                        report.fail(warning);
                        continue;
                    }
                }
            };

            let Some(observation) = observe(user_id, achievement, value, previous, now) else {
                continue;
            };

            match self.store.save_progress(&observation).await {
                Ok(Some(record)) => {
                    if record.is_completed {
                        tracing::info!(
                            user_id,
                            achievement_id = id,
                            name = %achievement.name,
                            "Achievement unlocked"
                        );
                        report.unlocked.push(achievement.clone());
                    }
                    progress.insert(id, record);
                }
                // Another writer already recorded this much or more.
                Ok(None) => {}
                Err(e) => report.fail(EngineWarning::EvaluationFailed {
                    message: format!("saving progress for achievement {id}: {e}"),
                }),
            }
        }

        Ok(())
    }

    /// Display chains for a user: each root and its successors, with the
    /// user's progress on every link.
    pub async fn chains(&self, user_id: DbId) -> Result<ChainsReport, GamificationError> {
        self.load_state(user_id).await?;
        let catalog = self.store.list_active_achievements().await?;
        let progress = self.progress_by_achievement(user_id).await?;

        let links: Vec<ChainLink> = catalog.iter().map(Achievement::chain_link).collect();
        let by_id: HashMap<DbId, &Achievement> = catalog.iter().map(|a| (a.id, a)).collect();

        let mut warnings = Vec::new();
        let cyclic: BTreeSet<DbId> = find_cycles(&links);
        for id in cyclic {
            let warning = EngineWarning::Configuration {
                achievement_id: id,
                message: "chained_from forms a cycle; excluded from chains".to_string(),
            };
            tracing::warn!(user_id, %warning, "Achievement chain warning");
            warnings.push(warning);
        }

        let chains = group_chains(&links)
            .into_iter()
            .map(|ids| AchievementChain {
                root_id: ids[0],
                links: ids
                    .iter()
                    .filter_map(|id| by_id.get(id))
                    .map(|a| link_view(a, progress.get(&a.id)))
                    .collect(),
            })
            .collect();

        Ok(ChainsReport {
            user_id,
            chains,
            warnings,
        })
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

    async fn progress_by_achievement(
        &self,
        user_id: DbId,
    ) -> Result<HashMap<DbId, UserAchievementProgress>, GamificationError> {
        Ok(self
            .store
            .list_progress(user_id)
            .await?
            .into_iter()
            .map(|p| (p.achievement_id, p))
            .collect())
    }

    /// The number the achievement's threshold is compared against.
    async fn criteria_value(
        &self,
        state: &UserGamificationState,
        achievement: &Achievement,
        criteria: CriteriaType,
    ) -> Result<i64, EngineWarning> {
        match criteria.source() {
            CriteriaSource::UserState => Ok(user_state_value(state, criteria)),
            CriteriaSource::CourseActivity => {
                let lookup = self.activity.get_count(
                    state.user_id,
                    criteria,
                    achievement.domain_filter.as_deref(),
                );
                match tokio::time::timeout(self.config.evaluation_timeout, lookup).await {
                    Ok(Ok(count)) => Ok(count),
                    Ok(Err(e)) => Err(EngineWarning::EvaluationFailed {
                        message: format!(
                            "{} count for achievement {}: {e}",
                            criteria.as_str(),
                            achievement.id
                        ),
                    }),
                    Err(_) => Err(EngineWarning::EvaluationTimedOut {
                        after_ms: self.config.evaluation_timeout.as_millis() as u64,
                    }),
                }
            }
        }
    }
}

fn user_state_value(state: &UserGamificationState, criteria: CriteriaType) -> i64 {
    match criteria {
        CriteriaType::DailyStreak => i64::from(state.streak_current),
        CriteriaType::LongestStreak => i64::from(state.streak_longest),
        CriteriaType::XpTotal => state.xp,
        CriteriaType::Level => i64::from(state.level),
        _ => 0,
    }
}

/// With gating on, whether the achievement's predecessor is completed.
///
/// Links to achievements outside the active catalog do not gate.
fn predecessor_completed(
    achievement: &Achievement,
    catalog: &HashMap<DbId, &Achievement>,
    progress: &HashMap<DbId, UserAchievementProgress>,
) -> bool {
    match achievement.chained_from {
        Some(p) if catalog.contains_key(&p) => progress.get(&p).is_some_and(|r| r.is_completed),
        _ => true,
    }
}

/// The progress write implied by `value`, or `None` when nothing would change.
///
/// No record is created for zero progress.
fn observe(
    user_id: DbId,
    achievement: &Achievement,
    value: i64,
    previous: i16,
    now: Timestamp,
) -> Option<UpsertProgress> {
    let (progress, is_completed) = if is_satisfied(value, achievement.threshold) {
        (PROGRESS_COMPLETE, true)
    } else {
        let pct = incomplete_progress(value, achievement.threshold);
        if pct <= previous {
            return None;
        }
        (pct, false)
    };

    Some(UpsertProgress {
        user_id,
        achievement_id: achievement.id,
        progress,
        is_completed,
        earned_at: is_completed.then_some(now),
        entry: ProgressHistoryEntry {
            date: now,
            progress,
            milestone: milestone_crossed(previous, progress),
        },
    })
}

fn link_view(achievement: &Achievement, record: Option<&UserAchievementProgress>) -> ChainLinkView {
    ChainLinkView {
        achievement_id: achievement.id,
        name: achievement.name.clone(),
        rarity: achievement.rarity.clone(),
        threshold: achievement.threshold,
        xp_reward: achievement.xp_reward,
        progress: record.map_or(0, |r| r.progress),
        is_completed: record.is_some_and(|r| r.is_completed),
        earned_at: record.and_then(|r| r.earned_at),
    }
}
