//! XP accrual: daily cap, level recompute and streak advance.
//!
//! Every state change is a read-modify-write against the store's versioned
//! row. A stale write is retried from a fresh read, up to
//! [`EngineConfig::max_update_attempts`] times.

use std::sync::Arc;

use edquest_core::clock::Clock;
use edquest_core::daily_cap::{available, grantable, is_new_day};
use edquest_core::levels::level_for;
use edquest_core::streaks::StreakChange;
use edquest_core::types::{DbId, Timestamp};
use edquest_db::models::gamification::UserGamificationState;

use crate::config::EngineConfig;
use crate::error::GamificationError;
use crate::store::{ProgressStore, StoreError};

/// Outcome of one committed (or no-op) XP application.
#[derive(Debug, Clone)]
pub struct AppliedXp {
    /// State after the write, or the unchanged state when nothing was written.
    pub state: UserGamificationState,
    pub requested: i64,
    pub granted: i64,
    pub previous_level: i32,
    /// `None` when the activity does not count toward the streak or no XP was granted.
    pub streak_change: Option<StreakChange>,
    /// The daily window rolled over during this call.
    pub daily_reset: bool,
    /// Nothing is left of today's allowance.
    pub daily_cap_reached: bool,
}

impl AppliedXp {
    pub fn level_up(&self) -> bool {
        self.state.level > self.previous_level
    }
}

pub struct XpAwarder {
    store: Arc<dyn ProgressStore>,
    clock: Arc<dyn Clock>,
    config: Arc<EngineConfig>,
}

impl XpAwarder {
    pub fn new(
        store: Arc<dyn ProgressStore>,
        clock: Arc<dyn Clock>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Grant up to `requested` XP for `activity_type`, bounded by the daily cap.
    ///
    /// A daily-window rollover is persisted even when nothing is granted.
    pub async fn apply(
        &self,
        user_id: DbId,
        activity_type: &str,
        requested: i64,
    ) -> Result<AppliedXp, GamificationError> {
        if requested < 0 {
            return Err(GamificationError::Validation(format!(
                "XP amount must not be negative, got {requested}"
            )));
        }

        let (state, plan) = self
            .update_state(user_id, |current, now| {
                let plan = plan_award(current, activity_type, requested, now, &self.config);
                let next = plan.writes().then(|| plan.next.clone());
                (next, plan)
            })
            .await?;

        tracing::debug!(
            user_id,
            activity_type,
            requested,
            granted = plan.granted,
            xp = state.xp,
            level = state.level,
            "XP applied"
        );

        Ok(AppliedXp {
            previous_level: plan.previous_level,
            requested,
            granted: plan.granted,
            streak_change: plan.streak_change,
            daily_reset: plan.daily_reset,
            daily_cap_reached: plan.daily_cap_reached,
            state,
        })
    }

    /// Override a user's daily cap.
    ///
    /// Lowering the cap below what was already earned today clamps the
    /// earned amount, so no further XP is granted today.
    pub async fn set_daily_cap(
        &self,
        user_id: DbId,
        cap: i64,
    ) -> Result<UserGamificationState, GamificationError> {
        if cap < 0 {
            return Err(GamificationError::Validation(format!(
                "Daily XP cap must not be negative, got {cap}"
            )));
        }

        let (state, ()) = self
            .update_state(user_id, |current, _now| {
                if current.daily_xp_cap == cap && current.daily_xp_earned <= cap {
                    return (None, ());
                }
                let mut next = current.clone();
                next.daily_xp_cap = cap;
                next.daily_xp_earned = next.daily_xp_earned.min(cap);
                (Some(next), ())
            })
            .await?;

        tracing::info!(user_id, cap, "Daily XP cap updated");
        Ok(state)
    }

    /// Versioned read-modify-write of a user's state.
    ///
    /// `mutate` sees the freshly loaded state and the clock's `now`, and
    /// returns the state to write (or `None` to write nothing) plus a value
    /// handed back to the caller from the attempt that committed.
    async fn update_state<T, F>(
        &self,
        user_id: DbId,
        mut mutate: F,
    ) -> Result<(UserGamificationState, T), GamificationError>
    where
        F: FnMut(&UserGamificationState, Timestamp) -> (Option<UserGamificationState>, T),
    {
        let attempts = self.config.max_update_attempts();
        for attempt in 1..=attempts {
            let current = self.store.get_user_state(user_id).await?.ok_or(
                GamificationError::NotFound {
                    entity: "user_gamification",
                    id: user_id,
                },
            )?;

            let (next, out) = mutate(&current, self.clock.now());
            let Some(next) = next else {
                return Ok((current, out));
            };

            match self.store.save_user_state(&next).await {
                Ok(saved) => return Ok((saved, out)),
                Err(StoreError::VersionConflict { expected, .. }) => {
                    tracing::debug!(user_id, attempt, expected, "Stale user state, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::warn!(user_id, attempts, "User state update did not settle");
        Err(GamificationError::ConcurrentUpdate { user_id, attempts })
    }
}

// ---------------------------------------------------------------------------
// Award planning
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct AwardPlan {
    next: UserGamificationState,
    previous_level: i32,
    granted: i64,
    streak_change: Option<StreakChange>,
    daily_reset: bool,
    daily_cap_reached: bool,
}

impl AwardPlan {
    /// Whether the plan changes anything that must be persisted.
    fn writes(&self) -> bool {
        self.granted > 0 || self.daily_reset
    }
}

/// Compute the state after awarding `requested` XP at `now`.
fn plan_award(
    state: &UserGamificationState,
    activity_type: &str,
    requested: i64,
    now: Timestamp,
    config: &EngineConfig,
) -> AwardPlan {
    let offset = config.reference_offset();
    let mut next = state.clone();

    let daily_reset = is_new_day(state.last_xp_reset, now, offset);
    if daily_reset {
        next.daily_xp_earned = 0;
        next.last_xp_reset = now;
    }

    let granted = grantable(requested, next.daily_xp_cap, next.daily_xp_earned);
    let mut streak_change = None;
    if granted > 0 {
        next.xp = next.xp.saturating_add(granted);
        next.daily_xp_earned += granted;
        next.level = level_for(next.xp);

        if edquest_core::activity::is_streak_qualifying(
            activity_type,
            &config.streak_activity_types,
        ) {
            let (streak, change) = next.streak().advance(now, offset);
            next.set_streak(streak);
            streak_change = Some(change);
        }
    }

    let daily_cap_reached = available(next.daily_xp_cap, next.daily_xp_earned) == 0;
    AwardPlan {
        next,
        previous_level: state.level,
        granted,
        streak_change,
        daily_reset,
        daily_cap_reached,
    }
}
