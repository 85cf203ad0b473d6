//! In-process [`ProgressStore`].
//!
//! Mirrors the Postgres guarantees (versioned state writes, monotonic
//! progress upserts, deterministic ranking) so engine tests exercise the
//! same semantics without a database. Fault hooks let tests force
//! version conflicts and outages.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use edquest_core::achievements::RARITY_COMMON;
use edquest_core::leaderboard::{rank_standings, LeaderboardMetric, Standing};
use edquest_core::types::DbId;
use edquest_db::models::achievement::{Achievement, CreateAchievement};
use edquest_db::models::achievement_progress::{UpsertProgress, UserAchievementProgress};
use edquest_db::models::gamification::{CreateGamificationState, UserGamificationState};
use sqlx::types::Json;

use super::{LeaderboardSlice, ProgressStore, StoreError};

#[derive(Default)]
struct Tables {
    next_id: DbId,
    states: BTreeMap<DbId, UserGamificationState>,
    achievements: BTreeMap<DbId, Achievement>,
    progress: BTreeMap<(DbId, DbId), UserAchievementProgress>,
    /// `(user_id, reason)`, oldest first, one entry per user.
    queue: VecDeque<(DbId, String)>,
}

impl Tables {
    fn next_id(&mut self) -> DbId {
        self.next_id += 1;
        self.next_id
    }

    fn completed_count(&self, user_id: DbId) -> i64 {
        self.progress
            .range((user_id, DbId::MIN)..=(user_id, DbId::MAX))
            .filter(|(_, p)| p.is_completed)
            .count() as i64
    }
}

#[derive(Default)]
pub struct MemoryProgressStore {
    tables: Mutex<Tables>,
    /// Number of upcoming `save_user_state` calls to reject as stale.
    forced_conflicts: AtomicU32,
    unavailable: AtomicBool,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        Ok(self.tables.lock().unwrap_or_else(PoisonError::into_inner))
    }

    // -----------------------------------------------------------------------
    // Catalog administration
    // -----------------------------------------------------------------------

    /// Add an achievement definition. No validation is applied, so
    /// malformed definitions can be stored on purpose.
    pub fn add_achievement(&self, input: CreateAchievement) -> Achievement {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Utc::now();
        let achievement = Achievement {
            id: tables.next_id(),
            name: input.name,
            description: input.description,
            category: input.category,
            criteria_type: input.criteria_type,
            threshold: input.threshold,
            domain_filter: input.domain_filter,
            xp_reward: input.xp_reward.unwrap_or(0),
            rarity: input.rarity.unwrap_or_else(|| RARITY_COMMON.to_string()),
            is_active: input.is_active.unwrap_or(true),
            chained_from: input.chained_from,
            season_starts_at: input.season_starts_at,
            season_ends_at: input.season_ends_at,
            created_at: now,
            updated_at: now,
        };
        tables.achievements.insert(achievement.id, achievement.clone());
        achievement
    }

    /// Point an achievement at a new predecessor. Returns `false` if unknown.
    pub fn set_chained_from(&self, id: DbId, chained_from: Option<DbId>) -> bool {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        match tables.achievements.get_mut(&id) {
            Some(a) => {
                a.chained_from = chained_from;
                a.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Activate or deactivate an achievement. Returns `false` if unknown.
    pub fn set_achievement_active(&self, id: DbId, is_active: bool) -> bool {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        match tables.achievements.get_mut(&id) {
            Some(a) => {
                a.is_active = is_active;
                a.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Users currently queued for re-evaluation, oldest first.
    pub fn queued_users(&self) -> Vec<DbId> {
        let tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        tables.queue.iter().map(|(user_id, _)| *user_id).collect()
    }

    // -----------------------------------------------------------------------
    // Fault injection
    // -----------------------------------------------------------------------

    /// Reject the next `count` state writes with a version conflict.
    pub fn force_version_conflicts(&self, count: u32) {
        self.forced_conflicts.store(count, Ordering::SeqCst);
    }

    /// Make every store call fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn take_forced_conflict(&self) -> bool {
        self.forced_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn create_user_state(
        &self,
        input: &CreateGamificationState,
    ) -> Result<UserGamificationState, StoreError> {
        let mut tables = self.tables()?;
        if let Some(existing) = tables.states.get(&input.user_id) {
            return Ok(existing.clone());
        }
        let now = Utc::now();
        let state = UserGamificationState {
            id: tables.next_id(),
            user_id: input.user_id,
            xp: 0,
            level: 1,
            daily_xp_earned: 0,
            daily_xp_cap: input.daily_xp_cap,
            last_xp_reset: input.last_xp_reset,
            streak_current: 0,
            streak_longest: 0,
            streak_last_activity_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        tables.states.insert(input.user_id, state.clone());
        Ok(state)
    }

    async fn get_user_state(
        &self,
        user_id: DbId,
    ) -> Result<Option<UserGamificationState>, StoreError> {
        Ok(self.tables()?.states.get(&user_id).cloned())
    }

    async fn save_user_state(
        &self,
        state: &UserGamificationState,
    ) -> Result<UserGamificationState, StoreError> {
        let conflict = StoreError::VersionConflict {
            user_id: state.user_id,
            expected: state.version,
        };
        let mut tables = self.tables()?;
        if self.take_forced_conflict() {
            return Err(conflict);
        }
        let Some(stored) = tables.states.get_mut(&state.user_id) else {
            return Err(conflict);
        };
        if stored.version != state.version {
            return Err(conflict);
        }
        *stored = UserGamificationState {
            id: stored.id,
            created_at: stored.created_at,
            updated_at: Utc::now(),
            version: stored.version + 1,
            ..state.clone()
        };
        Ok(stored.clone())
    }

    async fn get_progress(
        &self,
        user_id: DbId,
        achievement_id: DbId,
    ) -> Result<Option<UserAchievementProgress>, StoreError> {
        Ok(self
            .tables()?
            .progress
            .get(&(user_id, achievement_id))
            .cloned())
    }

    async fn list_progress(
        &self,
        user_id: DbId,
    ) -> Result<Vec<UserAchievementProgress>, StoreError> {
        Ok(self
            .tables()?
            .progress
            .range((user_id, DbId::MIN)..=(user_id, DbId::MAX))
            .map(|(_, p)| p.clone())
            .collect())
    }

    async fn save_progress(
        &self,
        input: &UpsertProgress,
    ) -> Result<Option<UserAchievementProgress>, StoreError> {
        let mut tables = self.tables()?;
        let key = (input.user_id, input.achievement_id);
        let now = Utc::now();

        if let Some(existing) = tables.progress.get_mut(&key) {
            if existing.is_completed {
                return Ok(None);
            }
            if !input.is_completed && input.progress <= existing.progress {
                return Ok(None);
            }
            existing.progress = existing.progress.max(input.progress);
            existing.is_completed = input.is_completed;
            existing.earned_at = existing.earned_at.or(input.earned_at);
            existing.progress_history.0.push(input.entry.clone());
            existing.updated_at = now;
            return Ok(Some(existing.clone()));
        }

        let record = UserAchievementProgress {
            id: tables.next_id(),
            user_id: input.user_id,
            achievement_id: input.achievement_id,
            progress: input.progress,
            is_completed: input.is_completed,
            earned_at: input.earned_at,
            progress_history: Json(vec![input.entry.clone()]),
            created_at: now,
            updated_at: now,
        };
        tables.progress.insert(key, record.clone());
        Ok(Some(record))
    }

    async fn list_active_achievements(&self) -> Result<Vec<Achievement>, StoreError> {
        Ok(self
            .tables()?
            .achievements
            .values()
            .filter(|a| a.is_active)
            .cloned()
            .collect())
    }

    async fn count_completed_achievements(&self, user_id: DbId) -> Result<i64, StoreError> {
        Ok(self.tables()?.completed_count(user_id))
    }

    async fn leaderboard(
        &self,
        metric: LeaderboardMetric,
        offset: i64,
        limit: i64,
    ) -> Result<LeaderboardSlice, StoreError> {
        let tables = self.tables()?;
        let standings: Vec<Standing> = tables
            .states
            .values()
            .map(|s| Standing {
                user_id: s.user_id,
                xp: s.xp,
                level: s.level,
                achievement_count: tables.completed_count(s.user_id),
                streak_current: s.streak_current,
            })
            .collect();
        let total_count = standings.len() as i64;
        let entries = rank_standings(standings, metric)
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(0))
            .collect();
        Ok(LeaderboardSlice {
            entries,
            total_count,
        })
    }

    async fn flag_for_reevaluation(&self, user_id: DbId, reason: &str) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        match tables.queue.iter_mut().find(|(id, _)| *id == user_id) {
            Some(entry) => entry.1 = reason.to_string(),
            None => tables.queue.push_back((user_id, reason.to_string())),
        }
        Ok(())
    }

    async fn take_reevaluation_batch(&self, limit: i64) -> Result<Vec<DbId>, StoreError> {
        let mut tables = self.tables()?;
        let take = usize::try_from(limit).unwrap_or(0).min(tables.queue.len());
        Ok(tables.queue.drain(..take).map(|(user_id, _)| user_id).collect())
    }
}
