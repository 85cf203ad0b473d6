#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use edquest_core::clock::ManualClock;
use edquest_core::types::{DbId, Timestamp};
use edquest_db::models::achievement::CreateAchievement;
use edquest_events::EventBus;
use edquest_gamification::activity::StaticCourseActivity;
use edquest_gamification::store::MemoryProgressStore;
use edquest_gamification::{EngineConfig, GamificationEngine};

/// Monday 2026-03-02 09:00 UTC.
pub fn start() -> Timestamp {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

/// An engine over in-memory collaborators, with handles to each.
pub struct Harness {
    pub engine: Arc<GamificationEngine>,
    pub store: Arc<MemoryProgressStore>,
    pub activity: Arc<StaticCourseActivity>,
    pub clock: Arc<ManualClock>,
    pub bus: Arc<EventBus>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let store = Arc::new(MemoryProgressStore::new());
        let activity = Arc::new(StaticCourseActivity::new());
        let clock = Arc::new(ManualClock::new(start()));
        let bus = Arc::new(EventBus::default());
        let engine = GamificationEngine::new(
            store.clone(),
            activity.clone(),
            clock.clone(),
            config,
        )
        .with_event_bus(Arc::clone(&bus));

        Self {
            engine: Arc::new(engine),
            store,
            activity,
            clock,
            bus,
        }
    }

    pub fn advance_days(&self, days: i64) {
        self.clock.advance(Duration::days(days));
    }

    pub fn advance_hours(&self, hours: i64) {
        self.clock.advance(Duration::hours(hours));
    }

    pub async fn enroll(&self, user_id: DbId, cap: i64) {
        self.engine
            .enroll(user_id, Some(cap))
            .await
            .expect("enroll should succeed");
    }
}

/// An active achievement definition with no chain or season.
pub fn achievement(name: &str, criteria_type: &str, threshold: i64, xp_reward: i64) -> CreateAchievement {
    CreateAchievement {
        name: name.to_string(),
        description: None,
        category: "special".to_string(),
        criteria_type: criteria_type.to_string(),
        threshold,
        domain_filter: None,
        xp_reward: Some(xp_reward),
        rarity: None,
        is_active: None,
        chained_from: None,
        season_starts_at: None,
        season_ends_at: None,
    }
}
