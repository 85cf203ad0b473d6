//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is shared via `Arc<EventBus>` between the engine, which
//! publishes, and any number of subscribers (persistence, notification
//! fan-out in the host application).

use chrono::{DateTime, Utc};
use edquest_core::types::DbId;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Event names
// ---------------------------------------------------------------------------

pub const EVENT_XP_AWARDED: &str = "gamification.xp_awarded";
pub const EVENT_LEVEL_UP: &str = "gamification.level_up";
pub const EVENT_STREAK_EXTENDED: &str = "gamification.streak_extended";
pub const EVENT_STREAK_RESET: &str = "gamification.streak_reset";
pub const EVENT_ACHIEVEMENT_UNLOCKED: &str = "gamification.achievement_unlocked";

/// Source entity kinds attached to gamification events.
pub const ENTITY_USER: &str = "user";
pub const ENTITY_ACHIEVEMENT: &str = "achievement";

// ---------------------------------------------------------------------------
// PlatformEvent
// ---------------------------------------------------------------------------

/// A domain event emitted by the gamification engine.
///
/// Build ad hoc events with [`PlatformEvent::new`] and the `with_*`
/// methods, or use the named constructors for the events the engine emits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformEvent {
    /// Dot-separated event name, e.g. `"gamification.level_up"`.
    pub event_type: String,

    /// Optional source entity kind (`"user"` or `"achievement"`).
    pub source_entity_type: Option<String>,

    pub source_entity_id: Option<DbId>,

    /// The user whose state changed.
    pub actor_user_id: Option<DbId>,

    /// Event-specific data.
    pub payload: serde_json::Value,

    /// Engine clock time at which the change was committed.
    pub timestamp: DateTime<Utc>,
}

impl PlatformEvent {
    /// Create an event with an empty payload and no source or actor.
    pub fn new(event_type: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            event_type: event_type.into(),
            source_entity_type: None,
            source_entity_id: None,
            actor_user_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp,
        }
    }

    pub fn with_source(mut self, entity_type: impl Into<String>, entity_id: DbId) -> Self {
        self.source_entity_type = Some(entity_type.into());
        self.source_entity_id = Some(entity_id);
        self
    }

    pub fn with_actor(mut self, user_id: DbId) -> Self {
        self.actor_user_id = Some(user_id);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// XP was granted to a user.
    pub fn xp_awarded(
        user_id: DbId,
        activity_type: &str,
        granted: i64,
        xp: i64,
        at: DateTime<Utc>,
    ) -> Self {
        Self::new(EVENT_XP_AWARDED, at)
            .with_source(ENTITY_USER, user_id)
            .with_actor(user_id)
            .with_payload(json!({
                "activity_type": activity_type,
                "granted": granted,
                "xp": xp,
            }))
    }

    /// A user crossed into a higher level.
    pub fn level_up(user_id: DbId, previous_level: i32, level: i32, at: DateTime<Utc>) -> Self {
        Self::new(EVENT_LEVEL_UP, at)
            .with_source(ENTITY_USER, user_id)
            .with_actor(user_id)
            .with_payload(json!({
                "previous_level": previous_level,
                "level": level,
            }))
    }

    /// A user's streak started or grew by a day.
    pub fn streak_extended(user_id: DbId, current: i32, longest: i32, at: DateTime<Utc>) -> Self {
        Self::new(EVENT_STREAK_EXTENDED, at)
            .with_source(ENTITY_USER, user_id)
            .with_actor(user_id)
            .with_payload(json!({
                "current": current,
                "longest": longest,
            }))
    }

    /// A user's streak restarted at 1 after a gap of two or more days.
    pub fn streak_reset(
        user_id: DbId,
        previous: i32,
        current: i32,
        longest: i32,
        at: DateTime<Utc>,
    ) -> Self {
        Self::new(EVENT_STREAK_RESET, at)
            .with_source(ENTITY_USER, user_id)
            .with_actor(user_id)
            .with_payload(json!({
                "previous": previous,
                "current": current,
                "longest": longest,
            }))
    }

    /// A user completed an achievement.
    pub fn achievement_unlocked(
        user_id: DbId,
        achievement_id: DbId,
        name: &str,
        rarity: &str,
        xp_reward: i64,
        at: DateTime<Utc>,
    ) -> Self {
        Self::new(EVENT_ACHIEVEMENT_UNLOCKED, at)
            .with_source(ENTITY_ACHIEVEMENT, achievement_id)
            .with_actor(user_id)
            .with_payload(json!({
                "name": name,
                "rarity": rarity,
                "xp_reward": xp_reward,
            }))
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// When the buffer is full the oldest unconsumed events are dropped and
/// slow receivers observe `RecvError::Lagged`.
pub struct EventBus {
    sender: broadcast::Sender<PlatformEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// Returns how many subscribers received it; zero is not an error.
    pub fn publish(&self, event: PlatformEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
