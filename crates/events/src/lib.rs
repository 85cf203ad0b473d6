//! Gamification event bus and durable event log.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`PlatformEvent`]: the event envelope, with constructors for every
//!   gamification event the engine emits.
//! - [`EventPersistence`]: background task that writes every event to the
//!   `events` table.

pub mod bus;
pub mod persistence;

pub use bus::{EventBus, PlatformEvent};
pub use persistence::EventPersistence;
