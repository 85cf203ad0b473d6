//! Domain logic for the edquest gamification engine.
//!
//! Everything in this crate is pure: no database access, no async runtime.
//! Callers load state, pass it in, and persist whatever comes back.

pub mod achievements;
pub mod activity;
pub mod chains;
pub mod clock;
pub mod daily_cap;
pub mod error;
pub mod leaderboard;
pub mod levels;
pub mod streaks;
pub mod types;
