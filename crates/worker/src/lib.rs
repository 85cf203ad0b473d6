//! Worker host for the gamification engine: environment configuration
//! and the background jobs the binary spawns.

pub mod background;
pub mod config;
