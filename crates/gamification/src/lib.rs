//! The gamification engine.
//!
//! Turns user activity into XP, levels, daily-capped accrual, streaks and
//! achievement unlocks, and ranks users on leaderboards.
//!
//! - [`GamificationEngine`]: the facade callers use (`award`, `evaluate`,
//!   `rank` and the account-level helpers).
//! - [`XpAwarder`], [`AchievementEvaluator`], [`LeaderboardRanker`]: the
//!   components the facade composes.
//! - [`store::ProgressStore`] and [`activity::CourseActivity`]: the seams
//!   to persistence and to the course platform, each with a Postgres and
//!   an in-memory implementation.

pub mod activity;
pub mod awarder;
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod locks;
pub mod ranker;
pub mod store;

pub use awarder::{AppliedXp, XpAwarder};
pub use config::EngineConfig;
pub use engine::{
    AwardResult, EvaluationResult, GamificationEngine, GamificationSummary, ReconcileStats,
};
pub use error::{EngineWarning, EvaluationStatus, GamificationError};
pub use evaluator::{
    AchievementChain, AchievementEvaluator, ChainLinkView, ChainsReport, EvaluationReport,
};
pub use ranker::{LeaderboardPage, LeaderboardRanker};
