//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument.

pub mod achievement_progress_repo;
pub mod achievement_repo;
pub mod activity_counter_repo;
pub mod event_repo;
pub mod gamification_repo;
pub mod leaderboard_repo;
pub mod reevaluation_repo;

pub use achievement_progress_repo::AchievementProgressRepo;
pub use achievement_repo::AchievementRepo;
pub use activity_counter_repo::ActivityCounterRepo;
pub use event_repo::EventRepo;
pub use gamification_repo::GamificationRepo;
pub use leaderboard_repo::LeaderboardRepo;
pub use reevaluation_repo::ReevaluationRepo;
