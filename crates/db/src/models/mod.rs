//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - A `Deserialize` create DTO for inserts, where the table takes inserts
//! - A `Deserialize` update DTO (all `Option` fields) for patches, where needed

pub mod achievement;
pub mod achievement_progress;
pub mod activity_counter;
pub mod event;
pub mod gamification;
pub mod leaderboard;
pub mod reevaluation;
