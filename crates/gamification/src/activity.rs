//! Course-platform activity counts.
//!
//! The engine does not compute course, review, video or assessment counts
//! itself. It asks a [`CourseActivity`] collaborator, which the course
//! platform keeps up to date.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use edquest_core::achievements::CriteriaType;
use edquest_core::types::DbId;
use edquest_db::repositories::ActivityCounterRepo;
use edquest_db::DbPool;

use crate::store::StoreError;

#[async_trait]
pub trait CourseActivity: Send + Sync {
    /// Raw count for `criteria` (e.g. completed courses).
    ///
    /// With a `domain_filter`, only activity in that domain counts;
    /// without one, activity in every domain counts.
    async fn get_count(
        &self,
        user_id: DbId,
        criteria: CriteriaType,
        domain_filter: Option<&str>,
    ) -> Result<i64, StoreError>;
}

// ---------------------------------------------------------------------------
// Postgres
// ---------------------------------------------------------------------------

/// Reads the `activity_counters` table.
#[derive(Clone)]
pub struct PgCourseActivity {
    pool: DbPool,
}

impl PgCourseActivity {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CourseActivity for PgCourseActivity {
    async fn get_count(
        &self,
        user_id: DbId,
        criteria: CriteriaType,
        domain_filter: Option<&str>,
    ) -> Result<i64, StoreError> {
        Ok(
            ActivityCounterRepo::get_count(&self.pool, user_id, criteria.as_str(), domain_filter)
                .await?,
        )
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

type CountKey = (DbId, CriteriaType, String);

/// Counts set directly by the caller. Missing counts read as 0.
#[derive(Default)]
pub struct StaticCourseActivity {
    counts: Mutex<HashMap<CountKey, i64>>,
    delay: Mutex<Option<Duration>>,
    unavailable: AtomicBool,
}

impl StaticCourseActivity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the count for a user, criteria and optional domain.
    pub fn set_count(&self, user_id: DbId, criteria: CriteriaType, domain: Option<&str>, count: i64) {
        let key = (user_id, criteria, domain.unwrap_or_default().to_string());
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, count);
    }

    /// Delay every lookup, to simulate a slow platform.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    /// Fail every lookup with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl CourseActivity for StaticCourseActivity {
    async fn get_count(
        &self,
        user_id: DbId,
        criteria: CriteriaType,
        domain_filter: Option<&str>,
    ) -> Result<i64, StoreError> {
        let delay = *self.delay.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("course platform unreachable".into()));
        }

        let counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        let total = counts
            .iter()
            .filter(|((user, kind, domain), _)| {
                *user == user_id
                    && *kind == criteria
                    && domain_filter.map_or(true, |filter| domain == filter)
            })
            .map(|(_, count)| *count)
            .sum();
        Ok(total)
    }
}
