//! Per-user serialization of state mutations.
//!
//! Awards for the same user run one at a time inside this process; awards
//! for different users never contend. Cross-process safety comes from the
//! versioned writes in the store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use edquest_core::types::DbId;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of per-user async mutexes.
///
/// Entries are held weakly, so a user's mutex lives only while someone
/// holds or waits on it.
#[derive(Default)]
pub struct UserLocks {
    locks: Mutex<HashMap<DbId, Weak<AsyncMutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `user_id`'s state.
    pub async fn lock(&self, user_id: DbId) -> OwnedMutexGuard<()> {
        let mutex = self.mutex_for(user_id);
        mutex.lock_owned().await
    }

    fn mutex_for(&self, user_id: DbId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = locks.get(&user_id).and_then(Weak::upgrade) {
            return existing;
        }
        locks.retain(|_, weak| weak.strong_count() > 0);
        let mutex = Arc::new(AsyncMutex::new(()));
        locks.insert(user_id, Arc::downgrade(&mutex));
        mutex
    }

    /// Number of users with a live lock.
    pub fn active(&self) -> usize {
        let locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.values().filter(|weak| weak.strong_count() > 0).count()
    }
}
