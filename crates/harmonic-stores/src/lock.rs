//! Per-session lock provider.
//!
//! One single-permit semaphore per session id, kept in a concurrent map.
//! The guard wraps an owned permit, so release happens on drop on every
//! exit path including cancellation.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use harmonic_core::store::{LockGuard, LockProvider, StoreError};

/// In-memory per-session mutual exclusion.
pub struct InMemoryLockProvider {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl InMemoryLockProvider {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryLockProvider {
    fn default() -> Self {
        Self::new()
    }
}

struct SemaphoreLockGuard {
    _permit: OwnedSemaphorePermit,
}

impl LockGuard for SemaphoreLockGuard {}

#[async_trait]
impl LockProvider for InMemoryLockProvider {
    async fn acquire(&self, session_id: &str) -> Result<Box<dyn LockGuard>, StoreError> {
        let semaphore = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|e| StoreError::Internal(e.to_string()))?;
            locks
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };
        let permit = semaphore
            .acquire_owned()
            .await
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(Box::new(SemaphoreLockGuard { _permit: permit }))
    }
}
