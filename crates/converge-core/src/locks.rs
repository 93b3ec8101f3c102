//! Mutual exclusion keyed by resource identifier.
//!
//! Some remote APIs reject concurrent mutations on the same parent object. The
//! caller creates one [`ResourceLocks`], hands clones to the initiators that
//! need serializing, and holds the guard for the duration of the mutation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Guard returned by [`ResourceLocks::lock`]; the lock is released on drop.
pub type ResourceGuard = OwnedMutexGuard<()>;

/// Registry of async locks, one per resource identifier.
#[derive(Debug, Clone, Default)]
pub struct ResourceLocks {
    inner: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl ResourceLocks {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: &str) -> ResourceGuard {
        self.entry(key).lock_owned().await
    }

    /// Take exclusive access to `key` if nobody holds it.
    #[must_use]
    pub fn try_lock(&self, key: &str) -> Option<ResourceGuard> {
        self.entry(key).try_lock_owned().ok()
    }

    /// Number of identifiers that have been locked at least once.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if no identifier has been locked yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.entry(key.to_string()).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let locks = ResourceLocks::new();
        let guard = locks.lock("cluster-1").await;

        assert!(locks.try_lock("cluster-1").is_none());
        assert!(locks.try_lock("cluster-2").is_some());

        drop(guard);
        assert!(locks.try_lock("cluster-1").is_some());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn waiter_proceeds_after_release() {
        let locks = ResourceLocks::new();
        let guard = locks.lock("cluster-1").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock("cluster-1").await;
                tokio::time::Instant::now()
            })
        };

        tokio::time::sleep(Duration::from_secs(3)).await;
        let released_at = tokio::time::Instant::now();
        drop(guard);

        let acquired_at = waiter.await.unwrap();
        assert!(acquired_at >= released_at);
    }

    #[test]
    fn clones_share_state() {
        let locks = ResourceLocks::new();
        assert!(locks.is_empty());
        let other = locks.clone();
        let _guard = other.try_lock("vpc-1").unwrap();
        assert!(locks.try_lock("vpc-1").is_none());
    }
}
