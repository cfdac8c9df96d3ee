//! Keyed item locks with cancellable acquisition.

use crate::error::{QueueError, QueueResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::debug;

type Registry = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// Registry of exclusive per-item locks.
///
/// Push and pull both take the lock of an item before touching it, so the
/// two never interleave on the same item. Entries are created on first use
/// and dropped again once nobody holds or waits for them.
#[derive(Debug, Default, Clone)]
pub struct ItemLocks {
    registry: Registry,
}

impl ItemLocks {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock for `key`, giving up when `token` fires.
    pub async fn lock(&self, key: &str, token: &CancellationToken) -> QueueResult<ItemLockGuard> {
        if token.is_cancelled() {
            return Err(QueueError::LockCancelled(key.to_string()));
        }

        let mutex = {
            let mut registry = self.registry.lock();
            Arc::clone(registry.entry(key.to_string()).or_default())
        };

        let guard = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            guard = mutex.lock_owned() => Some(guard),
        };

        match guard {
            Some(guard) => Ok(ItemLockGuard {
                key: key.to_string(),
                guard: Some(guard),
                registry: Arc::clone(&self.registry),
            }),
            None => {
                debug!(key, "item lock acquisition cancelled");
                prune(&self.registry, key);
                Err(QueueError::LockCancelled(key.to_string()))
            }
        }
    }

    /// Returns true if someone currently holds the lock for `key`.
    pub fn is_locked(&self, key: &str) -> bool {
        self.registry
            .lock()
            .get(key)
            .is_some_and(|mutex| mutex.try_lock().is_err())
    }

    /// Number of keys with a holder or a waiter.
    pub fn len(&self) -> usize {
        self.registry.lock().len()
    }

    /// Returns true if no key is held or awaited.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Holds an item lock; releases it when dropped.
#[derive(Debug)]
pub struct ItemLockGuard {
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
    registry: Registry,
}

impl ItemLockGuard {
    /// Key this guard locks.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for ItemLockGuard {
    fn drop(&mut self) {
        self.guard.take();
        prune(&self.registry, &self.key);
    }
}

/// Drops the registry entry for `key` if only the registry still refers to it.
fn prune(registry: &Registry, key: &str) {
    let mut registry = registry.lock();
    if registry
        .get(key)
        .is_some_and(|mutex| Arc::strong_count(mutex) == 1)
    {
        registry.remove(key);
    }
}
