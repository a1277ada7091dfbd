//! Per-key serialization of metadata read-modify-write cycles.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::key::MetadataKey;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Guard held for the duration of one update of a logical key.
pub type KeyGuard = OwnedMutexGuard<()>;

/// Table of async mutexes, one per logical key currently in use.
///
/// Entries no longer held by anyone are pruned on the next acquisition, so
/// the table only grows with the number of keys updated concurrently.
#[derive(Clone, Default)]
pub struct KeyLocks {
    table: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until `key` is free and take it.
    pub async fn lock(&self, key: &MetadataKey) -> KeyGuard {
        let mutex = {
            let mut table = lock(&self.table);
            table.retain(|_, m| Arc::strong_count(m) > 1);
            table
                .entry(key.as_str().to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        if mutex.try_lock().is_err() {
            tracing::debug!(key = %key, "waiting for metadata key lock");
        }
        mutex.lock_owned().await
    }

    /// Number of keys with a live mutex.
    pub fn len(&self) -> usize {
        lock(&self.table).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for KeyLocks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyLocks").field("keys", &self.len()).finish()
    }
}
