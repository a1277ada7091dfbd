//! In-memory cache storage backend (for development/testing and the CLI
//! simulator).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use sw_core::Response;

use crate::error::{CacheError, CacheResult};
use crate::storage::{Cache, CacheStorage};

/// A mutating operation applied to an [`InMemoryCacheStorage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOp {
    /// An entry was stored.
    Put { cache: String, url: String },
    /// An entry deletion was requested.
    Delete {
        cache: String,
        url: String,
        existed: bool,
    },
    /// A whole cache was deleted.
    DeleteCache { cache: String },
}

impl CacheOp {
    /// Name of the cache the operation touched.
    pub fn cache(&self) -> &str {
        match self {
            Self::Put { cache, .. } | Self::Delete { cache, .. } | Self::DeleteCache { cache } => {
                cache
            }
        }
    }

    /// Whether the operation was an entry deletion.
    pub fn is_entry_delete(&self) -> bool {
        matches!(self, Self::Delete { .. })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct Shared {
    journal: Mutex<Vec<CacheOp>>,
    fail_deletes: AtomicBool,
}

impl Shared {
    fn record(&self, op: CacheOp) {
        lock(&self.journal).push(op);
    }
}

/// In-process [`CacheStorage`] that journals every mutation.
#[derive(Default)]
pub struct InMemoryCacheStorage {
    caches: Mutex<BTreeMap<String, Arc<InMemoryCache>>>,
    shared: Arc<Shared>,
}

impl InMemoryCacheStorage {
    /// Create an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all mutations applied so far, in order.
    pub fn journal(&self) -> Vec<CacheOp> {
        lock(&self.shared.journal).clone()
    }

    /// Forget recorded mutations.
    pub fn clear_journal(&self) {
        lock(&self.shared.journal).clear();
    }

    /// Entry deletions recorded against `cache`.
    pub fn entry_deletes(&self, cache: &str) -> Vec<CacheOp> {
        self.journal()
            .into_iter()
            .filter(|op| op.is_entry_delete() && op.cache() == cache)
            .collect()
    }

    /// URLs currently stored in `cache` (empty when it does not exist).
    pub fn urls(&self, cache: &str) -> Vec<String> {
        lock(&self.caches)
            .get(cache)
            .map(|c| lock(&c.entries).keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Make every entry deletion fail with a storage error.
    pub fn fail_deletes(&self, fail: bool) {
        self.shared.fail_deletes.store(fail, Ordering::Release);
    }
}

#[async_trait]
impl CacheStorage for InMemoryCacheStorage {
    async fn open(&self, name: &str) -> CacheResult<Arc<dyn Cache>> {
        let mut caches = lock(&self.caches);
        let cache: Arc<dyn Cache> = caches
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(InMemoryCache {
                    name: name.to_string(),
                    entries: Mutex::new(BTreeMap::new()),
                    shared: self.shared.clone(),
                })
            })
            .clone();
        Ok(cache)
    }

    async fn has(&self, name: &str) -> CacheResult<bool> {
        Ok(lock(&self.caches).contains_key(name))
    }

    async fn delete(&self, name: &str) -> CacheResult<bool> {
        let existed = lock(&self.caches).remove(name).is_some();
        if existed {
            self.shared.record(CacheOp::DeleteCache {
                cache: name.to_string(),
            });
        }
        Ok(existed)
    }

    async fn keys(&self) -> CacheResult<Vec<String>> {
        Ok(lock(&self.caches).keys().cloned().collect())
    }
}

/// A cache held by [`InMemoryCacheStorage`].
pub struct InMemoryCache {
    name: String,
    entries: Mutex<BTreeMap<String, Response>>,
    shared: Arc<Shared>,
}

#[async_trait]
impl Cache for InMemoryCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn match_url(&self, url: &str) -> CacheResult<Option<Response>> {
        Ok(lock(&self.entries).get(url).cloned())
    }

    async fn put(&self, url: &str, response: Response) -> CacheResult<()> {
        lock(&self.entries).insert(url.to_string(), response);
        self.shared.record(CacheOp::Put {
            cache: self.name.clone(),
            url: url.to_string(),
        });
        Ok(())
    }

    async fn delete(&self, url: &str) -> CacheResult<bool> {
        if self.shared.fail_deletes.load(Ordering::Acquire) {
            return Err(CacheError::Storage(format!(
                "delete of {} rejected by backend",
                url
            )));
        }

        let existed = lock(&self.entries).remove(url).is_some();
        self.shared.record(CacheOp::Delete {
            cache: self.name.clone(),
            url: url.to_string(),
            existed,
        });
        Ok(existed)
    }

    async fn keys(&self) -> CacheResult<Vec<String>> {
        Ok(lock(&self.entries).keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_match_delete() {
        let storage = InMemoryCacheStorage::new();
        let cache = storage.open("module-cache").await.unwrap();

        cache.put("https://a/x.js", Response::ok("x")).await.unwrap();
        let hit = cache.match_url("https://a/x.js").await.unwrap().unwrap();
        assert_eq!(hit.body(), b"x");

        assert!(cache.delete("https://a/x.js").await.unwrap());
        assert!(!cache.delete("https://a/x.js").await.unwrap());
        assert!(cache.match_url("https://a/x.js").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_replaces_existing_entry() {
        let storage = InMemoryCacheStorage::new();
        let cache = storage.open("c").await.unwrap();

        cache.put("u", Response::ok("one")).await.unwrap();
        cache.put("u", Response::ok("two")).await.unwrap();

        assert_eq!(cache.keys().await.unwrap(), vec!["u".to_string()]);
        assert_eq!(cache.match_url("u").await.unwrap().unwrap().body(), b"two");
    }

    #[tokio::test]
    async fn test_open_returns_same_cache() {
        let storage = InMemoryCacheStorage::new();
        storage.open("c").await.unwrap().put("u", Response::ok("v")).await.unwrap();

        let again = storage.open("c").await.unwrap();
        assert!(again.match_url("u").await.unwrap().is_some());
        assert_eq!(storage.urls("c"), vec!["u".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_cache() {
        let storage = InMemoryCacheStorage::new();
        storage.open("old").await.unwrap();

        assert!(storage.has("old").await.unwrap());
        assert!(storage.delete("old").await.unwrap());
        assert!(!storage.has("old").await.unwrap());
        assert!(!storage.delete("old").await.unwrap());
    }

    #[tokio::test]
    async fn test_journal_records_mutations_only() {
        let storage = InMemoryCacheStorage::new();
        let cache = storage.open("c").await.unwrap();

        cache.match_url("u").await.unwrap();
        assert!(storage.journal().is_empty());

        cache.put("u", Response::ok("v")).await.unwrap();
        cache.delete("u").await.unwrap();

        let journal = storage.journal();
        assert_eq!(journal.len(), 2);
        assert_eq!(storage.entry_deletes("c").len(), 1);

        storage.clear_journal();
        assert!(storage.journal().is_empty());
    }

    #[tokio::test]
    async fn test_fail_deletes() {
        let storage = InMemoryCacheStorage::new();
        let cache = storage.open("c").await.unwrap();
        cache.put("u", Response::ok("v")).await.unwrap();

        storage.fail_deletes(true);
        assert!(matches!(cache.delete("u").await, Err(CacheError::Storage(_))));
        assert_eq!(storage.urls("c"), vec!["u".to_string()]);
    }
}
