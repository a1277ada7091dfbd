//! Metadata records kept in a reserved cache, with automatic JSON
//! serialization.

use std::sync::Arc;

use http::header::{HeaderValue, CONTENT_TYPE};
use serde::{de::DeserializeOwned, Serialize};
use sw_core::{ResourceMetadataRecord, Response};

use crate::error::CacheResult;
use crate::key::MetadataKey;
use crate::lock::{KeyGuard, KeyLocks};
use crate::storage::CacheStorage;

/// Reads and writes typed records stored as JSON responses in the metadata
/// cache, and removes physical entries from resource caches.
///
/// Cheap to clone; clones share the storage handle and the key locks.
#[derive(Clone)]
pub struct MetadataStore {
    storage: Arc<dyn CacheStorage>,
    cache_name: String,
    locks: Option<KeyLocks>,
}

impl MetadataStore {
    /// Create a store writing to the cache called `cache_name`.
    ///
    /// Updates are serialized per key; see [`MetadataStore::serialized`].
    pub fn new(storage: Arc<dyn CacheStorage>, cache_name: impl Into<String>) -> Self {
        Self {
            storage,
            cache_name: cache_name.into(),
            locks: Some(KeyLocks::new()),
        }
    }

    /// Enable or disable per-key serialization of updates. When disabled,
    /// concurrent updates of one key are last-writer-wins.
    pub fn serialized(mut self, enabled: bool) -> Self {
        self.locks = enabled.then(KeyLocks::new);
        self
    }

    /// Name of the metadata cache.
    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    /// Underlying cache storage.
    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.storage
    }

    pub fn is_serialized(&self) -> bool {
        self.locks.is_some()
    }

    /// Get a value from the metadata cache.
    ///
    /// Returns `None` if the key doesn't exist.
    pub async fn get<T: DeserializeOwned>(&self, key: &MetadataKey) -> CacheResult<Option<T>> {
        let cache = self.storage.open(&self.cache_name).await?;
        match cache.match_url(key.as_str()).await? {
            Some(response) => {
                let value: T = serde_json::from_slice(response.body())?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Set a value in the metadata cache, replacing any previous one.
    pub async fn set<T: Serialize>(&self, key: &MetadataKey, value: &T) -> CacheResult<()> {
        let body = serde_json::to_vec(value)?;
        let response = Response::ok(body)
            .with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let cache = self.storage.open(&self.cache_name).await?;
        cache.put(key.as_str(), response).await
    }

    /// Record currently stored for `key`.
    ///
    /// A missing key, a failed read and an undecodable body all yield `None`.
    pub async fn get_metadata(&self, key: &MetadataKey) -> Option<ResourceMetadataRecord> {
        match self.get::<ResourceMetadataRecord>(key).await {
            Ok(Some(record)) => Some(record),
            Ok(None) => {
                tracing::debug!(resource_key = %key, "no metadata record");
                None
            }
            Err(e) => {
                tracing::warn!(resource_key = %key, error = %e, "unreadable metadata record");
                None
            }
        }
    }

    /// Overwrite the record stored for `key`.
    pub async fn set_metadata(
        &self,
        key: &MetadataKey,
        record: &ResourceMetadataRecord,
    ) -> CacheResult<()> {
        self.set(key, record).await?;
        tracing::debug!(resource_key = %key, url = %record.url, "metadata record written");
        Ok(())
    }

    /// Delete the physical entry for `url` from the cache called
    /// `cache_name`. Returns whether an entry existed.
    pub async fn remove(&self, cache_name: &str, url: &str) -> CacheResult<bool> {
        let cache = self.storage.open(cache_name).await?;
        let existed = cache.delete(url).await?;
        tracing::debug!(cache_name, url, existed, "removed cache entry");
        Ok(existed)
    }

    /// Take the update lock for `key`, or `None` when updates are not
    /// serialized.
    pub async fn lock(&self, key: &MetadataKey) -> Option<KeyGuard> {
        match &self.locks {
            Some(locks) => Some(locks.lock(key).await),
            None => None,
        }
    }
}

impl std::fmt::Debug for MetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataStore")
            .field("cache_name", &self.cache_name)
            .field("serialized", &self.is_serialized())
            .finish()
    }
}
