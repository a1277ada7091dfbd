//! Named-cache storage traits.
//!
//! Mirrors the browser Cache Storage API: a storage holds named caches, each
//! cache maps a request URL to exactly one stored response.

use std::sync::Arc;

use async_trait::async_trait;
use sw_core::Response;

use crate::error::CacheResult;

/// A single named cache.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Name the cache was opened under.
    fn name(&self) -> &str;

    /// Look up the response stored for `url`.
    async fn match_url(&self, url: &str) -> CacheResult<Option<Response>>;

    /// Store `response` under `url`, replacing any previous entry.
    async fn put(&self, url: &str, response: Response) -> CacheResult<()>;

    /// Delete the entry for `url`. Returns whether an entry existed.
    async fn delete(&self, url: &str) -> CacheResult<bool>;

    /// URLs of all stored entries.
    async fn keys(&self) -> CacheResult<Vec<String>>;
}

/// Collection of named caches.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open (creating if needed) the cache called `name`.
    async fn open(&self, name: &str) -> CacheResult<Arc<dyn Cache>>;

    /// Whether a cache called `name` exists.
    async fn has(&self, name: &str) -> CacheResult<bool>;

    /// Delete the cache called `name`. Returns whether it existed.
    async fn delete(&self, name: &str) -> CacheResult<bool>;

    /// Names of all caches.
    async fn keys(&self) -> CacheResult<Vec<String>>;
}
