//! Cache Storage abstraction and metadata store for the module asset worker.
//!
//! This crate provides:
//! - `CacheStorage` / `Cache` - The named-cache API the worker stores responses in
//! - `InMemoryCacheStorage` - A complete in-process backend with an operation journal
//! - `MetadataKey` - Logical `/{type}/{id}` keys
//! - `MetadataStore` - Per-resource metadata records kept in a reserved cache
//! - `KeyLocks` - Per-key serialization of read-modify-write cycles
//! - `ExpirationPolicy` / `ExpirationLedger` - Age and size based eviction
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sw_cache::{InMemoryCacheStorage, MetadataKey, MetadataStore};
//!
//! let storage = Arc::new(InMemoryCacheStorage::new());
//! let store = MetadataStore::new(storage, "__sw/__meta");
//!
//! let key = MetadataKey::for_descriptor(&descriptor);
//! let previous = store.get_metadata(&key).await;
//! store.set_metadata(&key, &descriptor.to_record(url)).await?;
//! ```

mod error;
mod key;
mod lock;
mod memory;
mod metadata;
mod policy;
mod storage;

pub use error::*;
pub use key::*;
pub use lock::*;
pub use memory::*;
pub use metadata::*;
pub use policy::*;
pub use storage::*;
