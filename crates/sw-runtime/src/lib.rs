//! Runtime for the module asset worker.
//!
//! `ModuleCacheWorker` ties the classifier, the cache storage and the fetch
//! pipeline to the lifecycle events a host delivers:
//! - `start` - Validate configuration, compile the classifier, build the pipeline
//! - `on_install` / `on_activate` - Skip waiting, drop orphaned caches, claim clients
//! - `dispatch_fetch` / `handle_fetch` - Answer intercepted requests
//! - `on_message` - Client commands
//! - `terminate` - Abort in-flight work
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sw_cache::InMemoryCacheStorage;
//! use sw_core::{Request, WorkerConfig};
//! use sw_runtime::{LoggingHost, ModuleCacheWorker};
//!
//! let worker = ModuleCacheWorker::start(
//!     WorkerConfig::new("1.4.2"),
//!     Arc::new(InMemoryCacheStorage::new()),
//!     fetcher,
//!     Arc::new(LoggingHost),
//! )
//! .await?;
//! worker.on_install().await?;
//! worker.on_activate().await?;
//!
//! let response = worker.handle_fetch(Request::get(url)?).await?;
//! ```

mod error;
mod host;
mod worker;

pub use error::*;
pub use host::*;
pub use worker::*;
