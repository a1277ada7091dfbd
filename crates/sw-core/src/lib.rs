//! Core abstractions for the module asset service worker cache.
//!
//! This crate provides the fundamental types and traits:
//! - `ResourceDescriptor` / `ResourceMetadataRecord` - What a cached URL is
//! - `Request` / `Response` - Intercepted request and cached response
//! - `FetchEvent` / `KeepAlive` - Per-event lifetime extension
//! - `Fetcher` - Network access supplied by the host
//! - `WorkerConfig` - Build version, cache names and expiration settings

mod config;
mod context;
mod error;
mod fetch;
mod lifecycle;
mod resource;

pub use config::*;
pub use context::*;
pub use error::*;
pub use fetch::*;
pub use lifecycle::*;
pub use resource::*;
