//! Fetch middleware for the module asset worker.
//!
//! This crate provides:
//! - `Pipeline` / `Middleware` - Ordered, synchronous middleware execution
//! - `MiddlewareContext` - Per-event state shared between middleware
//! - `CacheRouter` - Cache-first routing of classified requests
//! - `Invalidation` - Removal of superseded entries and metadata upkeep
//! - `Expiration` - Age and size based eviction

mod context;
mod expiration;
mod invalidation;
mod pipeline;
mod router;
mod status;

pub use context::*;
pub use expiration::*;
pub use invalidation::*;
pub use pipeline::*;
pub use router::*;
pub use status::*;
