//! Per-event middleware state.

use http::Extensions;
use sw_core::{Request, ResourceDescriptor};

use crate::status::ServeOutcome;

/// State shared by the middleware of one pipeline run.
///
/// Created fresh for every intercepted event. The router fills `request`,
/// `cache_name` and `served` when it takes the event; later middleware read
/// them.
/// Anything else travels in `extensions`, keyed by type.
#[derive(Debug, Default)]
pub struct MiddlewareContext {
    /// Classification of the request URL, if it matched a rule.
    pub meta: Option<ResourceDescriptor>,
    /// The routed request.
    pub request: Option<Request>,
    /// Cache the routed request is served from and stored in.
    pub cache_name: Option<String>,
    /// Whether the routed response ended up in the cache.
    pub served: Option<ServeOutcome>,
    /// Arbitrary typed values.
    pub extensions: Extensions,
}

impl MiddlewareContext {
    pub fn new(meta: Option<ResourceDescriptor>) -> Self {
        Self {
            meta,
            ..Default::default()
        }
    }

    /// Whether a router took the event.
    pub fn is_routed(&self) -> bool {
        self.request.is_some() && self.cache_name.is_some()
    }
}
