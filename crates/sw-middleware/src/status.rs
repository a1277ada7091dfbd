//! Cache status reported on served responses.

use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};
use http::header::{HeaderName, HeaderValue};

/// Header carrying the [`CacheStatus`] of a routed response.
pub const X_CACHE_STATUS: HeaderName = HeaderName::from_static("x-cache-status");

/// How a routed response was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Served from the cache.
    Hit,
    /// Fetched from the network.
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::Miss => "MISS",
        }
    }

    pub fn header_value(&self) -> HeaderValue {
        HeaderValue::from_static(self.as_str())
    }
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Completion side of a [`ServeOutcome`], held by the router.
///
/// Dropping it unsent resolves the outcome to `None`.
#[derive(Debug)]
pub struct ServeSignal(oneshot::Sender<CacheStatus>);

impl ServeSignal {
    /// Report that the routed response is now in the cache.
    pub fn send(self, status: CacheStatus) {
        // Nobody waiting is fine.
        let _ = self.0.send(status);
    }
}

/// Resolves once the router knows whether the routed URL is in its cache:
/// `Some(Hit)` when it was served from the cache, `Some(Miss)` once the
/// network response has been stored, `None` when the response was an error,
/// unsuccessful, or could not be stored.
#[derive(Clone)]
pub struct ServeOutcome(Shared<oneshot::Receiver<CacheStatus>>);

impl ServeOutcome {
    pub fn channel() -> (ServeSignal, ServeOutcome) {
        let (tx, rx) = oneshot::channel();
        (ServeSignal(tx), ServeOutcome(rx.shared()))
    }

    /// An outcome that is already known.
    pub fn ready(status: CacheStatus) -> Self {
        let (signal, outcome) = Self::channel();
        signal.send(status);
        outcome
    }

    pub async fn wait(self) -> Option<CacheStatus> {
        self.0.await.ok()
    }
}

impl std::fmt::Debug for ServeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ServeOutcome").field(&self.0.peek()).finish()
    }
}
