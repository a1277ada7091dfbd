//! Worker lifecycle and per-event lifetime extension.
//!
//! A service worker may be stopped as soon as it has answered an event. Work
//! that must outlive the answer (cache writes, metadata updates, evictions) is
//! registered on the event's [`KeepAlive`] scope, which the host settles
//! before letting the worker go.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::Waker;

use futures::future::{poll_fn, AbortHandle, Abortable, Aborted, BoxFuture};
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;

use crate::context::{EventId, Request, Response};
use crate::error::FetchError;

/// Lifecycle states of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Script evaluated, handlers registered.
    Parsed,
    /// Install event dispatched.
    Installing,
    /// Installed, waiting to activate.
    Installed,
    /// Activate event dispatched.
    Activating,
    /// Active and intercepting fetches.
    Activated,
    /// Replaced, unregistered or terminated.
    Redundant,
}

impl WorkerState {
    /// Check if this state allows fetch interception.
    pub fn can_intercept_fetch(&self) -> bool {
        matches!(self, Self::Activated)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parsed => write!(f, "parsed"),
            Self::Installing => write!(f, "installing"),
            Self::Installed => write!(f, "installed"),
            Self::Activating => write!(f, "activating"),
            Self::Activated => write!(f, "activated"),
            Self::Redundant => write!(f, "redundant"),
        }
    }
}

type KeepAliveTask = BoxFuture<'static, Result<(), Aborted>>;

#[derive(Default)]
struct KeepAliveInner {
    pending: Mutex<Vec<KeepAliveTask>>,
    handles: Mutex<Vec<AbortHandle>>,
    settling: Mutex<Option<Waker>>,
    cancelled: AtomicBool,
    outstanding: Arc<AtomicUsize>,
}

/// Decrements the outstanding counter when a task finishes or is dropped.
struct OutstandingGuard(Arc<AtomicUsize>);

impl Drop for OutstandingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Owner of the asynchronous side effects of one event.
///
/// Cloning shares the scope, so a future that is itself registered may
/// register follow-up work.
#[derive(Clone, Default)]
pub struct KeepAlive {
    inner: Arc<KeepAliveInner>,
}

impl KeepAlive {
    /// Create an empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register work that must finish before the event is considered done.
    ///
    /// Returns `false` (and drops the future unpolled) when the scope has
    /// already been cancelled.
    pub fn wait_until<F>(&self, future: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_cancelled() {
            tracing::warn!("keep-alive scope cancelled, dropping registered work");
            return false;
        }

        self.inner.outstanding.fetch_add(1, Ordering::AcqRel);
        let guard = OutstandingGuard(self.inner.outstanding.clone());
        let (handle, registration) = AbortHandle::new_pair();
        let task = Abortable::new(
            async move {
                let _guard = guard;
                future.await;
            },
            registration,
        )
        .boxed();

        lock(&self.inner.handles).push(handle);
        lock(&self.inner.pending).push(task);
        if let Some(waker) = lock(&self.inner.settling).take() {
            waker.wake();
        }
        true
    }

    /// Drive all registered work to completion, including work registered
    /// while settling. Returns the number of tasks that ran to completion.
    ///
    /// Work registered from outside the scope while it settles is picked up
    /// immediately, so a task may wait on work that has not been registered
    /// yet.
    pub async fn settle(&self) -> usize {
        let mut in_flight = FuturesUnordered::new();
        let mut completed = 0;

        loop {
            let next = poll_fn(|cx| {
                *lock(&self.inner.settling) = Some(cx.waker().clone());
                in_flight.extend(self.take_pending());
                in_flight.poll_next_unpin(cx)
            })
            .await;

            match next {
                Some(Ok(())) => completed += 1,
                Some(Err(Aborted)) => {}
                None => break,
            }
        }

        lock(&self.inner.settling).take();
        completed
    }

    /// Abort all outstanding work and refuse further registrations.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        for handle in lock(&self.inner.handles).drain(..) {
            handle.abort();
        }
        let dropped = std::mem::take(&mut *lock(&self.inner.pending));
        if !dropped.is_empty() {
            tracing::debug!(dropped = dropped.len(), "keep-alive scope cancelled with pending work");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Number of registered tasks that have not finished yet.
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::Acquire)
    }

    /// Whether every registered task has finished or been dropped.
    pub fn is_idle(&self) -> bool {
        self.outstanding() == 0
    }

    fn take_pending(&self) -> Vec<KeepAliveTask> {
        std::mem::take(&mut *lock(&self.inner.pending))
    }
}

impl fmt::Debug for KeepAlive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeepAlive")
            .field("outstanding", &self.outstanding())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Future resolving to the response for an intercepted request.
pub type ResponseFuture = BoxFuture<'static, Result<Response, FetchError>>;

/// An intercepted fetch, handed to every middleware of the pipeline.
pub struct FetchEvent {
    id: EventId,
    request: Request,
    keep_alive: KeepAlive,
    response: Mutex<Option<ResponseFuture>>,
}

impl FetchEvent {
    /// Create an event for `request` with a fresh keep-alive scope.
    pub fn new(request: Request) -> Self {
        Self::with_keep_alive(request, KeepAlive::new())
    }

    /// Create an event that registers work on an existing scope.
    pub fn with_keep_alive(request: Request, keep_alive: KeepAlive) -> Self {
        Self {
            id: EventId::next(),
            request,
            keep_alive,
            response: Mutex::new(None),
        }
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn keep_alive(&self) -> &KeepAlive {
        &self.keep_alive
    }

    /// Register work on the event's keep-alive scope.
    pub fn wait_until<F>(&self, future: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.keep_alive.wait_until(future)
    }

    /// Answer the event. Only the first call takes effect.
    pub fn respond_with(&self, response: ResponseFuture) -> bool {
        let mut slot = lock(&self.response);
        if slot.is_some() {
            tracing::warn!(event = %self.id, "respond_with called twice, ignoring");
            return false;
        }
        *slot = Some(response);
        true
    }

    /// Whether a middleware has answered the event.
    pub fn has_response(&self) -> bool {
        lock(&self.response).is_some()
    }

    /// Split the event into its request, keep-alive scope and registered
    /// response, if any.
    pub fn into_parts(self) -> (Request, KeepAlive, Option<ResponseFuture>) {
        let response = self
            .response
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        (self.request, self.keep_alive, response)
    }
}

impl fmt::Debug for FetchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchEvent")
            .field("id", &self.id)
            .field("url", &self.request.url().as_str())
            .field("responded", &self.has_response())
            .finish()
    }
}
