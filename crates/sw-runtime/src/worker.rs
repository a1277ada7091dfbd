//! The module asset worker.

use std::sync::{Arc, Mutex, MutexGuard};

use futures::FutureExt;
use sw_cache::{CacheStorage, ExpirationPolicy, MetadataStore};
use sw_classify::Classifier;
use sw_core::{
    FetchError, FetchEvent, Fetcher, KeepAlive, Request, ResourceDescriptor, Response,
    ResponseFuture, WorkerConfig, WorkerState,
};
use sw_middleware::{CacheRouter, Expiration, Invalidation, MiddlewareContext, Pipeline};

use crate::error::WorkerError;
use crate::host::{ClientMessage, WorkerHost, WorkerMessage};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Outcome of dispatching one intercepted request.
pub struct FetchDispatch {
    /// Response to hand back to the page.
    pub response: ResponseFuture,
    /// Work the event registered; settle it before dropping the worker.
    pub keep_alive: KeepAlive,
    /// Classification of the request URL.
    pub resource: Option<ResourceDescriptor>,
    /// Whether the request was routed to a cache. Unrouted requests go
    /// straight to the network.
    pub routed: bool,
}

impl std::fmt::Debug for FetchDispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchDispatch")
            .field("keep_alive", &self.keep_alive)
            .field("resource", &self.resource)
            .field("routed", &self.routed)
            .finish()
    }
}

/// Caches module bundles, language packs and root app bundles, and removes
/// entries superseded by newer versions, bundles or revisions.
pub struct ModuleCacheWorker {
    config: WorkerConfig,
    classifier: Classifier,
    pipeline: Pipeline,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    host: Arc<dyn WorkerHost>,
    state: Mutex<WorkerState>,
    scopes: Mutex<Vec<KeepAlive>>,
}

impl ModuleCacheWorker {
    /// Build a worker from `config`.
    ///
    /// On failure the worker unregisters itself and posts
    /// [`WorkerMessage::Error`] to its clients before returning the error.
    pub async fn start(
        config: WorkerConfig,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        host: Arc<dyn WorkerHost>,
    ) -> Result<Self, WorkerError> {
        match Self::build(config, storage, fetcher, host.clone()) {
            Ok(worker) => {
                tracing::info!(
                    build_version = %worker.config.build_version,
                    middleware = ?worker.pipeline.names(),
                    "worker started"
                );
                Ok(worker)
            }
            Err(e) => {
                tracing::error!(error = %e, "worker failed to start, unregistering");
                report_start_failure(host.as_ref(), &e).await;
                Err(e)
            }
        }
    }

    fn build(
        config: WorkerConfig,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        host: Arc<dyn WorkerHost>,
    ) -> Result<Self, WorkerError> {
        config.validate()?;

        let mut classifier = Classifier::new(&config.build_version)?;
        if let Some(base) = &config.base_url {
            classifier = classifier.with_base(base)?;
        }

        let names = &config.cache_names;
        let store = MetadataStore::new(storage.clone(), names.meta.clone())
            .serialized(config.serialize_metadata_updates);
        let expiration = Expiration::new(store.clone(), ExpirationPolicy::from(&config.expiration));
        let mut router = CacheRouter::for_cache_names(names, storage.clone(), fetcher.clone());
        if expiration.policy().max_age.is_some() {
            router = router.with_freshness(Arc::new(expiration.clone()));
        }
        let pipeline = Pipeline::new()
            .with(router)
            .with(Invalidation::new(store))
            .with(expiration);

        Ok(Self {
            config,
            classifier,
            pipeline,
            storage,
            fetcher,
            host,
            state: Mutex::new(WorkerState::Parsed),
            scopes: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn state(&self) -> WorkerState {
        *lock(&self.state)
    }

    fn set_state(&self, state: WorkerState) {
        let mut current = lock(&self.state);
        tracing::debug!(from = %*current, to = %state, "worker state change");
        *current = state;
    }

    /// Install handler. Asks the host to skip waiting when configured to.
    pub async fn on_install(&self) -> Result<(), WorkerError> {
        self.set_state(WorkerState::Installing);
        if self.config.skip_waiting {
            self.host.skip_waiting().await?;
        }
        self.set_state(WorkerState::Installed);
        Ok(())
    }

    /// Activate handler. Deletes caches left behind by earlier deployments
    /// under names this worker owns, then claims clients. Returns the
    /// deleted cache names.
    pub async fn on_activate(&self) -> Result<Vec<String>, WorkerError> {
        self.set_state(WorkerState::Activating);

        let names = &self.config.cache_names;
        let current = names.all();
        let mut deleted = Vec::new();
        for name in self.storage.keys().await? {
            if !names.is_owned(&name) || current.iter().any(|c| *c == name) {
                continue;
            }
            if self.storage.delete(&name).await? {
                tracing::info!(cache_name = %name, "deleted orphaned cache");
                deleted.push(name);
            }
        }

        self.host.claim_clients().await?;
        self.set_state(WorkerState::Activated);
        Ok(deleted)
    }

    /// Message handler for client commands.
    pub async fn on_message(&self, message: ClientMessage) -> Result<(), WorkerError> {
        tracing::debug!(?message, "client message");
        match message {
            ClientMessage::SkipWaiting => self.host.skip_waiting().await?,
            ClientMessage::ClearCache => {
                let mut caches = Vec::new();
                for name in self.config.cache_names.all() {
                    if self.storage.delete(name).await? {
                        caches.push(name.to_string());
                    }
                }
                tracing::info!(?caches, "cleared caches");
                self.host
                    .post_message(WorkerMessage::CacheCleared { caches })
                    .await?;
            }
        }
        Ok(())
    }

    /// Classify `request` and run the pipeline over it.
    ///
    /// Nothing is awaited here: the returned response future and keep-alive
    /// scope carry all the work. Requests are not intercepted before
    /// activation and get a network passthrough; a terminated worker answers
    /// every request with [`FetchError::Terminated`].
    pub fn dispatch_fetch(&self, request: Request) -> FetchDispatch {
        let keep_alive = KeepAlive::new();

        match self.state() {
            WorkerState::Redundant => {
                return FetchDispatch {
                    response: async { Err::<Response, _>(FetchError::Terminated) }.boxed(),
                    keep_alive,
                    resource: None,
                    routed: false,
                };
            }
            state if !state.can_intercept_fetch() => {
                tracing::debug!(%state, url = %request.url(), "not intercepting before activation");
                return FetchDispatch {
                    response: self.passthrough(request),
                    keep_alive,
                    resource: None,
                    routed: false,
                };
            }
            _ => {}
        }

        self.track(&keep_alive);

        let meta = self.classifier.classify_url(request.url());
        let event = FetchEvent::with_keep_alive(request, keep_alive);
        let mut ctx = MiddlewareContext::new(meta);
        self.pipeline.run(&event, &mut ctx);

        let routed = ctx.is_routed();
        let (request, keep_alive, response) = event.into_parts();
        let response = match response {
            Some(response) => response,
            None => self.passthrough(request),
        };

        FetchDispatch {
            response,
            keep_alive,
            resource: ctx.meta,
            routed,
        }
    }

    /// Dispatch `request`, wait for its response, then settle the work it
    /// registered.
    pub async fn handle_fetch(&self, request: Request) -> Result<Response, FetchError> {
        let dispatch = self.dispatch_fetch(request);
        let response = dispatch.response.await;
        let settled = dispatch.keep_alive.settle().await;
        tracing::trace!(settled, "keep-alive scope settled");
        response
    }

    /// Abort all in-flight work and stop intercepting. Returns the number of
    /// scopes that still had work outstanding.
    pub fn terminate(&self) -> usize {
        self.set_state(WorkerState::Redundant);

        let scopes = std::mem::take(&mut *lock(&self.scopes));
        let busy = scopes.iter().filter(|s| !s.is_idle()).count();
        for scope in &scopes {
            scope.cancel();
        }
        tracing::info!(cancelled = busy, "worker terminated");
        busy
    }

    fn track(&self, keep_alive: &KeepAlive) {
        let mut scopes = lock(&self.scopes);
        scopes.retain(|s| !s.is_idle());
        scopes.push(keep_alive.clone());
    }

    fn passthrough(&self, request: Request) -> ResponseFuture {
        let fetcher = self.fetcher.clone();
        async move { fetcher.fetch(&request).await }.boxed()
    }
}

impl std::fmt::Debug for ModuleCacheWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleCacheWorker")
            .field("build_version", &self.config.build_version)
            .field("state", &self.state())
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

async fn report_start_failure(host: &dyn WorkerHost, error: &WorkerError) {
    if let Err(e) = host.unregister().await {
        tracing::warn!(error = %e, "failed to unregister after start failure");
    }
    let message = WorkerMessage::Error {
        message: error.to_string(),
    };
    if let Err(e) = host.post_message(message).await {
        tracing::warn!(error = %e, "failed to report start failure to clients");
    }
}
