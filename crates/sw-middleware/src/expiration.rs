//! Age and size based eviction of routed resources.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sw_cache::{CacheResult, ExpirationLedger, ExpirationPolicy, MetadataKey, MetadataStore};
use sw_core::FetchEvent;

use crate::context::MiddlewareContext;
use crate::pipeline::Middleware;
use crate::router::Freshness;
use crate::status::CacheStatus;

/// Source of the current time, in milliseconds since the epoch.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Evicts entries from each routed cache once they are older than the
/// policy's maximum age or the cache holds more than its maximum entries.
///
/// Storage times are kept in a per-cache ledger in the metadata cache and
/// only move when the router stores a response; serving a hit does not make
/// an entry younger. Give the router this middleware as its [`Freshness`]
/// check so entries past the maximum age are refetched instead of served.
#[derive(Clone)]
pub struct Expiration {
    store: MetadataStore,
    policy: ExpirationPolicy,
    clock: Arc<dyn Clock>,
}

impl Expiration {
    pub fn new(store: MetadataStore, policy: ExpirationPolicy) -> Self {
        Self {
            store,
            policy,
            clock: Arc::new(SystemClock),
        }
    }

    /// Use `clock` instead of the wall clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn policy(&self) -> &ExpirationPolicy {
        &self.policy
    }
}

impl Middleware for Expiration {
    fn name(&self) -> &str {
        "expiration"
    }

    fn handle(&self, event: &FetchEvent, ctx: &mut MiddlewareContext) {
        if !self.policy.is_enabled() {
            return;
        }
        let (Some(request), Some(cache_name), Some(served)) =
            (&ctx.request, &ctx.cache_name, &ctx.served)
        else {
            return;
        };

        let served = served.clone();
        let store = self.store.clone();
        let policy = self.policy;
        let cache_name = cache_name.clone();
        let url = request.cache_key().to_string();
        let now = self.clock.now_millis();

        event.wait_until(async move {
            let stored = match served.wait().await {
                Some(CacheStatus::Miss) => true,
                Some(CacheStatus::Hit) => false,
                None => return,
            };
            match expire_entries(&store, &policy, &cache_name, &url, now, stored).await {
                Ok(evicted) if !evicted.is_empty() => {
                    tracing::info!(cache_name = %cache_name, evicted = evicted.len(), "expired cache entries");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(cache_name = %cache_name, error = %e, "failed to update expiration ledger");
                }
            }
        });
    }
}

/// Update the ledger of `cache_name` for `url`, then delete every entry the
/// policy evicts. Returns the evicted URLs.
///
/// A freshly `stored` URL is recorded as stored at `now`. A URL served from
/// the cache keeps its recorded time and is only added when the ledger did
/// not know it. Ledger entries for URLs no longer in the cache are dropped
/// first so they do not count against `max_entries`.
pub async fn expire_entries(
    store: &MetadataStore,
    policy: &ExpirationPolicy,
    cache_name: &str,
    url: &str,
    now: i64,
    stored: bool,
) -> CacheResult<Vec<String>> {
    let key = MetadataKey::expiration(cache_name);
    let _guard = store.lock(&key).await;

    let mut ledger = match store.get::<ExpirationLedger>(&key).await {
        Ok(ledger) => ledger.unwrap_or_default(),
        Err(e) => {
            tracing::warn!(cache_name, error = %e, "unreadable expiration ledger, starting over");
            ExpirationLedger::new()
        }
    };

    let cache = store.storage().open(cache_name).await?;
    let present = cache.keys().await?;
    ledger.retain(|tracked| tracked == url || present.iter().any(|p| p == tracked));
    if stored {
        ledger.touch(url, now);
    } else {
        ledger.track(url, now);
    }

    let evicted = ledger.evict(policy, now);
    for stale in &evicted {
        match cache.delete(stale).await {
            Ok(_) => tracing::debug!(cache_name, url = %stale, "evicted entry"),
            Err(e) => tracing::warn!(cache_name, url = %stale, error = %e, "failed to evict entry"),
        }
    }

    store.set(&key, &ledger).await?;
    Ok(evicted)
}

#[async_trait]
impl Freshness for Expiration {
    async fn is_fresh(&self, cache_name: &str, url: &str) -> bool {
        if self.policy.max_age.is_none() {
            return true;
        }

        let key = MetadataKey::expiration(cache_name);
        match self.store.get::<ExpirationLedger>(&key).await {
            Ok(ledger) => match ledger.and_then(|ledger| ledger.stored_at(url)) {
                Some(stored_at) => !self.policy.is_expired(stored_at, self.clock.now_millis()),
                None => true,
            },
            Err(e) => {
                tracing::warn!(cache_name, error = %e, "unreadable expiration ledger, serving cached entry");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::time::Duration;
    use sw_cache::{Cache, CacheStorage, InMemoryCacheStorage};
    use sw_core::{
        CacheNames, FetchError, Fetcher, Request, ResourceDescriptor, ResourceType, Response,
    };

    use crate::pipeline::Pipeline;
    use crate::router::CacheRouter;
    use crate::status::ServeOutcome;

    #[derive(Default)]
    struct FixedClock(AtomicI64);

    impl FixedClock {
        fn set(&self, millis: i64) {
            self.0.store(millis, Ordering::SeqCst);
        }
    }

    impl Clock for FixedClock {
        fn now_millis(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    async fn visit(expiration: &Expiration, storage: &InMemoryCacheStorage, url: &str) {
        storage
            .open("module-cache")
            .await
            .unwrap()
            .put(url, Response::ok(url))
            .await
            .unwrap();

        let event = FetchEvent::new(Request::get(url).unwrap());
        let mut ctx = MiddlewareContext::new(None);
        ctx.request = Some(event.request().clone());
        ctx.cache_name = Some("module-cache".to_string());
        ctx.served = Some(ServeOutcome::ready(CacheStatus::Miss));

        expiration.handle(&event, &mut ctx);
        event.keep_alive().settle().await;
    }

    struct Origin;

    #[async_trait]
    impl Fetcher for Origin {
        async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
            Ok(Response::ok(request.url().path().to_string()))
        }
    }

    fn max_age_pipeline(storage: Arc<InMemoryCacheStorage>, clock: Arc<FixedClock>) -> Pipeline {
        let expiration = Expiration::new(
            MetadataStore::new(storage.clone(), "__sw/__meta"),
            ExpirationPolicy::unbounded().with_max_age(Duration::from_secs(60)),
        )
        .with_clock(clock);
        let router = CacheRouter::for_cache_names(&CacheNames::default(), storage, Arc::new(Origin))
            .with_freshness(Arc::new(expiration.clone()));

        Pipeline::new().with(router).with(expiration)
    }

    async fn cache_status(pipeline: &Pipeline, url: &str) -> String {
        let meta = ResourceDescriptor {
            resource_type: ResourceType::Module,
            name: "checkout".to_string(),
            resource: None,
            version: "1.0.0".to_string(),
            bundle: None,
            locale: None,
            revision: None,
            chunk: None,
        };
        let event = FetchEvent::new(Request::get(url).unwrap());
        let mut ctx = MiddlewareContext::new(Some(meta));
        pipeline.run(&event, &mut ctx);

        let (_, keep_alive, response) = event.into_parts();
        let response = response.unwrap().await.unwrap();
        keep_alive.settle().await;
        response.header("x-cache-status").unwrap().to_string()
    }

    const URL: &str = "https://cdn.example.com/checkout/1.0.0/checkout.browser.js";

    #[tokio::test]
    async fn test_entries_past_max_age_are_refetched() {
        let storage = Arc::new(InMemoryCacheStorage::new());
        let clock = Arc::new(FixedClock::default());
        let pipeline = max_age_pipeline(storage.clone(), clock.clone());

        let mut statuses = Vec::new();
        for hours in 0..3 {
            clock.set(hours * 3_600_000);
            statuses.push(cache_status(&pipeline, URL).await);
        }

        assert_eq!(statuses, vec!["MISS", "MISS", "MISS"]);
        assert_eq!(storage.urls("module-cache"), vec![URL.to_string()]);
    }

    #[tokio::test]
    async fn test_hits_do_not_extend_max_age() {
        let storage = Arc::new(InMemoryCacheStorage::new());
        let clock = Arc::new(FixedClock::default());
        let pipeline = max_age_pipeline(storage.clone(), clock.clone());
        let ledger_key = MetadataKey::expiration("module-cache");
        let store = MetadataStore::new(storage.clone(), "__sw/__meta");

        let mut statuses = Vec::new();
        for millis in [0, 30_000, 61_000] {
            clock.set(millis);
            statuses.push(cache_status(&pipeline, URL).await);
        }

        assert_eq!(statuses, vec!["MISS", "HIT", "MISS"]);
        let ledger: ExpirationLedger = store.get(&ledger_key).await.unwrap().unwrap();
        assert_eq!(ledger.stored_at(URL), Some(61_000));
    }

    #[tokio::test]
    async fn test_evicts_beyond_max_entries() {
        let storage = Arc::new(InMemoryCacheStorage::new());
        let clock = Arc::new(FixedClock::default());
        let expiration = Expiration::new(
            MetadataStore::new(storage.clone(), "__sw/__meta"),
            ExpirationPolicy::unbounded().with_max_entries(2),
        )
        .with_clock(clock.clone());

        for (i, url) in ["https://cdn/a.js", "https://cdn/b.js", "https://cdn/c.js"]
            .into_iter()
            .enumerate()
        {
            clock.set(i as i64 * 1000);
            visit(&expiration, &storage, url).await;
        }

        assert_eq!(
            storage.urls("module-cache"),
            vec!["https://cdn/b.js".to_string(), "https://cdn/c.js".to_string()]
        );
    }

    #[tokio::test]
    async fn test_evicts_by_age() {
        let storage = Arc::new(InMemoryCacheStorage::new());
        let clock = Arc::new(FixedClock::default());
        let expiration = Expiration::new(
            MetadataStore::new(storage.clone(), "__sw/__meta"),
            ExpirationPolicy::unbounded().with_max_age(Duration::from_secs(60)),
        )
        .with_clock(clock.clone());

        visit(&expiration, &storage, "https://cdn/old.js").await;
        clock.set(61_000);
        visit(&expiration, &storage, "https://cdn/new.js").await;

        assert_eq!(storage.urls("module-cache"), vec!["https://cdn/new.js".to_string()]);
    }

    #[tokio::test]
    async fn test_untracked_removals_do_not_count() {
        let storage = Arc::new(InMemoryCacheStorage::new());
        let store = MetadataStore::new(storage.clone(), "__sw/__meta");
        let policy = ExpirationPolicy::unbounded().with_max_entries(1);

        let cache = storage.open("module-cache").await.unwrap();
        cache.put("https://cdn/a.js", Response::ok("a")).await.unwrap();
        expire_entries(&store, &policy, "module-cache", "https://cdn/a.js", 1, true)
            .await
            .unwrap();

        cache.delete("https://cdn/a.js").await.unwrap();
        let evicted = expire_entries(&store, &policy, "module-cache", "https://cdn/b.js", 2, true)
            .await
            .unwrap();

        assert!(evicted.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_policy_registers_nothing() {
        let storage = Arc::new(InMemoryCacheStorage::new());
        let expiration = Expiration::new(
            MetadataStore::new(storage.clone(), "__sw/__meta"),
            ExpirationPolicy::unbounded(),
        );

        let event = FetchEvent::new(Request::get("https://cdn/a.js").unwrap());
        let mut ctx = MiddlewareContext::new(None);
        ctx.request = Some(event.request().clone());
        ctx.cache_name = Some("module-cache".to_string());
        expiration.handle(&event, &mut ctx);

        assert!(event.keep_alive().is_idle());
    }
}
