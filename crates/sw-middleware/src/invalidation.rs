//! Removal of superseded cache entries.
//!
//! Every routed request owns a logical slot (`/{type}/{id}`) in the metadata
//! cache recording which physical URL currently occupies it. When a request
//! for a newer version, another bundle or a new revision takes the slot, the
//! previous URL is deleted from the resource cache. A slot only changes
//! hands once the new URL is actually in the cache.

use sw_cache::{CacheResult, MetadataKey, MetadataStore};
use sw_core::{FetchEvent, KeepAlive, ResourceMetadataRecord};

use crate::context::MiddlewareContext;
use crate::pipeline::Middleware;
use crate::status::ServeOutcome;

/// Whether the entry recorded in `old` must be deleted now that `new`
/// occupies its slot.
///
/// A changed revision, version or bundle supersedes the old entry. Locale
/// changes never do, since every locale of a language pack stays valid. An
/// old record pointing at the same URL is the entry being refreshed and is
/// kept.
pub fn should_remove(old: Option<&ResourceMetadataRecord>, new: &ResourceMetadataRecord) -> bool {
    let Some(old) = old else {
        return false;
    };

    if old.url == new.url {
        return false;
    }

    // `clientCacheRevision=` with no value is the revision "", not an absent
    // one, so it replaces an entry cached under any other revision.
    if new.revision.is_some() && new.revision != old.revision {
        return true;
    }

    old.version != new.version || old.bundle != new.bundle
}

/// Keeps the metadata slot of each routed request current and deletes the
/// entries it supersedes.
///
/// Must run after the router: it does nothing for events the router did not
/// take. The update waits for the router's [`ServeOutcome`] and is skipped
/// when the response was not served from or stored in the cache, so a failed
/// fetch never evicts the entry it was meant to replace.
#[derive(Debug, Clone)]
pub struct Invalidation {
    store: MetadataStore,
}

impl Invalidation {
    pub fn new(store: MetadataStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }
}

impl Middleware for Invalidation {
    fn name(&self) -> &str {
        "invalidation"
    }

    fn handle(&self, event: &FetchEvent, ctx: &mut MiddlewareContext) {
        let (Some(request), Some(meta), Some(cache_name), Some(served)) =
            (&ctx.request, &ctx.meta, &ctx.cache_name, &ctx.served)
        else {
            return;
        };

        let resource_key = MetadataKey::for_descriptor(meta);
        let resource_meta = meta.to_record(request.cache_key());
        let cache_name = cache_name.clone();
        let served = served.clone();
        ctx.extensions.insert(resource_key.clone());
        ctx.extensions.insert(resource_meta.clone());

        let store = self.store.clone();
        let keep_alive = event.keep_alive().clone();
        event.wait_until(async move {
            if served.wait().await.is_none() {
                tracing::debug!(resource_key = %resource_key, "response not cached, keeping metadata");
                return;
            }
            if let Err(e) =
                update_metadata(&store, &keep_alive, &resource_key, resource_meta, cache_name).await
            {
                tracing::warn!(resource_key = %resource_key, error = %e, "failed to write metadata record");
            }
        });
    }
}

/// Replace the record stored under `key` with `record`, scheduling removal
/// of the superseded entry from `cache_name` on `keep_alive` first.
///
/// Returns whether a removal was scheduled.
pub async fn update_metadata(
    store: &MetadataStore,
    keep_alive: &KeepAlive,
    key: &MetadataKey,
    record: ResourceMetadataRecord,
    cache_name: String,
) -> CacheResult<bool> {
    let _guard = store.lock(key).await;

    let old = store.get_metadata(key).await;
    let remove = should_remove(old.as_ref(), &record);

    if let Some(old) = old.filter(|_| remove) {
        tracing::info!(
            resource_key = %key,
            cache_name = %cache_name,
            url = %old.url,
            replacement = %record.url,
            "removing superseded entry"
        );
        let store = store.clone();
        keep_alive.wait_until(async move {
            if let Err(e) = store.remove(&cache_name, &old.url).await {
                tracing::warn!(
                    cache_name = %cache_name,
                    url = %old.url,
                    error = %e,
                    "failed to remove superseded entry"
                );
            }
        });
    }

    store.set_metadata(key, &record).await?;
    Ok(remove)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use sw_cache::{Cache, CacheStorage, InMemoryCacheStorage};
    use sw_core::{Bundle, Request, ResourceDescriptor, ResourceType, Response};

    use crate::status::CacheStatus;

    fn record(
        version: &str,
        bundle: Bundle,
        revision: Option<&str>,
        url: &str,
    ) -> ResourceMetadataRecord {
        ResourceMetadataRecord {
            resource_type: ResourceType::Module,
            name: "checkout".to_string(),
            version: version.to_string(),
            bundle: Some(bundle),
            locale: None,
            revision: revision.map(str::to_string),
            url: url.to_string(),
        }
    }

    #[test]
    fn test_no_old_record_keeps() {
        let new = record("1.0.0", Bundle::Browser, None, "a");
        assert!(!should_remove(None, &new));
    }

    #[test]
    fn test_version_bump_removes() {
        let old = record("1.0.0", Bundle::Browser, None, "a");
        let new = record("1.0.1", Bundle::Browser, None, "b");
        assert!(should_remove(Some(&old), &new));
    }

    #[test]
    fn test_bundle_change_removes() {
        let old = record("1.0.0", Bundle::Browser, None, "a");
        let new = record("1.0.0", Bundle::LegacyBrowser, None, "b");
        assert!(should_remove(Some(&old), &new));
    }

    #[test]
    fn test_revision_change_removes() {
        let old = record("1.0.0", Bundle::Browser, Some("abc"), "a?r=abc");
        let new = record("1.0.0", Bundle::Browser, Some("def"), "a?r=def");
        assert!(should_remove(Some(&old), &new));

        let unrevised = record("1.0.0", Bundle::Browser, None, "a");
        let revised = record("1.0.0", Bundle::Browser, Some("abc"), "a?r=abc");
        assert!(should_remove(Some(&unrevised), &revised));
    }

    #[test]
    fn test_empty_revision_is_a_revision() {
        let old = record("1.0.0", Bundle::Browser, Some("abc"), "a?r=abc");
        let new = record("1.0.0", Bundle::Browser, Some(""), "a?r=");
        assert!(should_remove(Some(&old), &new));
    }

    #[test]
    fn test_missing_revision_does_not_remove() {
        let old = record("1.0.0", Bundle::Browser, Some("abc"), "a?r=abc");
        let new = record("1.0.0", Bundle::Browser, None, "a");
        assert!(!should_remove(Some(&old), &new));
    }

    #[test]
    fn test_locale_change_keeps() {
        let mut old = record("1.0.0", Bundle::Browser, None, "en/x.json");
        old.resource_type = ResourceType::LangPack;
        old.bundle = None;
        old.locale = Some("en-US".to_string());

        let mut new = old.clone();
        new.locale = Some("fr".to_string());
        new.url = "fr/x.json".to_string();

        assert!(!should_remove(Some(&old), &new));
    }

    #[test]
    fn test_identical_keeps() {
        let old = record("1.0.0", Bundle::Browser, Some("abc"), "a");
        assert!(!should_remove(Some(&old), &old.clone()));

        let chunk = record("1.0.0", Bundle::Browser, None, "vendor.chunk.browser.js");
        let main = record("1.0.0", Bundle::Browser, None, "checkout.browser.js");
        assert!(!should_remove(Some(&main), &chunk));
    }

    #[test]
    fn test_same_url_never_removes() {
        let old = record("1.0.0", Bundle::Browser, Some("abc"), "a");
        let new = record("2.0.0", Bundle::LegacyBrowser, Some("def"), "a");
        assert!(!should_remove(Some(&old), &new));
    }

    fn routed_context(url: &str, revision: &str, served: ServeOutcome) -> MiddlewareContext {
        let meta = ResourceDescriptor {
            resource_type: ResourceType::Module,
            name: "checkout".to_string(),
            resource: None,
            version: "1.0.0".to_string(),
            bundle: Some(Bundle::Browser),
            locale: None,
            revision: Some(revision.to_string()),
            chunk: None,
        };
        let mut ctx = MiddlewareContext::new(Some(meta));
        ctx.request = Some(Request::get(url).unwrap());
        ctx.cache_name = Some("module-cache".to_string());
        ctx.served = Some(served);
        ctx
    }

    #[tokio::test]
    async fn test_middleware_replaces_superseded_entry() {
        let storage = Arc::new(InMemoryCacheStorage::new());
        let invalidation = Invalidation::new(MetadataStore::new(storage.clone(), "__sw/__meta"));
        let cache = storage.open("module-cache").await.unwrap();

        let first = "https://cdn.example.com/checkout/1.0.0/checkout.browser.js?clientCacheRevision=abc";
        let second = "https://cdn.example.com/checkout/1.0.0/checkout.browser.js?clientCacheRevision=def";

        for (url, revision) in [(first, "abc"), (second, "def")] {
            cache.put(url, Response::ok(revision)).await.unwrap();
            let event = FetchEvent::new(Request::get(url).unwrap());
            let mut ctx = routed_context(url, revision, ServeOutcome::ready(CacheStatus::Miss));
            invalidation.handle(&event, &mut ctx);

            assert!(ctx.extensions.get::<MetadataKey>().is_some());
            event.keep_alive().settle().await;
        }

        assert_eq!(storage.entry_deletes("module-cache").len(), 1);
        assert_eq!(storage.urls("module-cache"), vec![second.to_string()]);

        let stored = invalidation
            .store()
            .get_metadata(&MetadataKey::new("/module/checkout"))
            .await
            .unwrap();
        assert_eq!(stored.url, second);
        assert_eq!(stored.revision.as_deref(), Some("def"));
    }

    #[tokio::test]
    async fn test_uncached_response_keeps_slot() {
        let storage = Arc::new(InMemoryCacheStorage::new());
        let invalidation = Invalidation::new(MetadataStore::new(storage.clone(), "__sw/__meta"));
        let cache = storage.open("module-cache").await.unwrap();
        let key = MetadataKey::new("/module/checkout");

        let good = "https://cdn.example.com/checkout/1.0.0/checkout.browser.js?clientCacheRevision=abc";
        let missing = "https://cdn.example.com/checkout/1.0.0/checkout.browser.js?clientCacheRevision=def";

        cache.put(good, Response::ok("abc")).await.unwrap();
        let event = FetchEvent::new(Request::get(good).unwrap());
        let mut ctx = routed_context(good, "abc", ServeOutcome::ready(CacheStatus::Hit));
        invalidation.handle(&event, &mut ctx);
        event.keep_alive().settle().await;

        let (signal, served) = ServeOutcome::channel();
        let event = FetchEvent::new(Request::get(missing).unwrap());
        let mut ctx = routed_context(missing, "def", served);
        invalidation.handle(&event, &mut ctx);
        drop(signal);
        event.keep_alive().settle().await;

        assert!(storage.entry_deletes("module-cache").is_empty());
        assert_eq!(storage.urls("module-cache"), vec![good.to_string()]);
        assert_eq!(invalidation.store().get_metadata(&key).await.unwrap().url, good);
    }

    #[tokio::test]
    async fn test_failed_removal_still_writes_metadata() {
        let storage = Arc::new(InMemoryCacheStorage::new());
        let store = MetadataStore::new(storage.clone(), "__sw/__meta");
        let key = MetadataKey::new("/module/checkout");
        let keep_alive = KeepAlive::new();

        store
            .set_metadata(&key, &record("1.0.0", Bundle::Browser, None, "old"))
            .await
            .unwrap();
        storage.fail_deletes(true);

        let removed = update_metadata(
            &store,
            &keep_alive,
            &key,
            record("2.0.0", Bundle::Browser, None, "new"),
            "module-cache".to_string(),
        )
        .await
        .unwrap();
        keep_alive.settle().await;

        assert!(removed);
        assert_eq!(store.get_metadata(&key).await.unwrap().url, "new");
    }

    #[tokio::test]
    async fn test_unrouted_event_is_ignored() {
        let storage = Arc::new(InMemoryCacheStorage::new());
        let invalidation = Invalidation::new(MetadataStore::new(storage.clone(), "__sw/__meta"));

        let event = FetchEvent::new(Request::get("https://example.com/x.png").unwrap());
        let mut ctx = MiddlewareContext::new(None);
        invalidation.handle(&event, &mut ctx);

        assert!(event.keep_alive().is_idle());
        assert!(storage.journal().is_empty());
    }
}
