//! Cache-first routing of classified requests.

use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use http::Method;
use regex::Regex;
use sw_cache::CacheStorage;
use sw_core::{
    CacheNames, FetchError, FetchEvent, Fetcher, KeepAlive, Request, ResourceDescriptor,
    ResourceType, Response,
};

use crate::context::MiddlewareContext;
use crate::pipeline::Middleware;
use crate::status::{CacheStatus, ServeOutcome, ServeSignal, X_CACHE_STATUS};

/// Decides whether a cached entry may still be served.
#[async_trait]
pub trait Freshness: Send + Sync {
    async fn is_fresh(&self, cache_name: &str, url: &str) -> bool;
}

/// Decides whether a rule applies to a request.
#[derive(Debug, Clone)]
pub enum RouteMatcher {
    /// The full request URL matches the pattern.
    Pattern(Regex),
    /// The request was classified as this resource type.
    Resource(ResourceType),
}

impl RouteMatcher {
    pub fn matches(&self, request: &Request, meta: Option<&ResourceDescriptor>) -> bool {
        match self {
            Self::Pattern(pattern) => pattern.is_match(request.url().as_str()),
            Self::Resource(resource_type) => {
                meta.is_some_and(|meta| meta.resource_type == *resource_type)
            }
        }
    }
}

/// Sends matching requests to a named cache.
#[derive(Debug, Clone)]
pub struct RouteRule {
    pub cache_name: String,
    pub matcher: RouteMatcher,
}

impl RouteRule {
    /// Rule for requests classified as `resource_type`.
    pub fn resource(cache_name: impl Into<String>, resource_type: ResourceType) -> Self {
        Self {
            cache_name: cache_name.into(),
            matcher: RouteMatcher::Resource(resource_type),
        }
    }

    /// Rule for request URLs matching `pattern`.
    pub fn pattern(cache_name: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            cache_name: cache_name.into(),
            matcher: RouteMatcher::Pattern(Regex::new(pattern)?),
        })
    }
}

/// Routes `GET` requests to a cache and answers them cache-first, falling
/// back to the network.
///
/// The first matching rule wins. Successful network responses are stored
/// under the exact request URL. Requests no rule matches are left alone.
/// With a [`Freshness`] check, cached entries it rejects are refetched as
/// misses.
pub struct CacheRouter {
    rules: Vec<RouteRule>,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    freshness: Option<Arc<dyn Freshness>>,
}

impl CacheRouter {
    /// Create a router without rules.
    pub fn new(storage: Arc<dyn CacheStorage>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            rules: Vec::new(),
            storage,
            fetcher,
            freshness: None,
        }
    }

    /// Create a router sending each resource type to its configured cache.
    pub fn for_cache_names(
        names: &CacheNames,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        [ResourceType::App, ResourceType::Module, ResourceType::LangPack]
            .into_iter()
            .fold(Self::new(storage, fetcher), |router, resource_type| {
                router.with_rule(RouteRule::resource(names.for_type(resource_type), resource_type))
            })
    }

    /// Append a rule.
    pub fn with_rule(mut self, rule: RouteRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Serve cached entries only while `freshness` accepts them.
    pub fn with_freshness(mut self, freshness: Arc<dyn Freshness>) -> Self {
        self.freshness = Some(freshness);
        self
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    /// The rule that takes `request`, if any.
    pub fn route(
        &self,
        request: &Request,
        meta: Option<&ResourceDescriptor>,
    ) -> Option<&RouteRule> {
        if *request.method() != Method::GET {
            return None;
        }
        self.rules.iter().find(|rule| rule.matcher.matches(request, meta))
    }
}

impl Middleware for CacheRouter {
    fn name(&self) -> &str {
        "cache-router"
    }

    fn handle(&self, event: &FetchEvent, ctx: &mut MiddlewareContext) {
        let request = event.request();
        let Some(rule) = self.route(request, ctx.meta.as_ref()) else {
            tracing::debug!(url = %request.url(), "no route, passing through");
            return;
        };

        tracing::debug!(url = %request.url(), cache_name = %rule.cache_name, "routing request");
        let (signal, served) = ServeOutcome::channel();
        ctx.request = Some(request.clone());
        ctx.cache_name = Some(rule.cache_name.clone());
        ctx.served = Some(served);

        let route = RoutedFetch {
            storage: self.storage.clone(),
            fetcher: self.fetcher.clone(),
            freshness: self.freshness.clone(),
            cache_name: rule.cache_name.clone(),
            request: request.clone(),
            keep_alive: event.keep_alive().clone(),
            signal,
        };
        event.respond_with(route.cache_falling_back_to_network().boxed());
    }
}

struct RoutedFetch {
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    freshness: Option<Arc<dyn Freshness>>,
    cache_name: String,
    request: Request,
    keep_alive: KeepAlive,
    signal: ServeSignal,
}

impl RoutedFetch {
    async fn cache_falling_back_to_network(self) -> Result<Response, FetchError> {
        let Self {
            storage,
            fetcher,
            freshness,
            cache_name,
            request,
            keep_alive,
            signal,
        } = self;
        let url = request.cache_key().to_string();

        if let Some(mut cached) = lookup(storage.as_ref(), &cache_name, &url).await {
            let fresh = match &freshness {
                Some(freshness) => freshness.is_fresh(&cache_name, &url).await,
                None => true,
            };
            if fresh {
                tracing::debug!(url = %url, cache_name = %cache_name, "cache hit");
                signal.send(CacheStatus::Hit);
                cached.set_header(X_CACHE_STATUS, CacheStatus::Hit.header_value());
                return Ok(cached);
            }
            tracing::debug!(url = %url, cache_name = %cache_name, "cached entry expired, refetching");
        }

        tracing::debug!(url = %url, cache_name = %cache_name, "cache miss, fetching");
        let mut response = fetcher.fetch(&request).await?;

        if response.is_success() {
            let stored = response.clone();
            keep_alive.wait_until(async move {
                let result = match storage.open(&cache_name).await {
                    Ok(cache) => cache.put(&url, stored).await,
                    Err(e) => Err(e),
                };
                match result {
                    Ok(()) => {
                        tracing::debug!(url = %url, cache_name = %cache_name, "stored response");
                        signal.send(CacheStatus::Miss);
                    }
                    Err(e) => {
                        tracing::warn!(url = %url, cache_name = %cache_name, error = %e, "failed to store response")
                    }
                }
            });
        } else {
            tracing::debug!(url = %url, status = %response.status(), "not storing unsuccessful response");
        }

        response.set_header(X_CACHE_STATUS, CacheStatus::Miss.header_value());
        Ok(response)
    }
}

async fn lookup(storage: &dyn CacheStorage, cache_name: &str, url: &str) -> Option<Response> {
    let cache = match storage.open(cache_name).await {
        Ok(cache) => cache,
        Err(e) => {
            tracing::warn!(cache_name, error = %e, "failed to open cache");
            return None;
        }
    };
    match cache.match_url(url).await {
        Ok(cached) => cached,
        Err(e) => {
            tracing::warn!(url, cache_name, error = %e, "cache lookup failed");
            None
        }
    }
}
