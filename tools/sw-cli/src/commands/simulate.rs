//! Replay a sequence of requests through an in-memory worker.

use std::collections::BTreeSet;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use async_trait::async_trait;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use serde::Serialize;
use sw_cache::{CacheOp, ExpirationLedger, InMemoryCacheStorage, MetadataKey, MetadataStore};
use sw_core::{
    ExpirationConfig, FetchError, Fetcher, Request, ResourceMetadataRecord, Response, WorkerConfig,
};
use sw_middleware::X_CACHE_STATUS;
use sw_runtime::{LoggingHost, ModuleCacheWorker};
use url::Url;

use super::SimulateArgs;
use crate::context::Context;
use crate::output::{cache_status_badge, format_millis};

/// Network stand-in that answers every request with a fixed status.
struct SimulatedNetwork {
    status: StatusCode,
    requests: AtomicUsize,
}

impl SimulatedNetwork {
    fn new(status: StatusCode) -> Self {
        Self {
            status,
            requests: AtomicUsize::new(0),
        }
    }

    fn requests(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Fetcher for SimulatedNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        self.requests.fetch_add(1, Ordering::Relaxed);

        let url = request.url();
        let content_type = if url.path().ends_with(".json") {
            "application/json"
        } else {
            "application/javascript"
        };
        Ok(Response::new(self.status, format!("/* {} */", url))
            .with_header(CONTENT_TYPE, HeaderValue::from_static(content_type)))
    }
}

/// What happened to one request.
#[derive(Debug, Serialize)]
struct Step {
    url: String,
    routed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
    cache_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    removed: Vec<String>,
}

#[derive(Debug, Serialize)]
struct CacheSummary {
    name: String,
    entries: Vec<CachedEntry>,
}

#[derive(Debug, Serialize)]
struct CachedEntry {
    url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stored_at: Option<String>,
}

#[derive(Debug, Serialize)]
struct Report {
    build_version: String,
    started_at: String,
    network_requests: usize,
    steps: Vec<Step>,
    caches: Vec<CacheSummary>,
    metadata: Vec<(String, ResourceMetadataRecord)>,
}

/// Run the simulate command.
pub async fn run(args: SimulateArgs, ctx: &Context) -> Result<()> {
    let config = simulation_config(&args, ctx)?;
    let urls = collect_urls(&args, ctx)?;
    if urls.is_empty() {
        bail!("No URLs to simulate. Pass URLs as arguments or use --file.");
    }
    let status = StatusCode::from_u16(args.status)
        .with_context(|| format!("Invalid status code: {}", args.status))?;

    let report = simulate(config, &urls, status).await?;

    if ctx.output.is_json() {
        ctx.output.json(&report);
    } else {
        print_report(&report, ctx);
    }

    Ok(())
}

fn simulation_config(args: &SimulateArgs, ctx: &Context) -> Result<WorkerConfig> {
    let mut config = ctx.worker_config(args.build_version.as_deref(), args.base_url.as_deref())?;
    if args.no_expiration {
        config.expiration = ExpirationConfig::disabled();
    } else if let Some(max_entries) = args.max_entries {
        config.expiration.max_entries = Some(max_entries);
    }
    config.validate()?;
    Ok(config)
}

fn collect_urls(args: &SimulateArgs, ctx: &Context) -> Result<Vec<String>> {
    let mut urls = args.urls.clone();
    if let Some(file) = &args.file {
        let path = ctx.resolve_path(file);
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read URL list: {}", path.display()))?;
        urls.extend(parse_url_list(&content));
    }
    Ok(urls)
}

fn parse_url_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

fn request_for(url: &str, base: Option<&Url>) -> Result<Request> {
    let parsed = match base {
        Some(base) => base.join(url),
        None => Url::parse(url),
    }
    .with_context(|| format!("Invalid URL: {}", url))?;
    Ok(Request::get(parsed.as_str())?)
}

async fn simulate(config: WorkerConfig, urls: &[String], status: StatusCode) -> Result<Report> {
    let storage = Arc::new(InMemoryCacheStorage::new());
    let network = Arc::new(SimulatedNetwork::new(status));
    let base = config
        .base_url
        .as_deref()
        .map(Url::parse)
        .transpose()
        .context("Invalid base_url")?;
    let names = config.cache_names.clone();
    let build_version = config.build_version.clone();
    let started_at = chrono::Utc::now().to_rfc3339();

    let worker =
        ModuleCacheWorker::start(config, storage.clone(), network.clone(), Arc::new(LoggingHost))
            .await?;
    worker.on_install().await?;
    worker.on_activate().await?;
    storage.clear_journal();

    let resource_caches = names.resource_caches();
    let mut keys = BTreeSet::new();
    let mut steps = Vec::with_capacity(urls.len());

    for url in urls {
        let request = request_for(url, base.as_ref())?;
        let before = storage.journal().len();

        let dispatch = worker.dispatch_fetch(request);
        let key = dispatch.resource.as_ref().map(MetadataKey::for_descriptor);
        let routed = dispatch.routed;
        let result = dispatch.response.await;
        dispatch.keep_alive.settle().await;

        let removed = storage.journal()[before..]
            .iter()
            .filter_map(|op| match op {
                CacheOp::Delete {
                    cache,
                    url,
                    existed: true,
                } if resource_caches.contains(&cache.as_str()) => Some(url.clone()),
                _ => None,
            })
            .collect();

        let (status, cache_status, error) = match result {
            Ok(response) => {
                let cache_status = response
                    .header(X_CACHE_STATUS.as_str())
                    .unwrap_or("PASS")
                    .to_string();
                (Some(response.status().as_u16()), cache_status, None)
            }
            Err(e) => (None, "ERROR".to_string(), Some(e.to_string())),
        };

        if let Some(key) = &key {
            keys.insert(key.clone());
        }
        steps.push(Step {
            url: url.clone(),
            routed,
            key: key.map(|k| k.to_string()),
            status,
            cache_status,
            error,
            removed,
        });
    }

    let store = MetadataStore::new(storage.clone(), names.meta.clone());
    let mut caches = Vec::new();
    for name in resource_caches {
        let ledger: ExpirationLedger = store
            .get(&MetadataKey::expiration(name))
            .await
            .ok()
            .flatten()
            .unwrap_or_default();
        let entries = storage
            .urls(name)
            .into_iter()
            .map(|url| CachedEntry {
                stored_at: ledger.stored_at(&url).map(format_millis),
                url,
            })
            .collect();
        caches.push(CacheSummary {
            name: name.to_string(),
            entries,
        });
    }

    let mut metadata = Vec::new();
    for key in keys {
        if let Some(record) = store.get_metadata(&key).await {
            metadata.push((key.to_string(), record));
        }
    }

    Ok(Report {
        build_version,
        started_at,
        network_requests: network.requests(),
        steps,
        caches,
        metadata,
    })
}

fn print_report(report: &Report, ctx: &Context) {
    ctx.output.header(&format!(
        "Simulating {} requests (build {})",
        report.steps.len(),
        report.build_version
    ));
    ctx.output.kv("started", &report.started_at);

    for (i, step) in report.steps.iter().enumerate() {
        println!();
        println!(
            "{:>3}. [{}] {}",
            i + 1,
            cache_status_badge(&step.cache_status),
            step.url
        );
        match &step.key {
            Some(key) => ctx.output.kv("key", key),
            None if step.routed => {}
            None => ctx.output.kv("key", "(not cached)"),
        }
        if let Some(status) = step.status {
            ctx.output.kv("status", &status.to_string());
        }
        if let Some(error) = &step.error {
            ctx.output.warn(error);
        }
        for url in &step.removed {
            ctx.output.kv("removed", url);
        }
    }

    ctx.output.header("Caches");
    for cache in &report.caches {
        println!("{} ({} entries)", cache.name, cache.entries.len());
        for entry in &cache.entries {
            match &entry.stored_at {
                Some(stored_at) => ctx.output.list_item(&format!("{} @ {}", entry.url, stored_at)),
                None => ctx.output.list_item(&entry.url),
            }
        }
    }

    ctx.output.header("Metadata");
    if report.metadata.is_empty() {
        ctx.output.info("No records.");
    }
    for (key, record) in &report.metadata {
        println!("{}", key);
        ctx.output.kv("url", &record.url);
        ctx.output.kv("version", &record.version);
        if let Some(revision) = &record.revision {
            ctx.output.kv("revision", revision);
        }
    }

    println!();
    ctx.output.success(&format!(
        "{} requests, {} went to the network",
        report.steps.len(),
        report.network_requests
    ));
}
