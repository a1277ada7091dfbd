//! Show how URLs are classified.

use anyhow::Result;
use serde::Serialize;
use sw_cache::MetadataKey;
use sw_classify::Classifier;
use sw_core::{ResourceDescriptor, WorkerConfig};

use super::ClassifyArgs;
use crate::context::Context;

#[derive(Serialize)]
struct Classification {
    url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    resource: Option<ResourceDescriptor>,
}

/// Run the classify command.
pub async fn run(args: ClassifyArgs, ctx: &Context) -> Result<()> {
    let config = ctx.worker_config(args.build_version.as_deref(), args.base_url.as_deref())?;
    let classifier = classifier_for(&config)?;

    let results: Vec<Classification> = args
        .urls
        .iter()
        .map(|url| classify(&classifier, &config, url))
        .collect();

    if ctx.output.is_json() {
        ctx.output.json(&results);
        return Ok(());
    }

    ctx.output
        .header(&format!("Classification (build {})", config.build_version));
    for result in &results {
        print_classification(result, ctx);
    }

    Ok(())
}

/// Build a classifier from a validated config.
pub fn classifier_for(config: &WorkerConfig) -> Result<Classifier> {
    let mut classifier = Classifier::new(&config.build_version)?;
    if let Some(base) = &config.base_url {
        classifier = classifier.with_base(base)?;
    }
    Ok(classifier)
}

fn classify(classifier: &Classifier, config: &WorkerConfig, url: &str) -> Classification {
    match classifier.classify(url) {
        Some(resource) => Classification {
            url: url.to_string(),
            cache: Some(config.cache_names.for_type(resource.resource_type).to_string()),
            key: Some(MetadataKey::for_descriptor(&resource).to_string()),
            resource: Some(resource),
        },
        None => Classification {
            url: url.to_string(),
            cache: None,
            key: None,
            resource: None,
        },
    }
}

fn print_classification(result: &Classification, ctx: &Context) {
    println!();
    println!("{}", result.url);

    let Some(resource) = &result.resource else {
        ctx.output.kv("type", "not cached (network)");
        return;
    };

    ctx.output.kv("type", resource.resource_type.as_str());
    ctx.output.kv("name", &resource.name);
    ctx.output.kv("version", &resource.version);
    if let Some(res) = &resource.resource {
        ctx.output.kv("resource", res);
    }
    if let Some(bundle) = resource.bundle {
        ctx.output.kv("bundle", bundle.as_str());
    }
    if let Some(locale) = &resource.locale {
        ctx.output.kv("locale", &locale.tag);
    }
    if let Some(chunk) = &resource.chunk {
        ctx.output.kv("chunk", chunk);
    }
    match resource.revision.as_deref() {
        Some("") => ctx.output.kv("revision", "(empty)"),
        Some(revision) => ctx.output.kv("revision", revision),
        None => {}
    }
    if let Some(cache) = &result.cache {
        ctx.output.kv("cache", cache);
    }
    if let Some(key) = &result.key {
        ctx.output.kv("metadata key", key);
    }
}
