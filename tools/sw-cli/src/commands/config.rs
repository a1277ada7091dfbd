//! Configuration management commands.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context as _, Result};
use sw_core::{WorkerConfig, DEFAULT_MAX_AGE_SECS};

use super::{ConfigArgs, ConfigCommand};
use crate::context::{Context, CONFIG_NAMES};

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => show_config(ctx),
        ConfigCommand::Get { key } => get_config(&key, ctx),
        ConfigCommand::Set { key, value } => set_config(&key, &value, ctx),
        ConfigCommand::Init {
            build_version,
            force,
        } => init_config(&build_version, force, ctx),
        ConfigCommand::Validate => validate_config(ctx),
    }
}

fn loaded(ctx: &Context) -> Result<&WorkerConfig> {
    ctx.config.as_ref().ok_or_else(|| {
        anyhow!(
            "No config file found. Create one with `swc config init` ({}).",
            CONFIG_NAMES.join(", ")
        )
    })
}

fn show_config(ctx: &Context) -> Result<()> {
    let config = loaded(ctx)?;

    if ctx.output.is_json() {
        ctx.output.json(config);
        return Ok(());
    }

    ctx.output.header("Current Configuration");
    if let Some(path) = &ctx.config_path {
        ctx.output.kv("file", &path.display().to_string());
    }
    for key in KEYS {
        let value = get_config_value(config, key)?;
        ctx.output.kv(key, &value);
    }

    Ok(())
}

fn get_config(key: &str, ctx: &Context) -> Result<()> {
    let value = get_config_value(loaded(ctx)?, key)?;

    if ctx.output.is_json() {
        ctx.output
            .json(&serde_json::json!({ "key": key, "value": value }));
    } else {
        println!("{}", value);
    }

    Ok(())
}

fn set_config(key: &str, value: &str, ctx: &Context) -> Result<()> {
    let path = ctx
        .config_path
        .clone()
        .ok_or_else(|| anyhow!("No config file found. Run `swc config init` first."))?;
    let mut config = loaded(ctx)?.clone();

    // TOML has no null; a missing limit falls back to its default on load
    if value == "none" && key.starts_with("expiration.") && !is_json(&path) {
        bail!(
            "{} cannot be unset in a TOML config. Use a JSON config or set a larger limit.",
            key
        );
    }

    set_config_value(&mut config, key, value)?;
    config
        .validate()
        .with_context(|| format!("Refusing to set {} = {}", key, value))?;
    save(&config, &path)?;

    ctx.output.success(&format!("Set {} = {}", key, value));
    Ok(())
}

fn init_config(build_version: &str, force: bool, ctx: &Context) -> Result<()> {
    let path = ctx.cwd.join(CONFIG_NAMES[0]);

    if path.exists() && !force {
        bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            path.display()
        );
    }

    let config = WorkerConfig::new(build_version);
    config.validate()?;
    save(&config, &path)?;

    ctx.output.success(&format!("Created: {}", path.display()));
    Ok(())
}

fn validate_config(ctx: &Context) -> Result<()> {
    let config = loaded(ctx)?;
    ctx.output.header("Validating configuration");

    config.validate()?;

    let mut warnings = Vec::new();
    if config.expiration.max_entries.is_none() && config.expiration.max_age_secs.is_none() {
        warnings.push("expiration is disabled; resource caches grow without bound".to_string());
    }
    if config
        .expiration
        .max_age_secs
        .is_some_and(|secs| secs > 12 * DEFAULT_MAX_AGE_SECS)
    {
        warnings.push("expiration.max_age_secs is longer than a year".to_string());
    }
    if !config.serialize_metadata_updates {
        warnings.push(
            "serialize_metadata_updates is off; concurrent updates to one resource may leave \
             orphaned entries"
                .to_string(),
        );
    }

    if ctx.output.is_json() {
        ctx.output
            .json(&serde_json::json!({ "valid": true, "warnings": warnings }));
        return Ok(());
    }

    for warning in &warnings {
        ctx.output.warn(warning);
    }
    ctx.output.success("Configuration is valid");
    Ok(())
}

fn save(config: &WorkerConfig, path: &Path) -> Result<()> {
    let content = if is_json(path) {
        serde_json::to_string_pretty(config)?
    } else {
        toml::to_string_pretty(config)?
    };
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}

/// Keys understood by `get` and `set`, in display order.
const KEYS: [&str; 10] = [
    "build_version",
    "base_url",
    "skip_waiting",
    "serialize_metadata_updates",
    "cache_names.app",
    "cache_names.module",
    "cache_names.lang_pack",
    "cache_names.meta",
    "expiration.max_entries",
    "expiration.max_age_secs",
];

fn optional<T: ToString>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "none".to_string())
}

fn get_config_value(config: &WorkerConfig, key: &str) -> Result<String> {
    let value = match key {
        "build_version" => config.build_version.clone(),
        "base_url" => optional(&config.base_url),
        "skip_waiting" => config.skip_waiting.to_string(),
        "serialize_metadata_updates" => config.serialize_metadata_updates.to_string(),
        "cache_names.app" => config.cache_names.app.clone(),
        "cache_names.module" => config.cache_names.module.clone(),
        "cache_names.lang_pack" => config.cache_names.lang_pack.clone(),
        "cache_names.meta" => config.cache_names.meta.clone(),
        "expiration.max_entries" => optional(&config.expiration.max_entries),
        "expiration.max_age_secs" => optional(&config.expiration.max_age_secs),
        _ => bail!("Unknown config key: {}", key),
    };
    Ok(value)
}

fn parse_optional<T: std::str::FromStr>(key: &str, value: &str) -> Result<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if value == "none" {
        return Ok(None);
    }
    let parsed = value
        .parse()
        .with_context(|| format!("Invalid value for {}: {}", key, value))?;
    Ok(Some(parsed))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    value
        .parse()
        .with_context(|| format!("{} must be true or false", key))
}

fn set_config_value(config: &mut WorkerConfig, key: &str, value: &str) -> Result<()> {
    match key {
        "build_version" => config.build_version = value.to_string(),
        "base_url" => config.base_url = parse_optional(key, value)?,
        "skip_waiting" => config.skip_waiting = parse_bool(key, value)?,
        "serialize_metadata_updates" => {
            config.serialize_metadata_updates = parse_bool(key, value)?
        }
        "cache_names.app" => config.cache_names.app = value.to_string(),
        "cache_names.module" => config.cache_names.module = value.to_string(),
        "cache_names.lang_pack" => config.cache_names.lang_pack = value.to_string(),
        "cache_names.meta" => config.cache_names.meta = value.to_string(),
        "expiration.max_entries" => config.expiration.max_entries = parse_optional(key, value)?,
        "expiration.max_age_secs" => config.expiration.max_age_secs = parse_optional(key, value)?,
        _ => bail!("Unknown config key: {}", key),
    }
    Ok(())
}
