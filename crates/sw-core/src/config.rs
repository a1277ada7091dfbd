//! Worker configuration.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::resource::ResourceType;

/// Default lifetime of a cached entry: 30 days.
pub const DEFAULT_MAX_AGE_SECS: u64 = 30 * 24 * 60 * 60;

/// Default number of entries kept per resource cache.
pub const DEFAULT_MAX_ENTRIES: usize = 100;

/// Configuration of a module cache worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Version of the running root application build. Only app bundles
    /// under this version are classified.
    pub build_version: String,

    /// Origin used to resolve relative URLs during classification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Names of the physical and metadata caches.
    #[serde(default)]
    pub cache_names: CacheNames,

    /// TTL and size limits applied to resource caches.
    #[serde(default)]
    pub expiration: ExpirationConfig,

    /// Serialize metadata read-modify-write cycles per logical key.
    #[serde(default = "default_true")]
    pub serialize_metadata_updates: bool,

    /// Ask the host to activate a freshly installed worker immediately.
    #[serde(default)]
    pub skip_waiting: bool,
}

fn default_true() -> bool {
    true
}

impl WorkerConfig {
    /// Create a configuration for a build with default cache names.
    pub fn new(build_version: impl Into<String>) -> Self {
        Self {
            build_version: build_version.into(),
            base_url: None,
            cache_names: CacheNames::default(),
            expiration: ExpirationConfig::default(),
            serialize_metadata_updates: true,
            skip_waiting: false,
        }
    }

    /// Set the base origin for relative URLs.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Replace the cache names.
    pub fn with_cache_names(mut self, cache_names: CacheNames) -> Self {
        self.cache_names = cache_names;
        self
    }

    /// Replace the expiration limits.
    pub fn with_expiration(mut self, expiration: ExpirationConfig) -> Self {
        self.expiration = expiration;
        self
    }

    /// Enable or disable per-key serialization of metadata updates.
    pub fn with_serialized_metadata(mut self, enabled: bool) -> Self {
        self.serialize_metadata_updates = enabled;
        self
    }

    /// Enable or disable skip-waiting on install.
    pub fn with_skip_waiting(mut self, enabled: bool) -> Self {
        self.skip_waiting = enabled;
        self
    }

    /// Load a config from a TOML file, or JSON when the path ends in `.json`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path.extension().is_some_and(|ext| ext == "json");
        if is_json {
            Self::from_json(&content)
        } else {
            Self::from_toml(&content)
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Check the invariants the worker relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.build_version.trim().is_empty() {
            return Err(ConfigError::Invalid("build_version must not be empty".into()));
        }
        if self.build_version.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "build_version '{}' must be a single path segment",
                self.build_version
            )));
        }

        let names = self.cache_names.all();
        let mut seen = HashSet::new();
        for name in &names {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid("cache names must not be empty".into()));
            }
            if !seen.insert(*name) {
                return Err(ConfigError::Invalid(format!("duplicate cache name '{}'", name)));
            }
        }

        if self.expiration.max_entries == Some(0) {
            return Err(ConfigError::Invalid("expiration.max_entries must be at least 1".into()));
        }

        Ok(())
    }
}

/// Names of the caches owned by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheNames {
    /// Cache for root application bundles.
    #[serde(default = "default_app_cache")]
    pub app: String,
    /// Cache for module bundles and chunks.
    #[serde(default = "default_module_cache")]
    pub module: String,
    /// Cache for language packs.
    #[serde(default = "default_lang_pack_cache")]
    pub lang_pack: String,
    /// Reserved cache holding metadata records.
    #[serde(default = "default_meta_cache")]
    pub meta: String,
}

fn default_app_cache() -> String {
    "one-app-cache".to_string()
}

fn default_module_cache() -> String {
    "module-cache".to_string()
}

fn default_lang_pack_cache() -> String {
    "lang-pack-cache".to_string()
}

fn default_meta_cache() -> String {
    "__sw/__meta".to_string()
}

impl Default for CacheNames {
    fn default() -> Self {
        Self {
            app: default_app_cache(),
            module: default_module_cache(),
            lang_pack: default_lang_pack_cache(),
            meta: default_meta_cache(),
        }
    }
}

impl CacheNames {
    /// Cache names used by earlier deployments of this worker. Caches with
    /// these names are considered owned and removed on activation when they
    /// are not part of the current configuration.
    pub const KNOWN_NAMES: [&'static str; 8] = [
        "one-app-cache",
        "module-cache",
        "lang-pack-cache",
        "language-pack-cache",
        "__sw/one-app-cache",
        "__sw/module-cache",
        "__sw/lang-pack-cache",
        "__sw/__meta",
    ];

    /// Physical cache used for a resource type.
    pub fn for_type(&self, resource_type: ResourceType) -> &str {
        match resource_type {
            ResourceType::App => &self.app,
            ResourceType::Module => &self.module,
            ResourceType::LangPack => &self.lang_pack,
        }
    }

    /// Resource caches, excluding the metadata cache.
    pub fn resource_caches(&self) -> [&str; 3] {
        [&self.app, &self.module, &self.lang_pack]
    }

    /// All caches, including the metadata cache.
    pub fn all(&self) -> [&str; 4] {
        [&self.app, &self.module, &self.lang_pack, &self.meta]
    }

    /// Whether a cache name belongs to this worker, now or in a previous
    /// deployment.
    pub fn is_owned(&self, name: &str) -> bool {
        self.all().iter().any(|owned| *owned == name)
            || Self::KNOWN_NAMES.iter().any(|known| *known == name)
            || name.starts_with("__sw/")
    }
}

/// Expiration limits for resource caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpirationConfig {
    /// Maximum number of entries per cache; `None` disables the limit.
    #[serde(default = "default_max_entries")]
    pub max_entries: Option<usize>,
    /// Maximum entry age in seconds; `None` disables the limit.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: Option<u64>,
}

fn default_max_entries() -> Option<usize> {
    Some(DEFAULT_MAX_ENTRIES)
}

fn default_max_age_secs() -> Option<u64> {
    Some(DEFAULT_MAX_AGE_SECS)
}

impl Default for ExpirationConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            max_age_secs: default_max_age_secs(),
        }
    }
}

impl ExpirationConfig {
    /// No expiration at all.
    pub fn disabled() -> Self {
        Self {
            max_entries: None,
            max_age_secs: None,
        }
    }
}
