//! CLI execution context.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _, Result};
use sw_core::WorkerConfig;

use crate::output::Output;

/// Config file names looked up from the working directory upwards.
pub const CONFIG_NAMES: [&str; 3] = ["swc.toml", ".swc.toml", "swc.json"];

/// Execution context for CLI commands.
pub struct Context {
    /// Worker configuration, when a config file was found.
    pub config: Option<WorkerConfig>,
    /// Path the configuration was loaded from.
    pub config_path: Option<PathBuf>,
    /// Output handler.
    pub output: Output,
    /// Working directory.
    pub cwd: PathBuf,
}

impl Context {
    /// Load context from an explicit config file or the nearest one found.
    pub fn load(config_path: Option<&str>, output: Output) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;

        let (config, config_path) = match config_path {
            Some(path) => {
                let path = resolve(&cwd, path);
                let config = WorkerConfig::load(&path)
                    .with_context(|| format!("Failed to load config: {}", path.display()))?;
                (Some(config), Some(path))
            }
            None => match Self::find_config(&cwd) {
                Some(path) => {
                    let config = WorkerConfig::load(&path)
                        .with_context(|| format!("Failed to load config: {}", path.display()))?;
                    (Some(config), Some(path))
                }
                None => (None, None),
            },
        };

        if let Some(path) = &config_path {
            output.debug(&format!("Using config {}", path.display()));
        }

        Ok(Self {
            config,
            config_path,
            output,
            cwd,
        })
    }

    /// Find a config file in the directory tree.
    pub fn find_config(start: &Path) -> Option<PathBuf> {
        let mut current = start.to_path_buf();
        loop {
            for name in &CONFIG_NAMES {
                let candidate = current.join(name);
                if candidate.is_file() {
                    return Some(candidate);
                }
            }

            if !current.pop() {
                return None;
            }
        }
    }

    /// The worker configuration, with command-line overrides applied.
    pub fn worker_config(
        &self,
        build_version: Option<&str>,
        base_url: Option<&str>,
    ) -> Result<WorkerConfig> {
        let mut config = match (&self.config, build_version) {
            (Some(config), Some(version)) => {
                let mut config = config.clone();
                config.build_version = version.to_string();
                config
            }
            (Some(config), None) => config.clone(),
            (None, Some(version)) => WorkerConfig::new(version),
            (None, None) => bail!(
                "No build version. Pass --build-version or create {} with `swc config init`.",
                CONFIG_NAMES[0]
            ),
        };

        if let Some(base) = base_url {
            config.base_url = Some(base.to_string());
        }

        config.validate()?;
        Ok(config)
    }

    /// Resolve a path relative to the working directory.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        resolve(&self.cwd, path)
    }
}

fn resolve(cwd: &Path, path: &str) -> PathBuf {
    let path = PathBuf::from(path);
    if path.is_absolute() {
        path
    } else {
        cwd.join(path)
    }
}
