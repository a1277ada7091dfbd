//! CLI command implementations.

pub mod classify;
pub mod config;
pub mod simulate;

use clap::{Args, Subcommand};

/// Arguments for the classify command.
#[derive(Args)]
pub struct ClassifyArgs {
    /// URLs to classify.
    #[arg(required = true)]
    pub urls: Vec<String>,

    /// Root application build version (overrides the config file).
    #[arg(short, long)]
    pub build_version: Option<String>,

    /// Origin for relative URLs.
    #[arg(long)]
    pub base_url: Option<String>,
}

/// Arguments for the simulate command.
#[derive(Args)]
pub struct SimulateArgs {
    /// URLs to request, in order.
    pub urls: Vec<String>,

    /// Read URLs from a file, one per line. Blank lines and `#` comments are
    /// skipped.
    #[arg(short, long)]
    pub file: Option<String>,

    /// Root application build version (overrides the config file).
    #[arg(short, long)]
    pub build_version: Option<String>,

    /// Origin for relative URLs.
    #[arg(long)]
    pub base_url: Option<String>,

    /// Status code the simulated network answers with.
    #[arg(long, default_value_t = 200)]
    pub status: u16,

    /// Limit entries per cache (overrides the config file).
    #[arg(long)]
    pub max_entries: Option<usize>,

    /// Disable entry expiration.
    #[arg(long)]
    pub no_expiration: bool,
}

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands.
#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration.
    Show,

    /// Get a configuration value.
    Get {
        /// Configuration key (e.g., expiration.max_entries).
        key: String,
    },

    /// Set a configuration value.
    Set {
        /// Configuration key.
        key: String,
        /// Value to set.
        value: String,
    },

    /// Create a new configuration file.
    Init {
        /// Root application build version.
        #[arg(short, long, default_value = "1.0.0")]
        build_version: String,

        /// Overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },

    /// Validate configuration.
    Validate,
}
