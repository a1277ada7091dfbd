//! Worker error types.

use sw_cache::CacheError;
use sw_classify::ClassifyError;
use sw_core::ConfigError;

use crate::host::HostError;

/// Errors raised by the worker's lifecycle handlers.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Invalid worker config: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to build URL classifier: {0}")]
    Classify(#[from] ClassifyError),

    #[error("Cache storage error: {0}")]
    Cache(#[from] CacheError),

    #[error("Host error: {0}")]
    Host(#[from] HostError),
}
