//! Host services available to the worker.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Message posted by the worker to its clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WorkerMessage {
    /// The worker failed and unregistered itself.
    Error { message: String },
    /// Caches deleted on a client's request.
    CacheCleared { caches: Vec<String> },
}

/// Command posted by a client to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Activate a waiting worker immediately.
    SkipWaiting,
    /// Delete every cache the worker owns, metadata included.
    ClearCache,
}

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("Host operation '{operation}' failed: {reason}")]
    Failed {
        operation: &'static str,
        reason: String,
    },
}

/// Registration, client messaging and lifecycle control supplied by the
/// environment the worker runs in.
#[async_trait]
pub trait WorkerHost: Send + Sync {
    /// Remove the worker's registration. Returns whether it was registered.
    async fn unregister(&self) -> Result<bool, HostError>;

    /// Post `message` to every controlled client.
    async fn post_message(&self, message: WorkerMessage) -> Result<(), HostError>;

    async fn skip_waiting(&self) -> Result<(), HostError>;

    /// Take control of clients loaded before activation.
    async fn claim_clients(&self) -> Result<(), HostError>;
}

/// Host that only logs what it is asked to do.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHost;

#[async_trait]
impl WorkerHost for LoggingHost {
    async fn unregister(&self) -> Result<bool, HostError> {
        tracing::info!("unregister requested");
        Ok(true)
    }

    async fn post_message(&self, message: WorkerMessage) -> Result<(), HostError> {
        tracing::info!(?message, "message posted to clients");
        Ok(())
    }

    async fn skip_waiting(&self) -> Result<(), HostError> {
        tracing::info!("skip waiting requested");
        Ok(())
    }

    async fn claim_clients(&self) -> Result<(), HostError> {
        tracing::info!("claiming clients");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_message_wire_format() {
        let json = serde_json::to_value(WorkerMessage::Error {
            message: "boom".to_string(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({ "type": "error", "message": "boom" }));

        let json = serde_json::to_value(WorkerMessage::CacheCleared {
            caches: vec!["module-cache".to_string()],
        })
        .unwrap();
        assert_eq!(json["type"], "cache-cleared");
    }

    #[test]
    fn test_client_message_parse() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"skip-waiting"}"#).unwrap();
        assert_eq!(msg, ClientMessage::SkipWaiting);

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"clear-cache"}"#).unwrap();
        assert_eq!(msg, ClientMessage::ClearCache);
    }
}
