//! Network access supplied by the host.

use async_trait::async_trait;

use crate::context::{Request, Response};
use crate::error::FetchError;

/// Fetches a request from the network.
///
/// Hosts implement this over whatever transport they have (the platform
/// `fetch`, an HTTP client, a fixture table in tests).
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}
