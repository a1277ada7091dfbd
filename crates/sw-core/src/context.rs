//! Intercepted requests and the responses stored for them.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use url::Url;

/// Identifier of a single intercepted event, used to correlate log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(u64);

impl EventId {
    /// Allocate the next event ID for this process.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "evt-{}", self.0)
    }
}

/// A request intercepted by the worker.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    headers: HeaderMap,
}

impl Request {
    /// Create a request with an explicit method.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
        }
    }

    /// Parse `url` and create a `GET` request for it.
    pub fn get(url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::new(Method::GET, Url::parse(url)?))
    }

    /// Add a header.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The full URL string, used as the physical cache key.
    pub fn cache_key(&self) -> &str {
        self.url.as_str()
    }
}

/// A response served to the page or stored in a cache.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Response {
    /// Create a response with a status and body.
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Create a `200 OK` response.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(StatusCode::OK, body)
    }

    /// Add or replace a header.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Add or replace a header in place.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Whether the status is in the `2xx` range.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_ids_increase() {
        let a = EventId::next();
        let b = EventId::next();
        assert!(b.as_u64() > a.as_u64());
        assert!(a.to_string().starts_with("evt-"));
    }

    #[test]
    fn test_request_get() {
        let req = Request::get("https://cdn.example.com/m/1.0.0/m.browser.js?x=1").unwrap();
        assert_eq!(req.method(), Method::GET);
        assert_eq!(req.url().path(), "/m/1.0.0/m.browser.js");
        assert_eq!(req.cache_key(), "https://cdn.example.com/m/1.0.0/m.browser.js?x=1");
    }

    #[test]
    fn test_request_rejects_relative_url() {
        assert!(Request::get("/m/1.0.0/m.browser.js").is_err());
    }

    #[test]
    fn test_response_status() {
        let resp = Response::new(StatusCode::NOT_FOUND, "missing");
        assert!(!resp.is_success());
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
