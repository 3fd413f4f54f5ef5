//! Transport seam between the orchestrators and the network.
//!
//! Hosts implement [`Transport`] on top of their HTTP client. Keeping it a
//! trait keeps the upload logic testable with scripted responses.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;

/// Called with the number of body bytes sent so far for the current request.
pub type BytesSentCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// Failure of the transport itself, before any status was received.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("request timed out")]
    Timeout,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("response error: {0}")]
    Response(String),
}

/// One `PUT` to the upload URL.
///
/// A `None` body is an offset probe.
#[derive(Clone)]
pub struct PutRequest {
    pub url: String,
    pub body: Option<Bytes>,
    pub headers: Vec<(String, String)>,
    pub on_progress: Option<BytesSentCallback>,
}

impl PutRequest {
    /// Value of header `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Length of the body, `0` for probes.
    pub fn body_len(&self) -> usize {
        self.body.as_ref().map_or(0, Bytes::len)
    }
}

impl fmt::Debug for PutRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PutRequest")
            .field("url", &self.url)
            .field("body_len", &self.body_len())
            .field("headers", &self.headers)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

/// Status and headers of a response. Header names are lower-cased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
}

impl PutResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
        }
    }

    /// Adds a header, lower-casing its name.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Sends `PUT` requests to a resumable upload endpoint.
///
/// Implementations must not follow redirects: a `308` is a protocol answer,
/// not a redirect. Timeouts, if any, belong here too.
pub trait Transport: Send + Sync {
    fn put(
        &self,
        request: PutRequest,
    ) -> Pin<Box<dyn Future<Output = Result<PutResponse, TransportError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_header_lookup_ignores_case() {
        let req = PutRequest {
            url: "https://up.example/1".into(),
            body: Some(Bytes::from_static(b"abc")),
            headers: vec![("Content-Range".into(), "bytes 0-2/3".into())],
            on_progress: None,
        };
        assert_eq!(req.header("content-range"), Some("bytes 0-2/3"));
        assert_eq!(req.header("Content-Type"), None);
        assert_eq!(req.body_len(), 3);
    }

    #[test]
    fn response_headers_are_lower_cased() {
        let res = PutResponse::new(308).with_header("Range", "bytes=0-99");
        assert_eq!(res.header("range"), Some("bytes=0-99"));
        assert_eq!(res.header("RANGE"), Some("bytes=0-99"));
        assert!(res.headers.contains_key("range"));
    }

    #[test]
    fn debug_omits_body_bytes() {
        let req = PutRequest {
            url: "u".into(),
            body: None,
            headers: Vec::new(),
            on_progress: None,
        };
        let out = format!("{req:?}");
        assert!(out.contains("body_len: 0"));
    }
}
