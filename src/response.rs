//! Responses produced by the engine and the header hygiene applied to them
//! before they leave the edge.

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use std::fmt;

use crate::cache::CachedResponse;
use crate::constants::{CACHE_STATUS_HEADER, GRACE_HEADER};
use crate::error::KasumiError;
use crate::headers::HeaderList;

/// Headers removed from every response and from every persisted record
pub const SANITIZED_HEADERS: &[&str] = &["Age", "X-Powered-By", "Server", "Via", "X-Varnish", "Link"];

/// Connection-level headers; the server re-frames bodies itself
pub const HOP_BY_HOP_HEADERS: &[&str] = &[
    "Connection",
    "Keep-Alive",
    "Transfer-Encoding",
    "Content-Length",
    "Proxy-Connection",
    "TE",
    "Trailer",
    "Upgrade",
];

/// Value of the cache status header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Stale,
    Miss,
    Uncacheable,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Stale => "STALE",
            CacheStatus::Miss => "MISS",
            CacheStatus::Uncacheable => "UNCACHEABLE",
        }
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type BodyStream = BoxStream<'static, Result<Bytes, KasumiError>>;

pub enum ResponseBody {
    /// Fully buffered; served with Content-Length
    Full(Bytes),
    /// Delivered chunk by chunk as it arrives from the origin
    Stream(BodyStream),
    /// HEAD answer: no body, only the length a GET would have carried
    HeadersOnly(Option<usize>),
}

impl ResponseBody {
    pub fn empty() -> Self {
        ResponseBody::Full(Bytes::new())
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            ResponseBody::Full(bytes) => Some(bytes),
            ResponseBody::Stream(_) | ResponseBody::HeadersOnly(_) => None,
        }
    }

    /// Drain the body into memory
    pub async fn collect(self) -> Result<Bytes, KasumiError> {
        match self {
            ResponseBody::Full(bytes) => Ok(bytes),
            ResponseBody::HeadersOnly(_) => Ok(Bytes::new()),
            ResponseBody::Stream(mut stream) => {
                let mut buf = Vec::new();
                while let Some(chunk) = stream.next().await {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(Bytes::from(buf))
            }
        }
    }

    /// Wrap a buffered body as a single-chunk stream
    pub fn into_stream(self) -> BodyStream {
        match self {
            ResponseBody::Full(bytes) => stream::once(async move { Ok(bytes) }).boxed(),
            ResponseBody::Stream(stream) => stream,
            ResponseBody::HeadersOnly(_) => stream::empty().boxed(),
        }
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Full(bytes) => write!(f, "Full({} bytes)", bytes.len()),
            ResponseBody::Stream(_) => f.write_str("Stream"),
            ResponseBody::HeadersOnly(length) => write!(f, "HeadersOnly({:?})", length),
        }
    }
}

#[derive(Debug)]
pub struct EngineResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: HeaderList,
    pub body: ResponseBody,
}

impl EngineResponse {
    pub fn new(status: u16, headers: HeaderList, body: ResponseBody) -> Self {
        Self {
            status,
            status_text: default_status_text(status).to_string(),
            headers,
            body,
        }
    }

    /// Small JSON acknowledgement (purge, errors)
    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        let mut headers = HeaderList::new();
        headers.insert("Content-Type", "application/json");
        Self::new(status, headers, ResponseBody::Full(Bytes::from(value.to_string())))
    }

    /// Rebuild a response from a stored record
    pub fn from_record(record: &CachedResponse) -> Self {
        Self {
            status: record.status,
            status_text: record.status_text.clone(),
            headers: HeaderList::from(&record.headers),
            body: ResponseBody::Full(Bytes::from(record.body.clone())),
        }
    }

    /// Turn a GET-shaped response into the answer to a HEAD. The body is
    /// dropped; its length is kept when known. A dropped stream still lets a
    /// tee capture finish.
    pub fn into_head(mut self) -> Self {
        let length = match &self.body {
            ResponseBody::Full(bytes) => Some(bytes.len()),
            ResponseBody::Stream(_) => self
                .headers
                .get("content-length")
                .and_then(|v| v.trim().parse().ok()),
            ResponseBody::HeadersOnly(length) => *length,
        };
        self.body = ResponseBody::HeadersOnly(length);
        self
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type")
    }

    pub fn is_html(&self) -> bool {
        self.content_type()
            .map(|ct| ct.to_ascii_lowercase().starts_with("text/html"))
            .unwrap_or(false)
    }
}

/// Apply the engine's response contract: drop internal headers, stamp the
/// cache status and force browsers not to cache unless the response is a
/// static asset or already `private`.
pub fn apply_response_headers(response: &mut EngineResponse, status: CacheStatus, is_static: bool) {
    for name in SANITIZED_HEADERS {
        response.headers.remove(name);
    }
    response.headers.insert(CACHE_STATUS_HEADER, status.as_str());
    if status == CacheStatus::Stale {
        response.headers.insert(GRACE_HEADER, "normal");
    } else {
        response.headers.remove(GRACE_HEADER);
    }

    let already_private = response
        .headers
        .get("cache-control")
        .map(|cc| cc.to_ascii_lowercase().contains("private"))
        .unwrap_or(false);
    if !is_static && !already_private {
        response.headers.insert("Pragma", "no-cache");
        response.headers.insert("Expires", "-1");
        response
            .headers
            .insert("Cache-Control", "no-store, no-cache, must-revalidate, max-age=0");
    }
}

pub fn default_status_text(status: u16) -> &'static str {
    http::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("")
}
