// Request pipeline module - per-request context, URL normalization and bypass policy

use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use url::Url;
use uuid::Uuid;

use crate::cache::DeviceClass;
use crate::headers::{cookie_value, HeaderList};

pub mod bypass;
pub mod normalize;

pub use bypass::{evaluate_bypass, BypassResult};
pub use normalize::Normalizer;

/// A request as handed to the engine by the serving layer
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    pub method: String,
    /// Absolute URL as seen by the client (`scheme://host/path?query`)
    pub url: Url,
    pub headers: HeaderList,
    pub body: Bytes,
}

impl IncomingRequest {
    pub fn new(method: impl Into<String>, url: Url) -> Self {
        Self {
            method: method.into(),
            url,
            headers: HeaderList::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// Request facts extracted once by the `Normalizer`.
///
/// Immutable after construction except for the append-only claims list, the
/// late-bound cache key and the bypass flag.
#[derive(Debug)]
pub struct RequestContext {
    request_id: String,
    pub method: String,
    pub original_url: Url,
    /// URL with marketing parameters removed; the origin is fetched at this URL
    pub url: Url,
    /// `host[:port]` of the normalized URL
    pub host: String,
    pub path: String,
    /// Raw `(name, value)` query pairs left after stripping, in request order
    pub query: Vec<(String, String)>,
    pub stripped_params: Vec<String>,
    pub headers: HeaderList,
    pub body: Bytes,
    pub cookie_header: Option<String>,
    pub ssl_offload: Option<String>,
    pub is_static: bool,
    pub is_health_check: bool,
    pub is_graphql: bool,
    pub graphql_cache_id: Option<String>,
    pub has_bearer: bool,
    pub store: Option<String>,
    pub currency: Option<String>,
    pub device: DeviceClass,
    claims: Mutex<Vec<String>>,
    cache_key: OnceLock<String>,
    bypassed: AtomicBool,
}

impl RequestContext {
    pub(crate) fn new(
        method: String,
        original_url: Url,
        url: Url,
        headers: HeaderList,
        body: Bytes,
    ) -> Self {
        let host = match url.port() {
            Some(port) => format!("{}:{}", url.host_str().unwrap_or_default(), port),
            None => url.host_str().unwrap_or_default().to_string(),
        };
        let cookie_header = headers.get("cookie").map(str::to_string);
        Self {
            request_id: Uuid::new_v4().to_string(),
            method,
            path: url.path().to_string(),
            original_url,
            url,
            host,
            query: Vec::new(),
            stripped_params: Vec::new(),
            headers,
            body,
            cookie_header,
            ssl_offload: None,
            is_static: false,
            is_health_check: false,
            is_graphql: false,
            graphql_cache_id: None,
            has_bearer: false,
            store: None,
            currency: None,
            device: DeviceClass::Desktop,
            claims: Mutex::new(Vec::new()),
            cache_key: OnceLock::new(),
            bypassed: AtomicBool::new(false),
        }
    }

    /// Get the unique request ID
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn is_head(&self) -> bool {
        self.method.eq_ignore_ascii_case("HEAD")
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookie_header
            .as_deref()
            .and_then(|raw| cookie_value(raw, name))
    }

    /// Append a decision to the diagnostic trace
    pub fn claim(&self, claim: impl Into<String>) {
        let claim = claim.into();
        tracing::debug!(request_id = %self.request_id, claim = %claim, "claim");
        self.claims.lock().push(claim);
    }

    pub fn claims(&self) -> Vec<String> {
        self.claims.lock().clone()
    }

    /// Bind the final cache key. Only the first call has an effect.
    pub fn set_cache_key(&self, key: String) {
        let _ = self.cache_key.set(key);
    }

    pub fn cache_key(&self) -> Option<&str> {
        self.cache_key.get().map(String::as_str)
    }

    pub fn mark_bypassed(&self) {
        self.bypassed.store(true, Ordering::Relaxed);
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypassed.load(Ordering::Relaxed)
    }
}
