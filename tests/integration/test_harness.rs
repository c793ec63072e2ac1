// Test utilities: in-process origin and asset prober doubles, engine builder

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use kasumi::cache::{now_millis, CacheRecord, KvStore, ListPage, MemoryStore, StoreError};
use kasumi::config::Config;
use kasumi::engine::CacheEngine;
use kasumi::error::KasumiError;
use kasumi::headers::HeaderList;
use kasumi::origin::{Origin, OriginRequest, OriginResponse};
use kasumi::pipeline::IncomingRequest;
use kasumi::pipeline::RequestContext;
use kasumi::plugins::{AssetProber, Plugin};
use kasumi::response::{EngineResponse, ResponseBody};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// A canned origin response
#[derive(Debug, Clone)]
pub struct Canned {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Canned {
    pub fn html(body: &str) -> Self {
        Self {
            status: 200,
            headers: vec![("Content-Type".to_string(), "text/html; charset=UTF-8".to_string())],
            body: body.to_string(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// Origin double: answers every request with the current canned response,
/// streamed in two chunks, and records what it was asked for. While failing
/// it records the request and returns a transport error instead.
pub struct MockOrigin {
    response: Mutex<Canned>,
    requests: Mutex<Vec<OriginRequest>>,
    failing: AtomicBool,
}

impl MockOrigin {
    pub fn new(response: Canned) -> Arc<Self> {
        Arc::new(Self {
            response: Mutex::new(response),
            requests: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_response(&self, response: Canned) {
        *self.response.lock() = response;
    }

    pub fn requests(&self) -> Vec<OriginRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl Origin for MockOrigin {
    async fn fetch(&self, request: OriginRequest) -> Result<OriginResponse, KasumiError> {
        self.requests.lock().push(request);
        if self.failing.load(Ordering::SeqCst) {
            return Err(KasumiError::Origin("connection refused".to_string()));
        }
        let canned = self.response.lock().clone();

        let headers: HeaderList = canned.headers.into_iter().collect();
        let bytes = canned.body.into_bytes();
        let mid = bytes.len() / 2;
        let chunks = vec![
            Ok(Bytes::copy_from_slice(&bytes[..mid])),
            Ok(Bytes::copy_from_slice(&bytes[mid..])),
        ];
        Ok(EngineResponse::new(
            canned.status,
            headers,
            ResponseBody::Stream(futures::stream::iter(chunks).boxed()),
        ))
    }
}

/// Asset prober double: everything exists unless marked missing
#[derive(Default)]
pub struct MockProber {
    missing: Mutex<HashSet<String>>,
    probes: AtomicUsize,
}

impl MockProber {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn mark_missing(&self, url: &str) {
        self.missing.lock().insert(url.to_string());
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssetProber for MockProber {
    async fn exists(&self, url: &Url) -> Result<bool, KasumiError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        Ok(!self.missing.lock().contains(url.as_str()))
    }
}

/// Plugin double: appends `X-Edge-Stamp: <name>` to origin requests and,
/// when `answer_path` matches, answers the request itself with a 204
pub struct StampPlugin {
    name: &'static str,
    answer_path: Option<&'static str>,
    on_request_calls: AtomicUsize,
}

impl StampPlugin {
    pub fn new(name: &'static str) -> Arc<Self> {
        Self::answering(name, None)
    }

    pub fn answering(name: &'static str, answer_path: Option<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            name,
            answer_path,
            on_request_calls: AtomicUsize::new(0),
        })
    }

    pub fn on_request_calls(&self) -> usize {
        self.on_request_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Plugin for StampPlugin {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn on_request(&self, ctx: &RequestContext) -> Option<EngineResponse> {
        self.on_request_calls.fetch_add(1, Ordering::SeqCst);
        if self.answer_path != Some(ctx.path.as_str()) {
            return None;
        }
        let headers: HeaderList = [("X-Answered-By", self.name)].into_iter().collect();
        Some(EngineResponse::new(204, headers, ResponseBody::Full(Bytes::new())))
    }

    fn transform_origin_request(&self, _ctx: &RequestContext, mut request: OriginRequest) -> OriginRequest {
        request.headers.append("X-Edge-Stamp", self.name);
        request
    }
}

/// KvStore wrapper counting `list` calls
pub struct CountingStore {
    inner: MemoryStore,
    pub list_calls: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::default(),
            list_calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl KvStore for CountingStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        self.inner.put(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete(key).await
    }

    async fn list(&self, cursor: Option<&str>, limit: usize) -> Result<ListPage, StoreError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.list(cursor, limit).await
    }
}

pub fn build_engine(config: Config, origin: Arc<MockOrigin>, kv: Arc<dyn KvStore>) -> CacheEngine {
    build_engine_with_prober(config, origin, kv, MockProber::new())
}

pub fn build_engine_with_prober(
    config: Config,
    origin: Arc<MockOrigin>,
    kv: Arc<dyn KvStore>,
    prober: Arc<MockProber>,
) -> CacheEngine {
    CacheEngine::new(config, kv, origin, prober).expect("engine should build")
}

pub fn memory_store() -> Arc<dyn KvStore> {
    Arc::new(MemoryStore::default())
}

pub fn get(url: &str) -> IncomingRequest {
    IncomingRequest::new("GET", Url::parse(url).expect("valid test url"))
}

pub fn head(url: &str) -> IncomingRequest {
    IncomingRequest::new("HEAD", Url::parse(url).expect("valid test url"))
}

pub async fn body_string(response: EngineResponse) -> String {
    let bytes = response.body.collect().await.expect("body should collect");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

/// A cache-variant record with deadlines relative to now (milliseconds)
pub fn record(body: &str, expires_in_ms: i64, stale_for_ms: u64, headers: &[(&str, &str)]) -> CacheRecord {
    let now = now_millis() as i64;
    let expires = (now + expires_in_ms) as u64;
    let headers: BTreeMap<String, String> = headers
        .iter()
        .map(|(n, v)| (n.to_string(), v.to_string()))
        .collect();
    CacheRecord::Cache(kasumi::cache::CachedResponse {
        status: 200,
        status_text: "OK".to_string(),
        headers,
        body: body.to_string(),
        expires,
        stale_until: expires + stale_for_ms,
    })
}
