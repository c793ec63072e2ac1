// Proxy module - Pingora ProxyHttp implementation
//
// Every request is answered inside request_filter by the cache engine;
// Pingora's own upstream path is never taken. The origin is reached through
// the engine's HTTP client so responses can be inspected and stored.

use async_trait::async_trait;
use futures::StreamExt;
use pingora_core::server::ShutdownWatch;
use pingora_core::services::background::BackgroundService;
use pingora_core::upstreams::peer::HttpPeer;
use pingora_core::Result;
use pingora_http::ResponseHeader;
use pingora_proxy::{ProxyHttp, Session};
use std::sync::Arc;
use std::time::Instant;
use url::Url;

use crate::config::Config;
use crate::constants::CACHE_STATUS_HEADER;
use crate::engine::{BackgroundTasks, CacheEngine};
use crate::headers::HeaderList;
use crate::metrics::KasumiMetrics;
use crate::pipeline::IncomingRequest;
use crate::response::{EngineResponse, ResponseBody, HOP_BY_HOP_HEADERS};

/// Per-request state kept for the logging hook
pub struct ProxyContext {
    started: Instant,
}

pub struct KasumiProxy {
    engine: Arc<CacheEngine>,
    config: Arc<Config>,
}

impl KasumiProxy {
    pub fn new(engine: Arc<CacheEngine>) -> Self {
        let config = Arc::new(engine.config().clone());
        Self { engine, config }
    }

    /// Convert the Pingora request into the engine's request type. On
    /// failure, the response to send instead.
    async fn incoming_request(&self, session: &mut Session) -> std::result::Result<IncomingRequest, EngineResponse> {
        let req = session.req_header();
        let method = req.method.as_str().to_string();

        let headers: HeaderList = req
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let host = req
            .uri
            .authority()
            .map(|a| a.as_str().to_string())
            .or_else(|| headers.get("host").map(str::to_string))
            .ok_or_else(|| error_response(400, "missing Host header"))?;
        let path_and_query = req
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());
        let scheme = client_scheme(&headers, &self.config.request.ssl_offload_headers);
        let url = build_url(scheme, &host, &path_and_query)
            .ok_or_else(|| error_response(400, "unparseable request URL"))?;

        let body = self.read_body(session).await?;

        Ok(IncomingRequest {
            method,
            url,
            headers,
            body,
        })
    }

    async fn read_body(&self, session: &mut Session) -> std::result::Result<bytes::Bytes, EngineResponse> {
        let limit = self.config.server.max_body_bytes;
        let mut body = Vec::new();
        loop {
            match session.read_request_body().await {
                Ok(Some(chunk)) => {
                    if body.len() + chunk.len() > limit {
                        return Err(error_response(413, "request body too large"));
                    }
                    body.extend_from_slice(&chunk);
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read request body");
                    return Err(error_response(400, "unreadable request body"));
                }
            }
        }
        Ok(body.into())
    }
}

#[async_trait]
impl ProxyHttp for KasumiProxy {
    type CTX = ProxyContext;

    fn new_ctx(&self) -> Self::CTX {
        ProxyContext {
            started: Instant::now(),
        }
    }

    /// Never reached: request_filter always answers
    async fn upstream_peer(&self, _session: &mut Session, _ctx: &mut Self::CTX) -> Result<Box<HttpPeer>> {
        Err(pingora_core::Error::explain(
            pingora_core::ErrorType::InternalError,
            "kasumi answers every request in request_filter",
        ))
    }

    async fn request_filter(&self, session: &mut Session, _ctx: &mut Self::CTX) -> Result<bool> {
        let req = session.req_header();
        if req.method == http::Method::GET && req.uri.path() == self.config.server.metrics_path {
            let mut header = ResponseHeader::build(200, None)?;
            header.insert_header("Content-Type", "text/plain; version=0.0.4")?;
            let body = KasumiMetrics::global().render();
            header.insert_header("Content-Length", body.len().to_string())?;
            session.write_response_header(Box::new(header), false).await?;
            session.write_response_body(Some(body.into()), true).await?;
            return Ok(true);
        }

        let response = match self.incoming_request(session).await {
            Ok(request) => self.engine.handle(request).await,
            Err(response) => response,
        };
        write_response(session, response).await?;
        Ok(true)
    }

    async fn logging(&self, session: &mut Session, _e: Option<&pingora_core::Error>, ctx: &mut Self::CTX) {
        let req = session.req_header();
        let (status, cache_status) = match session.response_written() {
            Some(resp) => (
                resp.status.as_u16(),
                resp.headers
                    .get(CACHE_STATUS_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-")
                    .to_string(),
            ),
            None => (500, "-".to_string()),
        };
        tracing::info!(
            method = %req.method,
            path = %req.uri.path(),
            status,
            cache_status = %cache_status,
            duration_ms = ctx.started.elapsed().as_millis() as u64,
            "Request completed"
        );
    }
}

async fn write_response(session: &mut Session, response: EngineResponse) -> Result<()> {
    let header = response_header(&response)?;

    match response.body {
        ResponseBody::Full(bytes) => {
            let empty = bytes.is_empty();
            session.write_response_header(Box::new(header), empty).await?;
            if !empty {
                session.write_response_body(Some(bytes), true).await?;
            }
        }
        ResponseBody::HeadersOnly(_) => {
            session.write_response_header(Box::new(header), true).await?;
        }
        ResponseBody::Stream(mut stream) => {
            session.write_response_header(Box::new(header), false).await?;
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(bytes) => session.write_response_body(Some(bytes), false).await?,
                    Err(e) => {
                        // Headers are already out; all we can do is end early
                        tracing::warn!(error = %e, "Origin body failed mid-stream");
                        break;
                    }
                }
            }
            session.write_response_body(None, true).await?;
        }
    }
    Ok(())
}

/// Response head with framing set by us: upstream connection headers are
/// dropped, then the body decides Content-Length or chunked encoding
fn response_header(response: &EngineResponse) -> Result<ResponseHeader> {
    let mut header = ResponseHeader::build(response.status, None)?;
    for (name, value) in response.headers.iter() {
        if HOP_BY_HOP_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name)) {
            continue;
        }
        header.append_header(name.to_string(), value)?;
    }

    match &response.body {
        ResponseBody::Full(bytes) => {
            header.insert_header("Content-Length", bytes.len().to_string())?;
        }
        ResponseBody::HeadersOnly(Some(length)) => {
            header.insert_header("Content-Length", length.to_string())?;
        }
        ResponseBody::HeadersOnly(None) => {}
        ResponseBody::Stream(_) => {
            header.insert_header("Transfer-Encoding", "chunked")?;
        }
    }
    Ok(header)
}

fn error_response(status: u16, message: &str) -> EngineResponse {
    let mut headers = HeaderList::new();
    headers.insert("Content-Type", "text/plain; charset=utf-8");
    EngineResponse::new(status, headers, ResponseBody::Full(message.to_string().into()))
}

/// `https` when the first SSL-offload header present says so
fn client_scheme(headers: &HeaderList, offload_headers: &[String]) -> &'static str {
    let marker = offload_headers.iter().find_map(|name| headers.get(name));
    match marker.map(|v| v.trim().to_ascii_lowercase()) {
        Some(v) if v == "https" || v == "on" || v == "1" || v == "true" => "https",
        _ => "http",
    }
}

fn build_url(scheme: &str, host: &str, path_and_query: &str) -> Option<Url> {
    Url::parse(&format!("{}://{}{}", scheme, host, path_and_query)).ok()
}

/// Waits for the engine's detached tasks when the server shuts down
pub struct TaskDrainService {
    tasks: Arc<BackgroundTasks>,
}

impl TaskDrainService {
    pub fn new(tasks: Arc<BackgroundTasks>) -> Self {
        Self { tasks }
    }
}

#[async_trait]
impl BackgroundService for TaskDrainService {
    async fn start(&self, mut shutdown: ShutdownWatch) {
        let _ = shutdown.changed().await;
        let pending = self.tasks.len();
        tracing::info!(pending, "Draining background tasks before shutdown");
        self.tasks.drain().await;
    }
}
