// Origin module - upstream fetch, cacheability decision and streaming tee

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::time::Duration;
use url::Url;

use crate::config::OriginConfig;
use crate::error::KasumiError;
use crate::headers::HeaderList;
use crate::response::{default_status_text, EngineResponse, ResponseBody};

pub mod cacheability;
pub mod request;
pub mod tee;

pub use cacheability::{FetchResult, SkipReason};
pub use request::build_origin_request;

/// Request sent upstream
#[derive(Debug, Clone)]
pub struct OriginRequest {
    pub method: String,
    pub url: Url,
    pub headers: HeaderList,
    pub body: Bytes,
}

/// Upstream response; the body is always a stream as received
pub type OriginResponse = EngineResponse;

/// Upstream HTTP transport
#[async_trait]
pub trait Origin: Send + Sync {
    async fn fetch(&self, request: OriginRequest) -> Result<OriginResponse, KasumiError>;
}

/// reqwest-backed origin client. Redirects are returned to the client
/// untouched; compressed bodies are decoded so text can be stored.
pub struct HttpOrigin {
    client: reqwest::Client,
}

impl HttpOrigin {
    pub fn new(config: &OriginConfig) -> Result<Self, KasumiError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .redirect(reqwest::redirect::Policy::none())
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| KasumiError::Config(format!("Failed to build origin client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Origin for HttpOrigin {
    async fn fetch(&self, request: OriginRequest) -> Result<OriginResponse, KasumiError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| KasumiError::InvalidRequest(format!("bad method {}", request.method)))?;

        let mut builder = self.client.request(method, request.url.as_str());
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.to_vec());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| KasumiError::Origin(e.to_string()))?;

        let status = response.status().as_u16();
        let status_text = response
            .status()
            .canonical_reason()
            .unwrap_or_else(|| default_status_text(status))
            .to_string();
        let headers: HeaderList = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| KasumiError::Origin(e.to_string())))
            .boxed();

        Ok(EngineResponse {
            status,
            status_text,
            headers,
            body: ResponseBody::Stream(body),
        })
    }
}
