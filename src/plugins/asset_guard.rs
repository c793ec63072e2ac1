//! Refuses to serve or store pages whose merged stylesheets are gone.
//!
//! After a deployment the build-versioned merged CSS files referenced by
//! cached pages disappear. For HTML bodies every matching stylesheet link is
//! probed with HEAD and must answer 200; probe results are memoized in the
//! key-value store under `<namespace>asset:<url>`. A failed probe counts as
//! missing.

use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::{CacheVerdict, Plugin, ResponseView};
use crate::cache::{CachedResponse, KvStore};
use crate::config::Config;
use crate::error::KasumiError;
use crate::headers::HeaderList;
use crate::metrics::KasumiMetrics;
use crate::pipeline::RequestContext;

/// Existence check for a single asset URL
#[async_trait]
pub trait AssetProber: Send + Sync {
    async fn exists(&self, url: &Url) -> Result<bool, KasumiError>;
}

/// HEAD-request prober
pub struct HttpAssetProber {
    client: reqwest::Client,
}

impl HttpAssetProber {
    pub fn new(timeout: Duration) -> Result<Self, KasumiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KasumiError::Config(format!("Failed to build asset probe client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl AssetProber for HttpAssetProber {
    async fn exists(&self, url: &Url) -> Result<bool, KasumiError> {
        let response = self
            .client
            .head(url.as_str())
            .send()
            .await
            .map_err(|e| KasumiError::Origin(e.to_string()))?;
        Ok(response.status() == reqwest::StatusCode::OK)
    }
}

pub struct AssetGuard {
    stylesheet: Regex,
    kv: Arc<dyn KvStore>,
    prober: Arc<dyn AssetProber>,
    key_prefix: String,
    probe_ttl: Duration,
    origin_base: Option<Url>,
}

impl AssetGuard {
    pub fn new(config: &Config, stylesheet: Regex, kv: Arc<dyn KvStore>, prober: Arc<dyn AssetProber>) -> Self {
        Self {
            stylesheet,
            kv,
            prober,
            key_prefix: format!("{}asset:", config.cache.namespace),
            probe_ttl: config.plugins.asset_guard.probe_ttl(),
            origin_base: config.origin.override_base(),
        }
    }

    /// True when every referenced stylesheet answered 200
    pub async fn assets_present(&self, ctx: &RequestContext, body: &str) -> bool {
        let links: BTreeSet<&str> = self.stylesheet.find_iter(body).map(|m| m.as_str()).collect();
        for link in links {
            let Some(url) = self.resolve(ctx, link) else {
                continue;
            };
            if !self.probe(&url).await {
                ctx.claim(format!("asset-missing:{}", url));
                return false;
            }
        }
        true
    }

    async fn probe(&self, url: &Url) -> bool {
        let key = format!("{}{}", self.key_prefix, url);
        match self.kv.get(&key).await {
            Ok(Some(memo)) => return memo == "1",
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(asset = %url, error = %e, "Asset probe memo read failed");
                KasumiMetrics::global().record_store_error("get");
            }
        }

        let present = match self.prober.exists(url).await {
            Ok(present) => present,
            Err(e) => {
                tracing::warn!(asset = %url, error = %e, "Asset probe failed; treating as missing");
                false
            }
        };

        let memo = if present { "1" } else { "0" };
        if let Err(e) = self.kv.put(&key, memo.to_string(), self.probe_ttl).await {
            tracing::warn!(asset = %url, error = %e, "Asset probe memo write failed");
            KasumiMetrics::global().record_store_error("put");
        }
        present
    }

    /// Relative links resolve against the backend when one is configured
    fn resolve(&self, ctx: &RequestContext, link: &str) -> Option<Url> {
        self.origin_base.as_ref().unwrap_or(&ctx.url).join(link).ok()
    }
}

fn is_html(headers: &HeaderList) -> bool {
    headers
        .get("content-type")
        .map(|ct| ct.to_ascii_lowercase().starts_with("text/html"))
        .unwrap_or(false)
}

#[async_trait]
impl Plugin for AssetGuard {
    fn name(&self) -> &'static str {
        "asset_guard"
    }

    async fn validate_cache_hit(&self, ctx: &RequestContext, cached: &CachedResponse) -> bool {
        if !is_html(&HeaderList::from(&cached.headers)) {
            return true;
        }
        self.assets_present(ctx, &cached.body).await
    }

    async fn should_cache(&self, ctx: &RequestContext, response: &ResponseView<'_>) -> CacheVerdict {
        if !is_html(response.headers) || self.assets_present(ctx, response.body).await {
            CacheVerdict::Cache
        } else {
            CacheVerdict::HitForPass
        }
    }
}
