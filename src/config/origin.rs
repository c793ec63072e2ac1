//! Origin (backend) configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{DEFAULT_ORIGIN_CONNECT_TIMEOUT_MS, DEFAULT_ORIGIN_TIMEOUT_MS};

fn default_timeout_ms() -> u64 {
    DEFAULT_ORIGIN_TIMEOUT_MS
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_ORIGIN_CONNECT_TIMEOUT_MS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginConfig {
    /// Backend base URL (`scheme://host[:port]`) used when the edge host
    /// differs from the backend host. When unset, the normalized request
    /// URL is fetched as-is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_url: Option<String>,

    /// Rewrite the Host header to the override host (dev-like deployments).
    /// Otherwise the client's Host header is preserved for virtual hosting.
    #[serde(default)]
    pub rewrite_host_header: bool,

    /// Total origin fetch timeout in milliseconds (default: 15000)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Connect timeout in milliseconds (default: 3000)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            override_url: None,
            rewrite_host_header: false,
            timeout_ms: default_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl OriginConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Parsed override base URL; `None` when unset (or invalid, which
    /// `validate` rejects at startup)
    pub fn override_base(&self) -> Option<url::Url> {
        self.override_url
            .as_deref()
            .and_then(|u| url::Url::parse(u).ok())
    }

    /// Validate origin configuration
    pub fn validate(&self) -> Result<(), String> {
        if let Some(url) = &self.override_url {
            let parsed = url::Url::parse(url)
                .map_err(|e| format!("origin.override_url '{}' is not a valid URL: {}", url, e))?;
            if parsed.host_str().is_none() {
                return Err(format!("origin.override_url '{}' has no host", url));
            }
        }
        if self.timeout_ms == 0 {
            return Err("origin.timeout_ms must be greater than 0".to_string());
        }
        Ok(())
    }
}
