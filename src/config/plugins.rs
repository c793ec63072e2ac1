//! Extension pipeline configuration.
//!
//! Each plugin in the static registry has its own section; a plugin absent
//! from the file is disabled.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{DEFAULT_ASSET_PROBE_TIMEOUT_MS, DEFAULT_ASSET_PROBE_TTL_SECONDS};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToggleConfig {
    #[serde(default)]
    pub enabled: bool,
}

fn default_stylesheet_pattern() -> String {
    r#"(?:https?://[^"'\s<>]+)?/static/(?:version\d+/)?[^"'\s<>]*_cache/merged/[0-9a-f]+(?:\.min)?\.css"#
        .to_string()
}

fn default_probe_ttl_seconds() -> u64 {
    DEFAULT_ASSET_PROBE_TTL_SECONDS
}

fn default_probe_timeout_ms() -> u64 {
    DEFAULT_ASSET_PROBE_TIMEOUT_MS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetGuardConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Regex matching build-versioned merged stylesheet links in HTML
    #[serde(default = "default_stylesheet_pattern")]
    pub stylesheet_pattern: String,

    /// How long a probe result is memoized (default: 300s)
    #[serde(default = "default_probe_ttl_seconds")]
    pub probe_ttl_seconds: u64,

    /// HEAD probe timeout in milliseconds (default: 2000)
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

impl Default for AssetGuardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            stylesheet_pattern: default_stylesheet_pattern(),
            probe_ttl_seconds: default_probe_ttl_seconds(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl AssetGuardConfig {
    pub fn probe_ttl(&self) -> Duration {
        Duration::from_secs(self.probe_ttl_seconds)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PluginsConfig {
    #[serde(default)]
    pub debug_headers: ToggleConfig,
    #[serde(default)]
    pub asset_links: ToggleConfig,
    #[serde(default)]
    pub asset_guard: AssetGuardConfig,
}
