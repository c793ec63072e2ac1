//! Purge endpoint configuration.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_PURGE_PAGE_SIZE, DEFAULT_PURGE_PATH, DEFAULT_PURGE_SECRET_HEADER};

fn default_secret_header() -> String {
    DEFAULT_PURGE_SECRET_HEADER.to_string()
}

fn default_path() -> String {
    DEFAULT_PURGE_PATH.to_string()
}

fn default_list_page_size() -> usize {
    DEFAULT_PURGE_PAGE_SIZE
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurgeConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Shared secret expected in `secret_header`
    #[serde(default)]
    pub secret: String,

    /// Header carrying the shared secret (default: X-Purge-Secret)
    #[serde(default = "default_secret_header")]
    pub secret_header: String,

    /// POSTs to this path are always purge requests (default: /__kasumi/purge)
    #[serde(default = "default_path")]
    pub path: String,

    /// Keys requested per list call during a full sweep (default: 1000)
    #[serde(default = "default_list_page_size")]
    pub list_page_size: usize,
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            secret: String::new(),
            secret_header: default_secret_header(),
            path: default_path(),
            list_page_size: default_list_page_size(),
        }
    }
}

impl PurgeConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.enabled {
            return Ok(());
        }
        if self.secret.is_empty() {
            return Err("purge.secret cannot be empty when purge is enabled".to_string());
        }
        if self.secret_header.is_empty() {
            return Err("purge.secret_header cannot be empty".to_string());
        }
        if self.list_page_size == 0 {
            return Err("purge.list_page_size must be greater than 0".to_string());
        }
        Ok(())
    }
}
