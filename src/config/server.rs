//! Server configuration types.
//!
//! This module defines the listener-level configuration:
//! - Address and port bindings
//! - Worker thread count
//! - Request body buffering limit
//! - Path of the Prometheus text export
//!
//! Default values are sourced from `crate::constants`.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_MAX_BODY_BYTES, DEFAULT_METRICS_PATH, DEFAULT_THREADS};

fn default_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

// Default worker thread count
fn default_threads() -> usize {
    DEFAULT_THREADS
}

fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

fn default_metrics_path() -> String {
    DEFAULT_METRICS_PATH.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Number of worker threads (default: 4)
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Largest request body read into memory before forwarding (default: 2 MB)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Path answering with the Prometheus text export
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            threads: default_threads(),
            max_body_bytes: default_max_body_bytes(),
            metrics_path: default_metrics_path(),
        }
    }
}

impl ServerConfig {
    /// Socket address the listener binds to
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}
