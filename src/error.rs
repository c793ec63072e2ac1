// Error types module

use thiserror::Error;

use crate::cache::StoreError;

/// Centralized error type for the cache engine
///
/// None of these are fatal to the process: callers degrade to serving
/// uncached content or skipping the optimization that failed.
#[derive(Error, Debug)]
pub enum KasumiError {
    /// Configuration errors (invalid YAML, missing env vars, bad patterns)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Record store failures (unavailable backend, undecodable value)
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Origin transport failures (connect, timeout, body read)
    #[error("Origin error: {0}")]
    Origin(String),

    /// The inbound request cannot be interpreted (unparseable URL, bad purge body)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// JSON encoding/decoding failures
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl KasumiError {
    /// HTTP status used when this error has to be surfaced to a client
    pub fn http_status(&self) -> u16 {
        match self {
            KasumiError::InvalidRequest(_) => 400,
            KasumiError::Origin(_) => 502,
            KasumiError::Config(_) | KasumiError::Store(_) | KasumiError::Serialization(_) => 500,
        }
    }
}
