//! Request classification configuration.
//!
//! Controls how the normalizer canonicalizes URLs and classifies requests
//! (static asset, health check, GraphQL) and which paths are never cached.

use serde::{Deserialize, Serialize};

fn default_marketing_params() -> Vec<String> {
    [
        "gclid", "gclsrc", "gbraid", "wbraid", "dclid", "fbclid", "msclkid", "mc_cid",
        "mc_eid", "_ga", "_gl", "_ke", "srsltid", "utm_*",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_static_pattern() -> String {
    r"(?i)^/(pub/)?(static|media)/|\.(css|js|mjs|map|png|jpe?g|gif|svg|webp|avif|ico|woff2?|ttf|eot|otf|mp4|webm|pdf|zip)$"
        .to_string()
}

fn default_health_pattern() -> String {
    r"^/(health_check\.php|health|healthz)$".to_string()
}

fn default_graphql_path() -> String {
    "/graphql".to_string()
}

fn default_graphql_cache_id_header() -> String {
    "X-Magento-Cache-Id".to_string()
}

fn default_store_header() -> String {
    "Store".to_string()
}

fn default_currency_header() -> String {
    "Content-Currency".to_string()
}

fn default_ssl_offload_headers() -> Vec<String> {
    vec!["X-Forwarded-Proto".to_string(), "Ssl-Offloaded".to_string()]
}

fn default_excluded_paths() -> Vec<String> {
    [
        "/admin", "/checkout", "/customer", "/cart", "/wishlist", "/paypal/", "/rest/",
        "/api/", "/sales/", "/newsletter/",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Query parameters stripped before caching. A trailing `*` matches by
    /// case-insensitive prefix; anything else is an exact name.
    #[serde(default = "default_marketing_params")]
    pub marketing_params: Vec<String>,

    /// Regex classifying static-asset paths (never cached, never get cookies)
    #[serde(default = "default_static_pattern")]
    pub static_pattern: String,

    /// Regex classifying health-check paths
    #[serde(default = "default_health_pattern")]
    pub health_pattern: String,

    /// Path prefix identifying GraphQL requests
    #[serde(default = "default_graphql_path")]
    pub graphql_path: String,

    /// Header carrying the origin-computed GraphQL cache identity
    #[serde(default = "default_graphql_cache_id_header")]
    pub graphql_cache_id_header: String,

    /// GraphQL store view header
    #[serde(default = "default_store_header")]
    pub store_header: String,

    /// GraphQL currency header
    #[serde(default = "default_currency_header")]
    pub currency_header: String,

    /// Proxy-set headers marking SSL offload, checked in order
    #[serde(default = "default_ssl_offload_headers")]
    pub ssl_offload_headers: Vec<String>,

    /// Substrings; any path containing one of them is never cached
    #[serde(default = "default_excluded_paths")]
    pub excluded_paths: Vec<String>,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            marketing_params: default_marketing_params(),
            static_pattern: default_static_pattern(),
            health_pattern: default_health_pattern(),
            graphql_path: default_graphql_path(),
            graphql_cache_id_header: default_graphql_cache_id_header(),
            store_header: default_store_header(),
            currency_header: default_currency_header(),
            ssl_offload_headers: default_ssl_offload_headers(),
            excluded_paths: default_excluded_paths(),
        }
    }
}

impl RequestConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.graphql_path.is_empty() || !self.graphql_path.starts_with('/') {
            return Err(format!(
                "request.graphql_path '{}' must start with /",
                self.graphql_path
            ));
        }
        if self.excluded_paths.iter().any(|p| p.is_empty()) {
            return Err("request.excluded_paths cannot contain an empty entry".to_string());
        }
        if self.marketing_params.iter().any(|p| p.is_empty() || p == "*") {
            return Err("request.marketing_params entries must name a parameter".to_string());
        }
        Ok(())
    }
}
