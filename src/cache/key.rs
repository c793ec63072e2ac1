//! Cache key derivation.
//!
//! Key layout, in order:
//!
//! ```text
//! <namespace><host><path>[?<sorted query>]
//!   ( ::graphql:<id>[:authorized] | ::vary:<cookie values> )
//!   [::vh:<name=value>_...] [::device:<class>] [::ssl:<marker>]
//!   [::store:<store>] [::currency:<currency>]      (GraphQL only)
//! ```
//!
//! The GraphQL identity and the cookie vary segment are mutually exclusive:
//! the origin-computed identity already summarizes what varies the response.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::Config;
use crate::pipeline::normalize::render_pair;
use crate::pipeline::RequestContext;

/// Device class for cache variance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Mobile,
    Tablet,
    Desktop,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Mobile => "mobile",
            DeviceClass::Tablet => "tablet",
            DeviceClass::Desktop => "desktop",
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct CacheKeyDeriver {
    namespace: String,
    vary_cookies: Vec<String>,
    vary_headers: Vec<String>,
    device_enabled: bool,
}

impl CacheKeyDeriver {
    pub fn new(config: &Config) -> Self {
        Self {
            namespace: config.cache.namespace.clone(),
            vary_cookies: config.cache.vary_cookies.clone(),
            vary_headers: config.cache.vary_headers.clone(),
            device_enabled: config.cache.device.enabled,
        }
    }

    /// Derive the key before any plugin transform
    pub fn derive(&self, ctx: &RequestContext) -> String {
        let mut key = format!("{}{}{}", self.namespace, ctx.host, ctx.path);

        if !ctx.query.is_empty() {
            let mut pairs: Vec<&(String, String)> = ctx.query.iter().collect();
            pairs.sort();
            let query = pairs
                .iter()
                .map(|(name, value)| render_pair(name, value))
                .collect::<Vec<_>>()
                .join("&");
            key.push('?');
            key.push_str(&query);
        }

        match (ctx.is_graphql, ctx.graphql_cache_id.as_deref()) {
            (true, Some(identity)) => {
                key.push_str("::graphql:");
                key.push_str(identity);
                if ctx.has_bearer {
                    key.push_str(":authorized");
                }
            }
            _ => {
                // Absent cookies contribute nothing, not even a separator
                let values: Vec<&str> = self
                    .vary_cookies
                    .iter()
                    .filter_map(|name| ctx.cookie(name))
                    .collect();
                if !values.is_empty() {
                    key.push_str("::vary:");
                    key.push_str(&values.join("_"));
                }
            }
        }

        let header_values: Vec<String> = self
            .vary_headers
            .iter()
            .filter_map(|name| {
                ctx.headers
                    .get(name)
                    .filter(|v| !v.is_empty())
                    .map(|v| format!("{}={}", name, v))
            })
            .collect();
        if !header_values.is_empty() {
            key.push_str("::vh:");
            key.push_str(&header_values.join("_"));
        }

        if self.device_enabled {
            key.push_str("::device:");
            key.push_str(ctx.device.as_str());
        }

        if let Some(marker) = &ctx.ssl_offload {
            key.push_str("::ssl:");
            key.push_str(marker);
        }

        if ctx.is_graphql {
            if let Some(store) = &ctx.store {
                key.push_str("::store:");
                key.push_str(store);
            }
            if let Some(currency) = &ctx.currency {
                key.push_str("::currency:");
                key.push_str(currency);
            }
        }

        key
    }
}
