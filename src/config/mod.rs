// Configuration module

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::cache::{CacheConfig, StoreConfig};

pub mod origin;
pub mod plugins;
pub mod purge;
pub mod request;
pub mod server;

pub use origin::OriginConfig;
pub use plugins::{AssetGuardConfig, PluginsConfig, ToggleConfig};
pub use purge::PurgeConfig;
pub use request::RequestConfig;
pub use server::ServerConfig;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub origin: OriginConfig,
    #[serde(default)]
    pub request: RequestConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub purge: PurgeConfig,
    #[serde(default)]
    pub plugins: PluginsConfig,
}

impl Config {
    pub fn from_yaml_with_env(yaml: &str) -> Result<Self, String> {
        // Replace ${VAR_NAME} with environment variable values
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").map_err(|e| e.to_string())?;

        // First, check that all referenced environment variables exist
        for caps in re.captures_iter(yaml) {
            let var_name = &caps[1];
            std::env::var(var_name).map_err(|_| {
                format!(
                    "Environment variable '{}' is referenced but not set",
                    var_name
                )
            })?;
        }

        let substituted = re.replace_all(yaml, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        });

        serde_yaml::from_str(&substituted).map_err(|e| e.to_string())
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        Self::from_yaml_with_env(&yaml)
    }

    pub fn validate(&self) -> Result<(), String> {
        self.origin.validate()?;
        self.request.validate()?;
        self.cache.validate()?;
        self.store.validate()?;
        self.purge.validate()?;

        // Patterns are compiled here once so a bad regex fails at startup
        self.compile().map(|_| ())
    }

    /// Compile every configured pattern. Done once at startup; requests
    /// only ever see the compiled form.
    pub fn compile(&self) -> Result<CompiledPatterns, String> {
        let compile = |field: &str, pattern: &str| {
            Regex::new(pattern).map_err(|e| format!("{} is not a valid regex: {}", field, e))
        };

        Ok(CompiledPatterns {
            marketing_params: self
                .request
                .marketing_params
                .iter()
                .map(|p| ParamPattern::parse(p))
                .collect(),
            static_asset: compile("request.static_pattern", &self.request.static_pattern)?,
            health_check: compile("request.health_pattern", &self.request.health_pattern)?,
            mobile: compile("cache.device.mobile_pattern", &self.cache.device.mobile_pattern)?,
            tablet: compile("cache.device.tablet_pattern", &self.cache.device.tablet_pattern)?,
            stylesheet: compile(
                "plugins.asset_guard.stylesheet_pattern",
                &self.plugins.asset_guard.stylesheet_pattern,
            )?,
        })
    }
}

/// A marketing parameter matcher: exact name, or `prefix*` matched
/// case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamPattern {
    Exact(String),
    Prefix(String),
}

impl ParamPattern {
    pub fn parse(pattern: &str) -> Self {
        match pattern.strip_suffix('*') {
            Some(prefix) => ParamPattern::Prefix(prefix.to_ascii_lowercase()),
            None => ParamPattern::Exact(pattern.to_string()),
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            ParamPattern::Exact(exact) => name == exact,
            ParamPattern::Prefix(prefix) => name.to_ascii_lowercase().starts_with(prefix.as_str()),
        }
    }
}

/// Regexes and matchers compiled from `Config`
#[derive(Debug, Clone)]
pub struct CompiledPatterns {
    pub marketing_params: Vec<ParamPattern>,
    pub static_asset: Regex,
    pub health_check: Regex,
    pub mobile: Regex,
    pub tablet: Regex,
    pub stylesheet: Regex,
}

impl CompiledPatterns {
    pub fn is_marketing_param(&self, name: &str) -> bool {
        self.marketing_params.iter().any(|p| p.matches(name))
    }
}
