//! Cache-Control / Surrogate-Control parsing for the cacheability pipeline.
//!
//! Only the directives the decision engine branches on are kept:
//! - `private`: never stored (cacheability check 1)
//! - `no-store` / `no-cache`: hit-for-pass when the respect mode is enabled
//! - `s-maxage` / `max-age`: TTL source when Cache-Control is respected
//!
//! # Example
//!
//! ```rust
//! use kasumi::cache::CacheControl;
//! use std::time::Duration;
//!
//! let cc = CacheControl::parse("public, s-maxage=600, max-age=60");
//! assert_eq!(cc.effective_ttl(Duration::from_secs(30)), Duration::from_secs(600));
//! assert!(!cc.private);
//! ```

use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl {
    /// max-age directive
    pub max_age: Option<Duration>,

    /// s-maxage directive, preferred over max-age for a shared cache
    pub s_maxage: Option<Duration>,

    pub no_store: bool,

    pub no_cache: bool,

    pub private: bool,
}

impl CacheControl {
    /// Parse a directive list. Unknown directives and unparseable values are
    /// ignored; a negative age parses as absent.
    pub fn parse(header_value: &str) -> Self {
        let mut result = Self::default();

        for directive in header_value.split(',') {
            let directive = directive.trim().to_lowercase();
            if directive.is_empty() {
                continue;
            }

            if let Some((name, value)) = directive.split_once('=') {
                let value = value.trim().trim_matches('"');
                match name.trim() {
                    "max-age" => result.max_age = parse_seconds(value),
                    "s-maxage" => result.s_maxage = parse_seconds(value),
                    _ => {}
                }
            } else {
                match directive.as_str() {
                    "no-store" => result.no_store = true,
                    "no-cache" => result.no_cache = true,
                    "private" => result.private = true,
                    _ => {}
                }
            }
        }

        result
    }

    /// Merge another header's directives into this one (Surrogate-Control
    /// layered over Cache-Control). Flags are OR-ed, ages from `other` win.
    pub fn merge(mut self, other: &CacheControl) -> Self {
        self.no_store |= other.no_store;
        self.no_cache |= other.no_cache;
        self.private |= other.private;
        if other.max_age.is_some() {
            self.max_age = other.max_age;
        }
        if other.s_maxage.is_some() {
            self.s_maxage = other.s_maxage;
        }
        self
    }

    /// `no-store` or `no-cache`
    pub fn forbids_storage(&self) -> bool {
        self.no_store || self.no_cache
    }

    /// TTL for a shared cache: s-maxage, then max-age. A missing or zero
    /// value falls back to `default_ttl`.
    pub fn effective_ttl(&self, default_ttl: Duration) -> Duration {
        match self.s_maxage.or(self.max_age) {
            Some(ttl) if !ttl.is_zero() => ttl,
            _ => default_ttl,
        }
    }
}

fn parse_seconds(value: &str) -> Option<Duration> {
    value.parse::<u64>().ok().map(Duration::from_secs)
}
