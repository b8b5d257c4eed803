//! Client configuration
//!
//! Loaded from TOML or built in code; every field has a serde default so
//! partial documents stay valid.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_cache_max_entries() -> usize {
    1024
}

fn default_max_generated_keys() -> usize {
    100_000
}

fn default_language() -> String {
    "en".to_string()
}

/// Metadata cache tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Entry lifetime in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,

    /// Bound on live entries before eviction
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
            max_entries: default_cache_max_entries(),
        }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Query-side limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuerySettings {
    /// Cap on locally generated keys when a backend lacks keys-only
    /// support and the Cartesian product must be enumerated
    #[serde(default = "default_max_generated_keys")]
    pub max_generated_keys: usize,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            max_generated_keys: default_max_generated_keys(),
        }
    }
}

/// Top-level client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub query: QuerySettings,

    /// Preferred localization for labels, part of the connection base
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            cache: CacheSettings::default(),
            query: QuerySettings::default(),
            language: default_language(),
        }
    }
}

impl ClientConfig {
    /// Parse a TOML configuration document
    pub fn from_toml_str(document: &str) -> Result<Self> {
        toml::from_str(document)
            .map_err(|error| Error::Configuration(format!("invalid configuration: {error}")))
    }

    /// Builder-style TTL override
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache.ttl_secs = ttl.as_secs();
        self
    }

    /// Builder-style key cap override
    pub fn with_max_generated_keys(mut self, limit: usize) -> Self {
        self.query.max_generated_keys = limit;
        self
    }

    /// Builder-style language override
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete() {
        let config = ClientConfig::default();
        assert_eq!(config.cache.ttl_secs, 300);
        assert_eq!(config.cache.max_entries, 1024);
        assert_eq!(config.query.max_generated_keys, 100_000);
        assert_eq!(config.language, "en");
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config = ClientConfig::from_toml_str(
            r#"
            language = "fr"

            [cache]
            ttl_secs = 60
            "#,
        )
        .unwrap();
        assert_eq!(config.language, "fr");
        assert_eq!(config.cache.ttl_secs, 60);
        assert_eq!(config.cache.max_entries, 1024);
        assert_eq!(config.query.max_generated_keys, 100_000);
    }

    #[test]
    fn empty_document_is_the_default() {
        let config = ClientConfig::from_toml_str("").unwrap();
        assert_eq!(config.cache.ttl_secs, ClientConfig::default().cache.ttl_secs);
    }

    #[test]
    fn malformed_toml_is_a_configuration_error() {
        let error = ClientConfig::from_toml_str("cache = 'not a table'").unwrap_err();
        assert!(matches!(error, Error::Configuration(_)));
    }
}
