//! Runtime configuration
//!
//! Defaults applied when a declaration leaves a setting open. Read from
//! `CONTRACT_RUNTIME_*` environment variables or assembled with
//! `RuntimeConfig::builder()`.

use crate::arguments::UnknownKeyPolicy;
use crate::schema::ValidationMode;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "CONTRACT_RUNTIME_";

/// Runtime defaults for built contracts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Validation mode for arguments and outputs
    pub validation_mode: ValidationMode,

    /// Handling of undeclared argument keys
    pub unknown_keys: UnknownKeyPolicy,

    /// Deadline for contracts that do not declare one (0 disables)
    pub default_timeout_ms: u64,

    /// Cache entry lifetime for policies without a TTL (0 means never expire)
    pub cache_ttl_ms: u64,

    /// Stale cache entries tolerated before eviction runs
    pub cache_gc_buffer: usize,

    /// Record Prometheus metrics for contracts built with a metrics handle
    pub metrics: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            validation_mode: ValidationMode::Lenient,
            unknown_keys: UnknownKeyPolicy::Warn,
            default_timeout_ms: 0,
            cache_ttl_ms: 0,
            cache_gc_buffer: 10,
            metrics: true,
        }
    }
}

impl RuntimeConfig {
    /// Create a new config builder
    pub fn builder() -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::new()
    }

    /// Create config from environment variables
    ///
    /// Unset or unparsable variables fall back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create config from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |suffix: &str| lookup(&format!("{}{}", ENV_PREFIX, suffix));

        Self {
            validation_mode: var("VALIDATION_MODE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.validation_mode),
            unknown_keys: var("UNKNOWN_KEYS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.unknown_keys),
            default_timeout_ms: var("TIMEOUT_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.default_timeout_ms),
            cache_ttl_ms: var("CACHE_TTL_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.cache_ttl_ms),
            cache_gc_buffer: var("CACHE_GC_BUFFER")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.cache_gc_buffer),
            metrics: var("METRICS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.metrics),
        }
    }
}

/// Builder for RuntimeConfig
pub struct RuntimeConfigBuilder {
    config: RuntimeConfig,
}

impl RuntimeConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
        }
    }

    pub fn validation_mode(mut self, mode: ValidationMode) -> Self {
        self.config.validation_mode = mode;
        self
    }

    /// Shorthand for strict validation
    pub fn strict(self) -> Self {
        self.validation_mode(ValidationMode::Strict)
    }

    pub fn unknown_keys(mut self, policy: UnknownKeyPolicy) -> Self {
        self.config.unknown_keys = policy;
        self
    }

    pub fn default_timeout_ms(mut self, timeout: u64) -> Self {
        self.config.default_timeout_ms = timeout;
        self
    }

    /// Set the cache TTL and eviction buffer
    pub fn with_cache(mut self, ttl_ms: u64, gc_buffer: usize) -> Self {
        self.config.cache_ttl_ms = ttl_ms;
        self.config.cache_gc_buffer = gc_buffer;
        self
    }

    pub fn metrics(mut self, enabled: bool) -> Self {
        self.config.metrics = enabled;
        self
    }

    /// Build the configuration
    pub fn build(self) -> RuntimeConfig {
        self.config
    }
}

impl Default for RuntimeConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();
        assert_eq!(config.validation_mode, ValidationMode::Lenient);
        assert_eq!(config.unknown_keys, UnknownKeyPolicy::Warn);
        assert_eq!(config.default_timeout_ms, 0);
        assert_eq!(config.cache_gc_buffer, 10);
        assert!(config.metrics);
    }

    #[test]
    fn test_config_builder() {
        let config = RuntimeConfig::builder()
            .strict()
            .unknown_keys(UnknownKeyPolicy::Reject)
            .default_timeout_ms(250)
            .with_cache(60_000, 3)
            .metrics(false)
            .build();

        assert_eq!(config.validation_mode, ValidationMode::Strict);
        assert_eq!(config.unknown_keys, UnknownKeyPolicy::Reject);
        assert_eq!(config.default_timeout_ms, 250);
        assert_eq!(config.cache_ttl_ms, 60_000);
        assert_eq!(config.cache_gc_buffer, 3);
        assert!(!config.metrics);
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<String, String> = [
            ("CONTRACT_RUNTIME_VALIDATION_MODE", "strict"),
            ("CONTRACT_RUNTIME_UNKNOWN_KEYS", "reject"),
            ("CONTRACT_RUNTIME_TIMEOUT_MS", "1500"),
            ("CONTRACT_RUNTIME_CACHE_GC_BUFFER", "not-a-number"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config = RuntimeConfig::from_lookup(|name| vars.get(name).cloned());
        assert_eq!(config.validation_mode, ValidationMode::Strict);
        assert_eq!(config.unknown_keys, UnknownKeyPolicy::Reject);
        assert_eq!(config.default_timeout_ms, 1500);
        assert_eq!(config.cache_gc_buffer, 10);
    }
}
