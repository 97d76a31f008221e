//! Cache collaborator interface
//!
//! The runtime never owns cached data. It talks to a pluggable store through
//! `CacheStore`, keyed by `<contract identity>:<argument hash>`. Entries are
//! immutable; stores only ever create and destroy them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Errors that can occur when talking to a cache store
#[derive(Error, Debug)]
pub enum CacheError {
    /// The store is not reachable or not configured
    #[error("Cache store not available: {0}")]
    Unavailable(String),

    /// The store rejected or failed the operation
    #[error("Cache store error: {0}")]
    Backend(String),

    /// A stored payload could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Timeout talking to the store
    #[error("Timeout: {0}")]
    Timeout(String),
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// One memoized outcome payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// `<contract identity>:<argument hash>`
    pub key: String,
    /// Payload of the cacheable outcome
    pub payload: Value,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Create an entry stamped with the current time
    pub fn new(key: impl Into<String>, payload: Value) -> Self {
        Self {
            key: key.into(),
            payload,
            created_at: Utc::now(),
        }
    }

    /// Override the creation timestamp
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// Build the store key for a contract identity and argument hash
pub fn entry_key(identity: &str, hash: &str) -> String {
    format!("{}:{}", identity, hash)
}

/// Selection criteria for `find`, `count` and `destroy`
///
/// All set fields must match. An empty criteria matches every entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheCriteria {
    /// Exact key
    pub key: Option<String>,
    /// Key prefix (used to address every entry of one contract)
    pub prefix: Option<String>,
    /// Only entries created strictly after this instant
    pub created_after: Option<DateTime<Utc>>,
    /// Only entries created strictly before this instant
    pub created_before: Option<DateTime<Utc>>,
}

impl CacheCriteria {
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            ..Default::default()
        }
    }

    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            ..Default::default()
        }
    }

    pub fn created_after(mut self, instant: DateTime<Utc>) -> Self {
        self.created_after = Some(instant);
        self
    }

    pub fn created_before(mut self, instant: DateTime<Utc>) -> Self {
        self.created_before = Some(instant);
        self
    }

    /// Whether `entry` satisfies every set field
    pub fn matches(&self, entry: &CacheEntry) -> bool {
        if let Some(key) = &self.key {
            if &entry.key != key {
                return false;
            }
        }
        if let Some(prefix) = &self.prefix {
            if !entry.key.starts_with(prefix.as_str()) {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if entry.created_at <= after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if entry.created_at >= before {
                return false;
            }
        }
        true
    }
}

/// Pluggable store of memoized outcomes
///
/// Implementations must tolerate concurrent writers for the same key.
/// Entries are content-keyed, so the last write winning is harmless.
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync + fmt::Debug {
    /// Name of this store, used in logs
    fn name(&self) -> &str;

    /// Entries matching `criteria`, newest first
    async fn find(&self, criteria: &CacheCriteria) -> CacheResult<Vec<CacheEntry>>;

    /// Store a new entry
    async fn create(&self, entry: CacheEntry) -> CacheResult<()>;

    /// Number of entries matching `criteria`
    async fn count(&self, criteria: &CacheCriteria) -> CacheResult<usize> {
        Ok(self.find(criteria).await?.len())
    }

    /// Delete entries matching `criteria`, returning how many were removed
    async fn destroy(&self, criteria: &CacheCriteria) -> CacheResult<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_criteria_matching() {
        let now = Utc::now();
        let entry = CacheEntry::new("add:abc", json!(5)).with_created_at(now);

        assert!(CacheCriteria::default().matches(&entry));
        assert!(CacheCriteria::key("add:abc").matches(&entry));
        assert!(!CacheCriteria::key("add:abd").matches(&entry));
        assert!(CacheCriteria::prefix("add:").matches(&entry));
        assert!(!CacheCriteria::prefix("sub:").matches(&entry));

        assert!(CacheCriteria::key("add:abc")
            .created_after(now - Duration::seconds(1))
            .matches(&entry));
        assert!(!CacheCriteria::key("add:abc")
            .created_after(now)
            .matches(&entry));
        assert!(CacheCriteria::prefix("add:")
            .created_before(now + Duration::seconds(1))
            .matches(&entry));
    }

    #[test]
    fn test_entry_key() {
        assert_eq!(entry_key("add", "ff00"), "add:ff00");
    }
}
