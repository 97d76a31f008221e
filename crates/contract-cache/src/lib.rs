//! In-memory cache store for the contract runtime
//!
//! `MemoryCache` keeps memoized outcomes in process memory. It is the store
//! to attach in tests and single-process deployments; anything shared across
//! processes needs its own `CacheStore` implementation.
//!
//! ```rust,no_run
//! use contract_cache::MemoryCache;
//! use contract_runtime::CachePolicy;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let store = Arc::new(MemoryCache::new());
//! let policy = CachePolicy::new()
//!     .ttl(Duration::from_secs(300))
//!     .gc_buffer(100)
//!     .store(store);
//! ```

use async_trait::async_trait;
use chrono::Utc;
use contract_runtime::cache::{CacheCriteria, CacheEntry, CacheError, CacheResult, CacheStore};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use tracing::{debug, trace};

/// Counters of store traffic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries currently held
    pub entries: usize,
    /// `find` calls that returned at least one entry
    pub hits: u64,
    /// `find` calls that returned nothing
    pub misses: u64,
    /// Entries created
    pub writes: u64,
    /// Entries removed by `destroy` or `clear`
    pub evictions: u64,
}

impl CacheStats {
    /// Fraction of `find` calls that hit, 0.0 when nothing was looked up
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

/// Process-local `CacheStore`
///
/// Entries are kept in insertion order, so iterating in reverse yields the
/// newest first.
#[derive(Debug)]
pub struct MemoryCache {
    name: String,
    entries: RwLock<Vec<CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    evictions: AtomicU64,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::named("memory")
    }

    /// Create a store with a custom name for logs
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(Vec::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Number of entries held
    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the traffic counters
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Drop every entry
    pub fn clear(&self) -> CacheResult<usize> {
        let mut entries = self.entries.write().map_err(|e| poisoned(&self.name, e))?;
        let removed = entries.len();
        entries.clear();
        self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        Ok(removed)
    }

    /// Drop entries older than `max_age`, returning how many were removed
    pub fn purge_older_than(&self, max_age: std::time::Duration) -> CacheResult<usize> {
        let age = chrono::Duration::from_std(max_age)
            .map_err(|e| CacheError::Backend(format!("Invalid age: {}", e)))?;
        let Some(cutoff) = Utc::now().checked_sub_signed(age) else {
            return Ok(0);
        };
        self.remove_matching(&CacheCriteria::default().created_before(cutoff))
    }

    fn remove_matching(&self, criteria: &CacheCriteria) -> CacheResult<usize> {
        let mut entries = self.entries.write().map_err(|e| poisoned(&self.name, e))?;
        let before = entries.len();
        entries.retain(|entry| !criteria.matches(entry));
        let removed = before - entries.len();
        self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        Ok(removed)
    }
}

fn poisoned<E: std::fmt::Display>(name: &str, error: E) -> CacheError {
    CacheError::Backend(format!("{} store lock poisoned: {}", name, error))
}

#[async_trait]
impl CacheStore for MemoryCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find(&self, criteria: &CacheCriteria) -> CacheResult<Vec<CacheEntry>> {
        let found: Vec<CacheEntry> = self
            .entries
            .read()
            .map_err(|e| poisoned(&self.name, e))?
            .iter()
            .rev()
            .filter(|entry| criteria.matches(entry))
            .cloned()
            .collect();

        if found.is_empty() {
            self.misses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        trace!(store = %self.name, found = found.len(), "Cache find");
        Ok(found)
    }

    async fn create(&self, entry: CacheEntry) -> CacheResult<()> {
        debug!(store = %self.name, key = %entry.key, "Cache entry created");
        self.entries
            .write()
            .map_err(|e| poisoned(&self.name, e))?
            .push(entry);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn count(&self, criteria: &CacheCriteria) -> CacheResult<usize> {
        Ok(self
            .entries
            .read()
            .map_err(|e| poisoned(&self.name, e))?
            .iter()
            .filter(|entry| criteria.matches(entry))
            .count())
    }

    async fn destroy(&self, criteria: &CacheCriteria) -> CacheResult<usize> {
        let removed = self.remove_matching(criteria)?;
        debug!(store = %self.name, removed, "Cache entries destroyed");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[tokio::test]
    async fn test_find_newest_first() {
        let cache = MemoryCache::new();
        let now = Utc::now();
        cache
            .create(CacheEntry::new("add:1", json!(1)).with_created_at(now - Duration::seconds(2)))
            .await
            .unwrap();
        cache
            .create(CacheEntry::new("add:1", json!(2)).with_created_at(now))
            .await
            .unwrap();
        cache.create(CacheEntry::new("sub:1", json!(3))).await.unwrap();

        let found = cache.find(&CacheCriteria::key("add:1")).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].payload, json!(2));

        let stats = cache.stats();
        assert_eq!(stats.entries, 3);
        assert_eq!(stats.writes, 3);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn test_miss_is_counted() {
        let cache = MemoryCache::named("scratch");
        assert_eq!(cache.name(), "scratch");
        assert!(cache.find(&CacheCriteria::key("none")).await.unwrap().is_empty());
        assert_eq!(cache.stats().misses, 1);
        assert_eq!(cache.stats().hit_rate(), 0.0);
    }

    #[tokio::test]
    async fn test_count_and_destroy_by_age() {
        let cache = MemoryCache::new();
        let old = Utc::now() - Duration::minutes(10);
        for i in 0..3 {
            cache
                .create(CacheEntry::new(format!("add:{}", i), json!(i)).with_created_at(old))
                .await
                .unwrap();
        }
        cache.create(CacheEntry::new("add:fresh", json!(9))).await.unwrap();

        let stale = CacheCriteria::prefix("add:").created_before(Utc::now() - Duration::minutes(1));
        assert_eq!(cache.count(&stale).await.unwrap(), 3);
        assert_eq!(cache.destroy(&stale).await.unwrap(), 3);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().evictions, 3);
    }

    #[test]
    fn test_purge_and_clear() {
        let cache = MemoryCache::new();
        tokio_test::block_on(async {
            cache
                .create(CacheEntry::new("a:1", json!(1)).with_created_at(Utc::now() - Duration::hours(1)))
                .await
                .unwrap();
            cache.create(CacheEntry::new("a:2", json!(2))).await.unwrap();
        });

        assert_eq!(cache.purge_older_than(std::time::Duration::from_secs(60)).unwrap(), 1);
        assert_eq!(cache.clear().unwrap(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert_eq!(stats.hit_rate(), 0.75);
    }
}
