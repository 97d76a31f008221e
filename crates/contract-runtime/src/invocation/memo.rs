//! Memoization of cacheable outcomes
//!
//! Store failures never fail an invocation: they are logged and the
//! invocation proceeds as a miss. Writes run on their own task; delivery
//! waits for them at most `WRITE_WAIT`.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::arguments::ArgumentBag;
use crate::cache::{entry_key, CacheCriteria, CacheEntry, CacheStore};
use crate::contract::{CachePolicy, Contract};
use crate::schema::hash_arguments;
use crate::telemetry::{CacheEvent, InvocationMetrics};

/// Longest delivery waits on a write-through before the write is left detached
pub(crate) const WRITE_WAIT: Duration = Duration::from_millis(50);

/// Cache binding for one invocation
#[derive(Debug, Clone)]
pub(crate) struct Memo {
    contract: String,
    key: String,
    policy: CachePolicy,
    store: Arc<dyn CacheStore>,
    metrics: Option<Arc<InvocationMetrics>>,
}

impl Memo {
    /// Bind the invocation to a store, if caching applies
    ///
    /// Caching applies when the contract has a policy, caching is enabled,
    /// a store is attached (to the invocation or the policy) and the
    /// argument hash is computable.
    pub(crate) fn prepare(
        contract: &Contract,
        store: Option<&Arc<dyn CacheStore>>,
        arguments: &ArgumentBag,
    ) -> Option<Self> {
        if !contract.options().caching {
            return None;
        }
        let policy = contract.cache_policy()?;
        let store = store.or(policy.store.as_ref())?;
        let Some(hash) = hash_arguments(contract.inputs(), arguments) else {
            debug!(contract = %contract.identity(), "Arguments not hashable, skipping cache");
            return None;
        };

        Some(Self {
            contract: contract.identity().to_string(),
            key: entry_key(contract.identity(), &hash),
            policy: policy.clone(),
            store: Arc::clone(store),
            metrics: contract.metrics.clone(),
        })
    }

    pub(crate) fn outcome(&self) -> &str {
        &self.policy.outcome
    }

    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    /// Newest fresh payload for this key
    pub(crate) async fn lookup(&self) -> Option<Value> {
        let mut criteria = CacheCriteria::key(self.key.clone());
        if let Some(cutoff) = self.policy.freshness_cutoff(Utc::now()) {
            criteria = criteria.created_after(cutoff);
        }

        match self.store.find(&criteria).await {
            Ok(entries) => match entries.into_iter().next() {
                Some(entry) => {
                    debug!(contract = %self.contract, key = %self.key, "Cache hit");
                    self.record(CacheEvent::Hit);
                    Some(entry.payload)
                }
                None => {
                    self.record(CacheEvent::Miss);
                    None
                }
            },
            Err(e) => {
                warn!(
                    contract = %self.contract,
                    store = %self.store.name(),
                    error = %e,
                    "Cache lookup failed, executing implementation"
                );
                self.record(CacheEvent::Error);
                None
            }
        }
    }

    /// Write through and schedule eviction without holding delivery back
    ///
    /// Fast stores finish before this returns, so the next call with the
    /// same arguments hits. A slower write keeps running detached.
    pub(crate) async fn write_through(&self, payload: Value) {
        let memo = self.clone();
        let write = tokio::spawn(async move {
            memo.store(&payload).await;
            memo.schedule_eviction();
        });
        if tokio::time::timeout(WRITE_WAIT, write).await.is_err() {
            debug!(contract = %self.contract, key = %self.key, "Cache write still pending, delivering");
        }
    }

    /// Write the payload through to the store
    pub(crate) async fn store(&self, payload: &Value) {
        let entry = CacheEntry::new(self.key.clone(), payload.clone());
        match self.store.create(entry).await {
            Ok(()) => {
                debug!(contract = %self.contract, key = %self.key, "Cached outcome");
                self.record(CacheEvent::Write);
            }
            Err(e) => {
                warn!(
                    contract = %self.contract,
                    store = %self.store.name(),
                    error = %e,
                    "Cache write failed"
                );
                self.record(CacheEvent::Error);
            }
        }
    }

    /// Spawn eviction of expired entries for this contract
    ///
    /// Runs only when entries expire, and destroys nothing until more than
    /// `gc_buffer` expired entries have piled up.
    pub(crate) fn schedule_eviction(&self) {
        let Some(cutoff) = self.policy.freshness_cutoff(Utc::now()) else {
            return;
        };
        let memo = self.clone();
        let buffer = self.policy.gc_buffer.unwrap_or(0);

        tokio::spawn(async move {
            let criteria = CacheCriteria::prefix(format!("{}:", memo.contract)).created_before(cutoff);
            let stale = match memo.store.count(&criteria).await {
                Ok(stale) => stale,
                Err(e) => {
                    warn!(contract = %memo.contract, error = %e, "Cache eviction count failed");
                    memo.record(CacheEvent::Error);
                    return;
                }
            };
            if stale <= buffer {
                return;
            }
            match memo.store.destroy(&criteria).await {
                Ok(removed) => {
                    debug!(contract = %memo.contract, removed, "Evicted expired cache entries");
                    memo.record(CacheEvent::Evict);
                }
                Err(e) => {
                    warn!(contract = %memo.contract, error = %e, "Cache eviction failed");
                    memo.record(CacheEvent::Error);
                }
            }
        });
    }

    fn record(&self, event: CacheEvent) {
        if let Some(metrics) = &self.metrics {
            metrics.record_cache_event(&self.contract, event);
        }
    }
}
