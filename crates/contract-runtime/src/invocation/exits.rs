//! Exit signaling and the one-shot exit guard
//!
//! Every origin of an outcome (an explicit signal from the implementation,
//! a captured fault, the deadline) goes through `ExitGuard::claim`. The
//! first claim wins and is forwarded over a oneshot channel to the engine;
//! every later claim is ignored. The guard also counts live `Exits` handles
//! and wakes the engine when the last one is dropped.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{oneshot, Notify};
use tracing::debug;
use uuid::Uuid;

use crate::contract::{ERROR, SUCCESS};
use crate::error::Failure;
use crate::telemetry::InvocationMetrics;

/// Payload carried by an exit signal
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Empty,
    Value(Value),
    Failure(Failure),
}

impl Payload {
    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty)
    }

    /// The payload as a plain value (failures are serialized)
    pub fn into_value(self) -> Value {
        match self {
            Payload::Empty => Value::Null,
            Payload::Value(value) => value,
            Payload::Failure(failure) => serde_json::to_value(failure).unwrap_or(Value::Null),
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        if value.is_null() {
            Payload::Empty
        } else {
            Payload::Value(value)
        }
    }
}

impl From<Failure> for Payload {
    fn from(failure: Failure) -> Self {
        Payload::Failure(failure)
    }
}

impl From<&str> for Payload {
    fn from(message: &str) -> Self {
        Payload::Value(Value::String(message.to_string()))
    }
}

impl From<String> for Payload {
    fn from(message: String) -> Self {
        Payload::Value(Value::String(message))
    }
}

impl From<anyhow::Error> for Payload {
    fn from(error: anyhow::Error) -> Self {
        Payload::Value(Value::String(format!("{:#}", error)))
    }
}

/// How an invocation left the executing state
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// The implementation chose an outcome
    Exit { outcome: String, payload: Payload },
    /// The implementation returned an error or panicked
    Fault(String),
    /// The deadline expired first
    Timeout { after_ms: u64 },
    /// The implementation finished and released every exit handle without signaling
    Abandoned,
    /// Served from the cache
    Cached { outcome: String, payload: Value },
}

impl Signal {
    /// Short label used in logs
    pub fn label(&self) -> &str {
        match self {
            Signal::Exit { outcome, .. } | Signal::Cached { outcome, .. } => outcome,
            Signal::Fault(_) => "fault",
            Signal::Timeout { .. } => "timeout",
            Signal::Abandoned => "abandoned",
        }
    }
}

struct ExitState {
    exited: Option<String>,
    sender: Option<oneshot::Sender<Signal>>,
}

/// One-shot guard over the invocation's exited state
pub(crate) struct ExitGuard {
    contract: String,
    metrics: Option<Arc<InvocationMetrics>>,
    state: Mutex<ExitState>,
    handles: AtomicUsize,
    released: Notify,
}

impl ExitGuard {
    pub(crate) fn new(
        contract: impl Into<String>,
        metrics: Option<Arc<InvocationMetrics>>,
    ) -> (Arc<Self>, oneshot::Receiver<Signal>) {
        let (sender, receiver) = oneshot::channel();
        let guard = Arc::new(Self {
            contract: contract.into(),
            metrics,
            state: Mutex::new(ExitState {
                exited: None,
                sender: Some(sender),
            }),
            handles: AtomicUsize::new(0),
            released: Notify::new(),
        });
        (guard, receiver)
    }

    /// Claim the exit; returns `false` if the invocation already exited
    pub(crate) fn claim(&self, signal: Signal) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(first) = &state.exited {
            debug!(
                contract = %self.contract,
                first = %first,
                ignored = %signal.label(),
                "Ignoring late exit signal"
            );
            if let Some(metrics) = &self.metrics {
                metrics.record_late_signal(&self.contract);
            }
            return false;
        }

        state.exited = Some(signal.label().to_string());
        if let Some(sender) = state.sender.take() {
            // The engine may have stopped listening; the claim still stands.
            let _ = sender.send(signal);
        }
        true
    }

    /// Number of `Exits` handles still alive
    pub(crate) fn live_handles(&self) -> usize {
        self.handles.load(Ordering::Acquire)
    }

    /// Resolves after the last `Exits` handle was dropped
    ///
    /// The permit is stored, so a release that happened before the call
    /// is not lost.
    pub(crate) async fn released(&self) {
        self.released.notified().await
    }

    fn acquire_handle(&self) {
        self.handles.fetch_add(1, Ordering::AcqRel);
    }

    fn release_handle(&self) {
        if self.handles.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.released.notify_one();
        }
    }

    pub(crate) fn exited(&self) -> Option<String> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .exited
            .clone()
    }
}

impl fmt::Debug for ExitGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExitGuard")
            .field("contract", &self.contract)
            .field("exited", &self.exited())
            .field("handles", &self.live_handles())
            .finish()
    }
}

/// Handle the implementation uses to signal its outcome
///
/// Cloneable; all clones share one guard, so at most one signal across all
/// of them is accepted. Signals return whether they were accepted.
#[derive(Debug)]
pub struct Exits {
    guard: Arc<ExitGuard>,
}

impl Exits {
    pub(crate) fn new(guard: Arc<ExitGuard>) -> Self {
        guard.acquire_handle();
        Self { guard }
    }

    /// Signal `success`
    pub fn success(&self, value: impl Into<Value>) -> bool {
        self.exit(SUCCESS, value.into())
    }

    /// Signal `error` with a failure, message or arbitrary payload
    pub fn error(&self, payload: impl Into<Payload>) -> bool {
        self.signal(ERROR, payload.into())
    }

    /// Signal a named outcome
    pub fn exit(&self, outcome: impl Into<String>, value: Value) -> bool {
        self.signal(outcome, Payload::from(value))
    }

    /// Signal a named outcome with an explicit payload
    pub fn signal(&self, outcome: impl Into<String>, payload: Payload) -> bool {
        self.guard.claim(Signal::Exit {
            outcome: outcome.into(),
            payload,
        })
    }

    /// Whether an outcome has already been chosen
    pub fn is_exited(&self) -> bool {
        self.guard.exited().is_some()
    }
}

impl Clone for Exits {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.guard))
    }
}

impl Drop for Exits {
    fn drop(&mut self) {
        self.guard.release_handle();
    }
}

/// Call-scoped context handed to the implementation
#[derive(Debug, Clone)]
pub struct CallContext {
    pub invocation_id: Uuid,
    pub contract: String,
    pub metadata: Arc<Map<String, Value>>,
    pub timeout_ms: Option<u64>,
    pub started_at: DateTime<Utc>,
}

impl CallContext {
    pub fn new(contract: impl Into<String>, metadata: Map<String, Value>, timeout_ms: Option<u64>) -> Self {
        Self {
            invocation_id: Uuid::new_v4(),
            contract: contract.into(),
            metadata: Arc::new(metadata),
            timeout_ms,
            started_at: Utc::now(),
        }
    }

    pub fn metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_first_claim_wins() {
        let (guard, mut receiver) = ExitGuard::new("t", None);
        let exits = Exits::new(Arc::clone(&guard));
        let clone = exits.clone();

        assert!(exits.success(json!(1)));
        assert!(!clone.success(json!(2)));
        assert!(!guard.claim(Signal::Timeout { after_ms: 5 }));
        assert!(clone.is_exited());

        match receiver.try_recv().unwrap() {
            Signal::Exit { outcome, payload } => {
                assert_eq!(outcome, "success");
                assert_eq!(payload, Payload::Value(json!(1)));
            }
            other => panic!("unexpected signal {:?}", other),
        }
    }

    #[test]
    fn test_timeout_blocks_later_signals() {
        let (guard, mut receiver) = ExitGuard::new("t", None);
        assert!(guard.claim(Signal::Timeout { after_ms: 50 }));
        assert!(!Exits::new(Arc::clone(&guard)).error("too late"));
        assert_eq!(guard.exited().as_deref(), Some("timeout"));
        assert_eq!(receiver.try_recv().unwrap(), Signal::Timeout { after_ms: 50 });
    }

    #[test]
    fn test_handles_are_counted() {
        let (guard, _receiver) = ExitGuard::new("t", None);
        let exits = Exits::new(Arc::clone(&guard));
        let clone = exits.clone();
        assert_eq!(guard.live_handles(), 2);

        drop(exits);
        assert_eq!(guard.live_handles(), 1);
        drop(clone);
        assert_eq!(guard.live_handles(), 0);

        let mut released = tokio_test::task::spawn(guard.released());
        tokio_test::assert_ready!(released.poll());
    }

    #[test]
    fn test_payload_conversions() {
        assert_eq!(Payload::from(Value::Null), Payload::Empty);
        assert_eq!(Payload::from("boom"), Payload::Value(json!("boom")));
        assert_eq!(
            Payload::from(anyhow::anyhow!("inner").context("outer")),
            Payload::Value(json!("outer: inner"))
        );
        assert_eq!(Payload::Empty.into_value(), Value::Null);
    }

    #[test]
    fn test_call_context_metadata() {
        let mut metadata = Map::new();
        metadata.insert("request_id".to_string(), json!("r-1"));
        let ctx = CallContext::new("t", metadata, Some(100));
        assert_eq!(ctx.metadata("request_id"), Some(&json!("r-1")));
        assert_eq!(ctx.timeout_ms, Some(100));
    }
}
