//! Prometheus metrics for invocations
//!
//! - `contract_runtime_invocations_total` (counter) - terminal outcomes by contract
//! - `contract_runtime_invocation_duration_seconds` (histogram) - time to delivery
//! - `contract_runtime_cache_events_total` (counter) - hits, misses, writes and store errors
//! - `contract_runtime_timeouts_total` (counter) - deadlines exceeded
//! - `contract_runtime_late_signals_total` (counter) - exit signals ignored after the first
//!
//! # Example
//!
//! ```rust,no_run
//! use contract_runtime::telemetry::RuntimeMetricsRegistry;
//!
//! let registry = RuntimeMetricsRegistry::new().unwrap();
//! let metrics = registry.invocation();
//!
//! metrics.record_invocation("add", "success");
//! metrics.observe_duration("add", 0.002);
//! ```

use prometheus::{CounterVec, HistogramOpts, HistogramVec, Opts, Registry};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use super::{Result, TelemetryError};

const NAMESPACE: &str = "contract_runtime";

/// Cache interaction kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
    Hit,
    Miss,
    Write,
    Evict,
    Error,
}

impl fmt::Display for CacheEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheEvent::Hit => write!(f, "hit"),
            CacheEvent::Miss => write!(f, "miss"),
            CacheEvent::Write => write!(f, "write"),
            CacheEvent::Evict => write!(f, "evict"),
            CacheEvent::Error => write!(f, "error"),
        }
    }
}

/// Invocation metrics for Prometheus
pub struct InvocationMetrics {
    /// Terminal outcomes (by contract, outcome)
    invocations_total: CounterVec,

    /// Invocation duration in seconds (by contract)
    duration_seconds: HistogramVec,

    /// Cache interactions (by contract, event)
    cache_events_total: CounterVec,

    /// Deadlines exceeded (by contract)
    timeouts_total: CounterVec,

    /// Exit signals ignored after the first (by contract)
    late_signals_total: CounterVec,
}

impl InvocationMetrics {
    /// Create and register with the provided registry
    pub fn new(registry: Arc<Registry>) -> Result<Self> {
        let invocations_total = CounterVec::new(
            Opts::new(
                "invocations_total",
                "Total number of invocations by delivered outcome",
            )
            .namespace(NAMESPACE),
            &["contract", "outcome"],
        )?;

        let duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "invocation_duration_seconds",
                "Invocation duration from validation to delivery in seconds",
            )
            .namespace(NAMESPACE)
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
            &["contract"],
        )?;

        let cache_events_total = CounterVec::new(
            Opts::new("cache_events_total", "Cache interactions by kind").namespace(NAMESPACE),
            &["contract", "event"],
        )?;

        let timeouts_total = CounterVec::new(
            Opts::new("timeouts_total", "Invocations that exceeded their deadline")
                .namespace(NAMESPACE),
            &["contract"],
        )?;

        let late_signals_total = CounterVec::new(
            Opts::new(
                "late_signals_total",
                "Exit signals ignored because the invocation had already exited",
            )
            .namespace(NAMESPACE),
            &["contract"],
        )?;

        registry.register(Box::new(invocations_total.clone()))?;
        registry.register(Box::new(duration_seconds.clone()))?;
        registry.register(Box::new(cache_events_total.clone()))?;
        registry.register(Box::new(timeouts_total.clone()))?;
        registry.register(Box::new(late_signals_total.clone()))?;

        Ok(Self {
            invocations_total,
            duration_seconds,
            cache_events_total,
            timeouts_total,
            late_signals_total,
        })
    }

    /// Record a delivered outcome
    pub fn record_invocation(&self, contract: &str, outcome: &str) {
        self.invocations_total
            .with_label_values(&[contract, outcome])
            .inc();
    }

    /// Observe invocation duration
    pub fn observe_duration(&self, contract: &str, duration_secs: f64) {
        self.duration_seconds
            .with_label_values(&[contract])
            .observe(duration_secs);
    }

    pub fn record_cache_event(&self, contract: &str, event: CacheEvent) {
        self.cache_events_total
            .with_label_values(&[contract, &event.to_string()])
            .inc();
    }

    pub fn record_timeout(&self, contract: &str) {
        self.timeouts_total.with_label_values(&[contract]).inc();
    }

    pub fn record_late_signal(&self, contract: &str) {
        self.late_signals_total.with_label_values(&[contract]).inc();
    }

    /// Start a timer that records duration when dropped
    pub fn start_timer(&self, contract: &str) -> InvocationTimer<'_> {
        InvocationTimer {
            metrics: self,
            contract: contract.to_string(),
            start: Instant::now(),
        }
    }
}

impl fmt::Debug for InvocationMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationMetrics").finish_non_exhaustive()
    }
}

/// RAII timer for invocation duration
pub struct InvocationTimer<'a> {
    metrics: &'a InvocationMetrics,
    contract: String,
    start: Instant,
}

impl InvocationTimer<'_> {
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Drop for InvocationTimer<'_> {
    fn drop(&mut self) {
        self.metrics
            .observe_duration(&self.contract, self.start.elapsed().as_secs_f64());
    }
}

/// Registry owning the runtime's metrics
pub struct RuntimeMetricsRegistry {
    registry: Arc<Registry>,
    invocation: Arc<InvocationMetrics>,
}

impl RuntimeMetricsRegistry {
    pub fn new() -> Result<Self> {
        Self::with_registry(Arc::new(Registry::new()))
    }

    /// Register into an existing Prometheus registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let invocation = Arc::new(InvocationMetrics::new(Arc::clone(&registry))?);
        Ok(Self {
            registry,
            invocation,
        })
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Shared handle to attach to contracts
    pub fn invocation(&self) -> Arc<InvocationMetrics> {
        Arc::clone(&self.invocation)
    }

    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// Encode metrics as text for scraping
    pub fn encode_text(&self) -> Result<String> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::EncodingError(e.to_string()))
    }
}
