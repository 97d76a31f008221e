//! Telemetry for the contract runtime
//!
//! Logging goes through `tracing` everywhere in the crate; this module adds
//! Prometheus metrics for invocations. Metrics are opt-in per contract: a
//! contract records only when built with an `InvocationMetrics` handle and
//! `RuntimeConfig::metrics` enabled.

pub mod metrics;

pub use metrics::{CacheEvent, InvocationMetrics, InvocationTimer, RuntimeMetricsRegistry};

use thiserror::Error;

/// Telemetry errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Metrics error: {0}")]
    MetricsError(#[from] prometheus::Error),

    #[error("Encoding error: {0}")]
    EncodingError(String),
}

pub type Result<T> = std::result::Result<T, TelemetryError>;
