//! Per-invocation deadline

use std::future::pending;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{sleep, Sleep};

/// Deadline armed when execution starts
///
/// `expired()` resolves once when the deadline passes and is pending forever
/// afterwards (and when disarmed), so it can sit in a `select!` loop.
#[derive(Debug)]
pub struct TimeoutMonitor {
    sleep: Option<Pin<Box<Sleep>>>,
    timeout_ms: u64,
}

impl TimeoutMonitor {
    pub fn disarmed() -> Self {
        Self {
            sleep: None,
            timeout_ms: 0,
        }
    }

    /// Arm for `timeout_ms`; `None` or 0 leaves the monitor disarmed
    pub fn arm(timeout_ms: Option<u64>) -> Self {
        match timeout_ms.filter(|ms| *ms > 0) {
            Some(ms) => Self {
                sleep: Some(Box::pin(sleep(Duration::from_millis(ms)))),
                timeout_ms: ms,
            },
            None => Self::disarmed(),
        }
    }

    pub fn is_armed(&self) -> bool {
        self.sleep.is_some()
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    /// Wait for the deadline; returns the configured duration in ms
    pub async fn expired(&mut self) -> u64 {
        match self.sleep.as_mut() {
            Some(deadline) => {
                deadline.as_mut().await;
                self.sleep = None;
                self.timeout_ms
            }
            None => pending().await,
        }
    }

    pub fn clear(&mut self) {
        self.sleep = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_fires_once() {
        let mut monitor = TimeoutMonitor::arm(Some(20));
        assert!(monitor.is_armed());

        let start = Instant::now();
        assert_eq!(monitor.expired().await, 20);
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert!(!monitor.is_armed());

        let again = tokio::time::timeout(Duration::from_millis(30), monitor.expired()).await;
        assert!(again.is_err());
    }

    #[tokio::test]
    async fn test_zero_is_disarmed() {
        let mut monitor = TimeoutMonitor::arm(Some(0));
        assert!(!monitor.is_armed());
        let waited = tokio::time::timeout(Duration::from_millis(20), monitor.expired()).await;
        assert!(waited.is_err());
    }

    #[test]
    fn test_disarmed_never_resolves() {
        let mut monitor = TimeoutMonitor::disarmed();
        let mut expired = tokio_test::task::spawn(monitor.expired());
        tokio_test::assert_pending!(expired.poll());
        tokio_test::assert_pending!(expired.poll());
    }

    #[tokio::test]
    async fn test_clear() {
        let mut monitor = TimeoutMonitor::arm(Some(10));
        monitor.clear();
        let waited = tokio::time::timeout(Duration::from_millis(30), monitor.expired()).await;
        assert!(waited.is_err());
    }
}
