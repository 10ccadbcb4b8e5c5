//! Consecutive-failure tracking and degraded mode.

use crate::error::SyncError;
use parking_lot::Mutex;
use tokio::sync::watch;

/// Counts consecutive sync failures.
///
/// Every push or poll failure increments the counter and every success
/// resets it. Once the counter exceeds the threshold the monitor reports
/// degraded mode until the next success. The flag is published on a
/// [`watch`] channel so hosts can show an offline indicator.
#[derive(Debug)]
pub struct FailureMonitor {
    threshold: u32,
    failures: Mutex<u32>,
    degraded: watch::Sender<bool>,
}

impl FailureMonitor {
    /// Creates a monitor with the given degraded threshold.
    pub fn new(threshold: u32) -> Self {
        let (degraded, _) = watch::channel(false);
        Self {
            threshold,
            failures: Mutex::new(0),
            degraded,
        }
    }

    /// Records a failed cycle.
    pub fn record_failure(&self, error: &SyncError) {
        let mut failures = self.failures.lock();
        *failures = failures.saturating_add(1);
        let count = *failures;
        drop(failures);

        tracing::debug!(failures = count, error = %error, "sync failure");
        if count > self.threshold && !*self.degraded.borrow() {
            tracing::warn!(failures = count, "sync degraded");
            self.degraded.send_replace(true);
        }
    }

    /// Records a successful cycle.
    pub fn record_success(&self) {
        *self.failures.lock() = 0;
        if *self.degraded.borrow() {
            tracing::info!("sync recovered");
            self.degraded.send_replace(false);
        }
    }

    /// Returns the current consecutive failure count.
    pub fn failures(&self) -> u32 {
        *self.failures.lock()
    }

    /// Returns true while in degraded mode.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribes to degraded-mode transitions.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure() -> SyncError {
        SyncError::transport_retryable("offline")
    }

    #[test]
    fn degraded_after_threshold_exceeded() {
        let monitor = FailureMonitor::new(5);
        for _ in 0..5 {
            monitor.record_failure(&failure());
        }
        assert_eq!(monitor.failures(), 5);
        assert!(!monitor.is_degraded());

        monitor.record_failure(&failure());
        assert!(monitor.is_degraded());
    }

    #[test]
    fn success_resets() {
        let monitor = FailureMonitor::new(1);
        monitor.record_failure(&failure());
        monitor.record_failure(&failure());
        assert!(monitor.is_degraded());

        monitor.record_success();
        assert_eq!(monitor.failures(), 0);
        assert!(!monitor.is_degraded());
    }

    #[tokio::test]
    async fn subscribers_see_transitions() {
        let monitor = FailureMonitor::new(0);
        let mut rx = monitor.subscribe();
        assert!(!*rx.borrow());

        monitor.record_failure(&failure());
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());

        monitor.record_success();
        rx.changed().await.unwrap();
        assert!(!*rx.borrow());
    }
}
