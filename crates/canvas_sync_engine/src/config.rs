//! Configuration for sync sessions.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing and threshold settings for a [`SyncSession`](crate::SyncSession).
///
/// Durations are (de)serialized as integer milliseconds, and missing fields
/// take their default, so hosts can load partial configurations:
///
/// ```
/// use canvas_sync_engine::SyncConfig;
/// use std::time::Duration;
///
/// let config: SyncConfig = serde_json::from_str(r#"{ "pushInterval": 5000 }"#).unwrap();
/// assert_eq!(config.push_interval, Duration::from_secs(5));
/// assert_eq!(config.debounce, Duration::from_millis(200));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncConfig {
    /// Quiet period before a debounced capture runs.
    #[serde(with = "millis")]
    pub debounce: Duration,
    /// Interval between push cycles.
    #[serde(with = "millis")]
    pub push_interval: Duration,
    /// Minimum time after initialization before scheduled pushes run.
    #[serde(with = "millis")]
    pub push_grace: Duration,
    /// Interval between poll cycles.
    #[serde(with = "millis")]
    pub poll_interval: Duration,
    /// Trailing window of remote transactions fetched by a regular poll.
    #[serde(with = "millis")]
    pub poll_window: Duration,
    /// Every Nth poll reconciles the full history. Zero disables it.
    pub full_reconcile_every: u32,
    /// Log length above which a snapshot is requested.
    pub snapshot_threshold: usize,
    /// Consecutive failures above which the session is degraded.
    pub degraded_threshold: u32,
    /// Window in which a repeated initialization is suppressed.
    #[serde(with = "millis")]
    pub init_cooldown: Duration,
    /// How long the conflict prompt may take before `remote` is chosen.
    #[serde(with = "millis")]
    pub conflict_timeout: Duration,
}

impl SyncConfig {
    /// Creates a configuration with default settings.
    pub fn new() -> Self {
        Self {
            debounce: Duration::from_millis(200),
            push_interval: Duration::from_secs(2),
            push_grace: Duration::from_millis(300),
            poll_interval: Duration::from_secs(3),
            poll_window: Duration::from_secs(60),
            full_reconcile_every: 5,
            snapshot_threshold: 50,
            degraded_threshold: 5,
            init_cooldown: Duration::from_millis(500),
            conflict_timeout: Duration::from_secs(60),
        }
    }

    /// Sets the capture debounce.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Sets the push interval.
    pub fn with_push_interval(mut self, interval: Duration) -> Self {
        self.push_interval = interval;
        self
    }

    /// Sets the post-initialization push grace period.
    pub fn with_push_grace(mut self, grace: Duration) -> Self {
        self.push_grace = grace;
        self
    }

    /// Sets the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the trailing poll window.
    pub fn with_poll_window(mut self, window: Duration) -> Self {
        self.poll_window = window;
        self
    }

    /// Sets the full-reconciliation cadence.
    pub fn with_full_reconcile_every(mut self, every: u32) -> Self {
        self.full_reconcile_every = every;
        self
    }

    /// Sets the snapshot threshold.
    pub fn with_snapshot_threshold(mut self, threshold: usize) -> Self {
        self.snapshot_threshold = threshold;
        self
    }

    /// Sets the degraded-mode threshold.
    pub fn with_degraded_threshold(mut self, threshold: u32) -> Self {
        self.degraded_threshold = threshold;
        self
    }

    /// Sets the re-initialization cooldown.
    pub fn with_init_cooldown(mut self, cooldown: Duration) -> Self {
        self.init_cooldown = cooldown;
        self
    }

    /// Sets the conflict prompt timeout.
    pub fn with_conflict_timeout(mut self, timeout: Duration) -> Self {
        self.conflict_timeout = timeout;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(ms)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.debounce, Duration::from_millis(200));
        assert_eq!(config.push_interval, Duration::from_secs(2));
        assert_eq!(config.push_grace, Duration::from_millis(300));
        assert_eq!(config.poll_interval, Duration::from_secs(3));
        assert_eq!(config.poll_window, Duration::from_secs(60));
        assert_eq!(config.full_reconcile_every, 5);
        assert_eq!(config.degraded_threshold, 5);
        assert_eq!(config.init_cooldown, Duration::from_millis(500));
    }

    #[test]
    fn config_builder() {
        let config = SyncConfig::new()
            .with_debounce(Duration::from_millis(50))
            .with_snapshot_threshold(3)
            .with_full_reconcile_every(0)
            .with_conflict_timeout(Duration::from_secs(1));

        assert_eq!(config.debounce, Duration::from_millis(50));
        assert_eq!(config.snapshot_threshold, 3);
        assert_eq!(config.full_reconcile_every, 0);
        assert_eq!(config.conflict_timeout, Duration::from_secs(1));
    }

    #[test]
    fn serde_durations_in_millis() {
        let config = SyncConfig::new().with_poll_interval(Duration::from_millis(1500));
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["pollInterval"], serde_json::json!(1500));

        let back: SyncConfig = serde_json::from_value(value).unwrap();
        assert_eq!(back, config);
    }
}
