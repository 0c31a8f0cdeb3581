//! Lock timing parameters

use std::time::Duration;

use fastlease_common::{
    DEFAULT_MAX_JITTER_MS, DEFAULT_MAX_LOCK_TIME_MS, DEFAULT_REFRESH_TIME_MS,
    DEFAULT_VERIFY_DELAY_MS,
};
use serde::{Deserialize, Serialize};

/// Per-handle protocol timing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Wait before re-reading the lease after a contended claim. Must exceed
    /// the store's worst-case write visibility latency.
    pub verify_delay_ms: u64,
    /// Exclusive upper bound of the random delay before the first attempt
    pub max_jitter_ms: u64,
    /// Delay before re-running the protocol while another lease is fresh
    pub retry_delay_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            verify_delay_ms: DEFAULT_VERIFY_DELAY_MS,
            max_jitter_ms: DEFAULT_MAX_JITTER_MS,
            retry_delay_ms: 0,
        }
    }
}

impl LockConfig {
    pub fn verify_delay(&self) -> Duration {
        Duration::from_millis(self.verify_delay_ms)
    }

    pub fn max_jitter(&self) -> Duration {
        Duration::from_millis(self.max_jitter_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Parameters captured by one `acquire` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquireParams {
    /// Lease lifetime without a refresh
    pub max_lock_time_ms: u64,
    /// Heartbeat interval while held
    pub refresh_time_ms: u64,
}

impl Default for AcquireParams {
    fn default() -> Self {
        Self {
            max_lock_time_ms: DEFAULT_MAX_LOCK_TIME_MS,
            refresh_time_ms: DEFAULT_REFRESH_TIME_MS,
        }
    }
}

impl AcquireParams {
    pub fn new(max_lock_time_ms: u64, refresh_time_ms: u64) -> Self {
        Self {
            max_lock_time_ms,
            refresh_time_ms,
        }
    }

    pub fn max_lock_time(&self) -> Duration {
        Duration::from_millis(self.max_lock_time_ms)
    }

    pub fn refresh_time(&self) -> Duration {
        Duration::from_millis(self.refresh_time_ms)
    }

    /// At least one heartbeat lands before the lease expires
    pub fn has_refresh_margin(&self) -> bool {
        self.refresh_time_ms < self.max_lock_time_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LockConfig::default();
        assert_eq!(config.verify_delay(), Duration::from_millis(100));
        assert_eq!(config.max_jitter(), Duration::from_millis(2000));
        assert_eq!(config.retry_delay(), Duration::ZERO);

        let params = AcquireParams::default();
        assert_eq!(params.max_lock_time(), Duration::from_millis(5000));
        assert_eq!(params.refresh_time(), Duration::from_millis(1000));
        assert!(params.has_refresh_margin());
        assert!(!AcquireParams::new(1000, 1000).has_refresh_margin());
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let config: LockConfig = serde_json::from_str(r#"{"verify_delay_ms": 250}"#).unwrap();
        assert_eq!(config.verify_delay_ms, 250);
        assert_eq!(config.max_jitter_ms, DEFAULT_MAX_JITTER_MS);

        let params: AcquireParams = serde_json::from_str(r#"{"refresh_time_ms": 500}"#).unwrap();
        assert_eq!(params.max_lock_time_ms, DEFAULT_MAX_LOCK_TIME_MS);
        assert_eq!(params.refresh_time_ms, 500);
    }
}
