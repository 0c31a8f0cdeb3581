//! Timestamp sources
//!
//! Lease timestamps are unix milliseconds. `SystemClock` reads wall time;
//! `TokioClock` advances with the tokio clock, so leases age in step with
//! `tokio::time::pause`/`advance` in tests.

use std::fmt::Debug;

use tokio::time::Instant;

/// Source of unix-millisecond timestamps written into leases
pub trait Clock: Send + Sync + Debug {
    fn now_millis(&self) -> i64;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock anchored at a unix timestamp and driven by `tokio::time::Instant`
#[derive(Debug, Clone)]
pub struct TokioClock {
    origin_ms: i64,
    start: Instant,
}

impl TokioClock {
    /// Anchor at the current wall time
    pub fn new() -> Self {
        Self::starting_at(SystemClock.now_millis())
    }

    pub fn starting_at(origin_ms: i64) -> Self {
        Self {
            origin_ms,
            start: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now_millis(&self) -> i64 {
        self.origin_ms
            .saturating_add(self.start.elapsed().as_millis() as i64)
    }
}
