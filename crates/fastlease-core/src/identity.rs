//! Contender identity and jitter
//!
//! A contender id is `<creation millis>:<random u64>:<process sequence>`.
//! Uniqueness is probabilistic across processes; the sequence number rules
//! out collisions between handles created by the same process.

use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Identifies who wrote an announcement or lease
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContenderId(String);

impl ContenderId {
    pub fn generate(clock: &dyn Clock) -> Self {
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let random: u64 = rand::rng().random();
        Self(format!("{}:{}:{}", clock.now_millis(), random, seq))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ContenderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for ContenderId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

/// Uniform random delay in `[0, max)`; zero when `max` is zero
pub fn jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..max_ms))
}
