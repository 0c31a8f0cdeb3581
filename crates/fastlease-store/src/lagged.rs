//! Latency-injecting store
//!
//! A `LaggedMedium` is a shared backing map; each `LaggedStore` view obtained
//! from it behaves as a separate execution context. A write is visible to the
//! context that issued it immediately, and to every other context once the
//! medium's latency has elapsed on the tokio clock. With a paused tokio clock
//! this gives deterministic control over write visibility.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use fastlease_common::{SharedStore, StoreError};
use parking_lot::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct PendingWrite {
    context: usize,
    value: Option<String>,
    visible_at: Instant,
}

#[derive(Debug)]
struct MediumState {
    latency: Duration,
    /// Writes per key in issue order
    writes: HashMap<String, Vec<PendingWrite>>,
}

/// Backing map shared by every view
#[derive(Debug, Clone)]
pub struct LaggedMedium {
    state: Arc<Mutex<MediumState>>,
    next_context: Arc<AtomicUsize>,
}

impl LaggedMedium {
    pub fn new(latency: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(MediumState {
                latency,
                writes: HashMap::new(),
            })),
            next_context: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a view acting as a new, distinct context
    pub fn view(&self) -> LaggedStore {
        LaggedStore {
            medium: self.clone(),
            context: self.next_context.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn latency(&self) -> Duration {
        self.state.lock().latency
    }

    /// Change the latency applied to writes issued from now on
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = latency;
    }
}

/// One context's view of a `LaggedMedium`
#[derive(Debug, Clone)]
pub struct LaggedStore {
    medium: LaggedMedium,
    context: usize,
}

impl LaggedStore {
    pub fn context(&self) -> usize {
        self.context
    }

    fn write(&self, key: &str, value: Option<String>) {
        let now = Instant::now();
        let mut state = self.medium.state.lock();
        let visible_at = now + state.latency;
        let history = state.writes.entry(key.to_string()).or_default();
        history.push(PendingWrite {
            context: self.context,
            value,
            visible_at,
        });

        // Everything before the newest write visible to all contexts is unreachable.
        if let Some(settled) = history.iter().rposition(|w| w.visible_at <= now) {
            history.drain(..settled);
        }
    }
}

impl SharedStore for LaggedStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let state = self.medium.state.lock();
        let value = state.writes.get(key).and_then(|history| {
            history
                .iter()
                .rev()
                .find(|w| w.context == self.context || w.visible_at <= now)
                .and_then(|w| w.value.clone())
        });
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.write(key, Some(value.to_string()));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.write(key, None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_own_writes_visible_immediately() {
        let medium = LaggedMedium::new(Duration::from_millis(50));
        let a = medium.view();
        let b = medium.view();

        a.set("k", "from-a").unwrap();
        assert_eq!(a.get("k").unwrap().as_deref(), Some("from-a"));
        assert!(b.get("k").unwrap().is_none());

        tokio::time::advance(Duration::from_millis(49)).await;
        assert!(b.get("k").unwrap().is_none());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(b.get("k").unwrap().as_deref(), Some("from-a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_write_wins_once_visible() {
        let medium = LaggedMedium::new(Duration::from_millis(20));
        let a = medium.view();
        let b = medium.view();
        let c = medium.view();

        a.set("k", "a").unwrap();
        tokio::time::advance(Duration::from_millis(10)).await;
        b.set("k", "b").unwrap();

        // a still sees its own write; b's is in flight
        assert_eq!(a.get("k").unwrap().as_deref(), Some("a"));
        assert_eq!(b.get("k").unwrap().as_deref(), Some("b"));
        assert!(c.get("k").unwrap().is_none());

        tokio::time::advance(Duration::from_millis(10)).await;
        assert_eq!(c.get("k").unwrap().as_deref(), Some("a"));

        tokio::time::advance(Duration::from_millis(10)).await;
        assert_eq!(a.get("k").unwrap().as_deref(), Some("b"));
        assert_eq!(c.get("k").unwrap().as_deref(), Some("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_propagates_with_latency() {
        let medium = LaggedMedium::new(Duration::from_millis(5));
        let a = medium.view();
        let b = medium.view();

        a.set("k", "v").unwrap();
        tokio::time::advance(Duration::from_millis(5)).await;
        a.remove("k").unwrap();

        assert!(a.get("k").unwrap().is_none());
        assert_eq!(b.get("k").unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_millis(5)).await;
        assert!(b.get("k").unwrap().is_none());
    }

    #[test]
    fn test_zero_latency_behaves_like_shared_map() {
        let medium = LaggedMedium::new(Duration::ZERO);
        let a = medium.view();
        let b = medium.view();
        assert_ne!(a.context(), b.context());

        a.set("k", "v").unwrap();
        assert_eq!(b.get("k").unwrap().as_deref(), Some("v"));
    }
}
