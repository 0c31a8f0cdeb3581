use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use fastlease_common::{SharedStore, StoreError};

/// Store wrapper that fails every operation while switched on.
///
/// Clones share the switch.
#[derive(Debug, Clone)]
pub struct FlakyStore<S> {
    inner: S,
    failing: Arc<AtomicBool>,
}

impl<S: SharedStore> FlakyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn is_failing(&self) -> bool {
        self.failing.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn check(&self, op: &str, key: &str) -> Result<(), StoreError> {
        if self.is_failing() {
            return Err(StoreError::Unavailable(format!("{} '{}' rejected", op, key)));
        }
        Ok(())
    }
}

impl<S: SharedStore> SharedStore for FlakyStore<S> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check("get", key)?;
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check("set", key)?;
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.check("remove", key)?;
        self.inner.remove(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;

    #[test]
    fn test_switch_fails_all_operations() {
        let store = FlakyStore::new(MemoryStore::new());
        store.set("k", "v").unwrap();

        store.set_failing(true);
        assert!(matches!(store.get("k"), Err(StoreError::Unavailable(_))));
        assert!(store.set("k", "w").is_err());
        assert!(store.remove("k").is_err());

        store.set_failing(false);
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    }
}
