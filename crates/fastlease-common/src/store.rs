//! Shared store trait
//!
//! The store is the only medium contenders share. It offers plain string
//! get/set/remove with no compare-and-swap; all mutual exclusion is built on
//! top of these three operations.

use std::sync::Arc;

use crate::error::StoreError;

/// Key-value medium shared by every contender of a lock.
///
/// Contract assumed by the lock protocol (not enforced):
/// - a read issued after a write from the same context observes that write;
/// - a write becomes visible to other contexts within a bounded latency no
///   larger than the lock's verification delay.
pub trait SharedStore: Send + Sync {
    /// Read a key, `None` when absent
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a key, replacing any previous value
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a key. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

impl<T: SharedStore + ?Sized> SharedStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key)
    }
}

impl<T: SharedStore + ?Sized> SharedStore for Box<T> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key)
    }
}
