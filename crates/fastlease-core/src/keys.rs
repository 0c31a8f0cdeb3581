//! Shared store accessor for one lock name
//!
//! Every lock name owns two keys: the announcement key `<name>-x` and the
//! lease key `<name>-y`.

use fastlease_common::{ANNOUNCE_KEY_SUFFIX, LEASE_KEY_SUFFIX, SharedStore, StoreError};

use crate::identity::ContenderId;
use crate::lease::{Lease, LeaseSnapshot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockKeys {
    name: String,
    announce_key: String,
    lease_key: String,
}

impl LockKeys {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            announce_key: format!("{}{}", name, ANNOUNCE_KEY_SUFFIX),
            lease_key: format!("{}{}", name, LEASE_KEY_SUFFIX),
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn announce_key(&self) -> &str {
        &self.announce_key
    }

    pub fn lease_key(&self) -> &str {
        &self.lease_key
    }

    /// Write `id` into the announcement key
    pub fn announce(&self, store: &dyn SharedStore, id: &ContenderId) -> Result<(), StoreError> {
        store.set(&self.announce_key, id.as_str())
    }

    pub fn announced(&self, store: &dyn SharedStore) -> Result<Option<String>, StoreError> {
        store.get(&self.announce_key)
    }

    /// Write a lease for `id` stamped `now`; used for both claims and refreshes
    pub fn write_lease(
        &self,
        store: &dyn SharedStore,
        id: &ContenderId,
        now: i64,
    ) -> Result<(), StoreError> {
        store.set(&self.lease_key, &Lease::new(id.as_str(), now).to_string())
    }

    pub fn read_lease(&self, store: &dyn SharedStore) -> Result<Option<Lease>, StoreError> {
        let Some(raw) = store.get(&self.lease_key)? else {
            return Ok(None);
        };
        let lease = Lease::parse(&raw);
        if lease.is_none() {
            tracing::warn!(
                lock = %self.name,
                value = %raw,
                "Unparseable lease value, treating lock as free"
            );
        }
        Ok(lease)
    }

    pub fn clear_lease(&self, store: &dyn SharedStore) -> Result<(), StoreError> {
        store.remove(&self.lease_key)
    }

    pub fn snapshot(
        &self,
        store: &dyn SharedStore,
        now: i64,
        max_lock_time_ms: u64,
    ) -> Result<LeaseSnapshot, StoreError> {
        Ok(LeaseSnapshot::new(
            &self.name,
            self.announced(store)?,
            self.read_lease(store)?,
            now,
            max_lock_time_ms,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TokioClock;
    use crate::lease::LeaseState;
    use fastlease_store::MemoryStore;

    #[test]
    fn test_key_names() {
        let keys = LockKeys::new("jobs");
        assert_eq!(keys.name(), "jobs");
        assert_eq!(keys.announce_key(), "jobs-x");
        assert_eq!(keys.lease_key(), "jobs-y");
    }

    #[test]
    fn test_persisted_layout() {
        let store = MemoryStore::new();
        let keys = LockKeys::new("jobs");
        let id = ContenderId::generate(&TokioClock::starting_at(7));

        keys.announce(&store, &id).unwrap();
        keys.write_lease(&store, &id, 1234).unwrap();

        assert_eq!(store.get("jobs-x").unwrap().as_deref(), Some(id.as_str()));
        assert_eq!(
            store.get("jobs-y").unwrap(),
            Some(format!("{},1234", id.as_str()))
        );

        let lease = keys.read_lease(&store).unwrap().unwrap();
        assert!(lease.is_held_by(id.as_str()));

        keys.clear_lease(&store).unwrap();
        assert!(keys.read_lease(&store).unwrap().is_none());
        assert!(keys.announced(&store).unwrap().is_some());
    }

    #[test]
    fn test_garbage_lease_reads_as_free() {
        let store = MemoryStore::new();
        store.set("jobs-y", "garbage").unwrap();

        let keys = LockKeys::new("jobs");
        assert!(keys.read_lease(&store).unwrap().is_none());

        let snapshot = keys.snapshot(&store, 0, 5000).unwrap();
        assert_eq!(snapshot.state, LeaseState::Free);
    }
}
