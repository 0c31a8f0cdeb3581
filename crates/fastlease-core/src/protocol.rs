//! Fast-lock acquisition rounds
//!
//! One round of Lamport's fast mutual exclusion, adapted to a lease:
//!
//! 1. announce own id in X
//! 2. read Y; a fresh lease means someone else holds the lock
//! 3. claim Y with own id and the current time
//! 4. read X; still own id means nobody announced since step 1
//!
//! When step 4 sees another id the caller must wait the verification delay
//! and settle the claim with [`verify_claim`]. Every function here is
//! synchronous: a round never suspends between its reads and writes.

use fastlease_common::{SharedStore, StoreError};

use crate::clock::Clock;
use crate::identity::ContenderId;
use crate::keys::LockKeys;
use crate::metrics;

/// Outcome of one round
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Round {
    /// A fresh lease is held by another contender; retry later
    Busy { holder: String },
    /// Claim stands and no other announcement was seen
    Acquired,
    /// Claim written but another contender announced after us
    Contended { announced: String },
}

/// Run steps 1 to 4 once
pub fn attempt(
    keys: &LockKeys,
    store: &dyn SharedStore,
    clock: &dyn Clock,
    id: &ContenderId,
    max_lock_time_ms: u64,
) -> Result<Round, StoreError> {
    keys.announce(store, id)?;

    if let Some(lease) = keys.read_lease(store)? {
        let now = clock.now_millis();
        if lease.is_fresh(now, max_lock_time_ms) {
            return Ok(Round::Busy {
                holder: lease.holder,
            });
        }
        if lease.is_future_dated(now, max_lock_time_ms) {
            tracing::warn!(
                lock = %keys.name(),
                holder = %lease.holder,
                age_ms = lease.age_ms(now),
                "Lease dated beyond one lifetime ahead of local clock, treating lock as free"
            );
        } else {
            tracing::debug!(
                lock = %keys.name(),
                holder = %lease.holder,
                age_ms = lease.age_ms(now),
                "Stale lease observed, treating lock as free"
            );
        }
        ::metrics::counter!(metrics::STALE_LEASES_TOTAL, "lock" => keys.name().to_string())
            .increment(1);
    }

    keys.write_lease(store, id, clock.now_millis())?;

    match keys.announced(store)? {
        Some(announced) if announced == id.as_str() => Ok(Round::Acquired),
        Some(announced) => Ok(Round::Contended { announced }),
        // X vanished underneath us; someone else is interfering
        None => Ok(Round::Contended {
            announced: String::new(),
        }),
    }
}

/// After the verification delay: does our claim still stand?
pub fn verify_claim(
    keys: &LockKeys,
    store: &dyn SharedStore,
    id: &ContenderId,
) -> Result<bool, StoreError> {
    Ok(keys
        .read_lease(store)?
        .is_some_and(|lease| lease.is_held_by(id.as_str())))
}
