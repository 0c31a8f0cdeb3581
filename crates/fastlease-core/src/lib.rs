//! Fastlease Core - lease-backed fast mutual exclusion
//!
//! This crate provides:
//! - Lamport's fast mutex rounds over a shared key-value store
//! - Lease heartbeats so a crashed holder frees the lock after a bound
//! - Lock handles with cancellable acquisition and atomic release
//! - Lease inspection helpers
//!
//! The store only needs per-key atomic get, set and remove. Two keys are
//! used per lock name: `<name>-x` carries the last announced contender and
//! `<name>-y` carries the lease as `"<holder>,<unix millis>"`.

pub mod clock;
pub mod config;
mod handle;
pub mod identity;
pub mod keys;
pub mod lease;
pub mod metrics;
pub mod protocol;
mod refresher;

pub use clock::{Clock, SystemClock, TokioClock};
pub use config::{AcquireParams, LockConfig};
pub use handle::{Acquisition, LockHandle, LockHandleBuilder};
pub use identity::ContenderId;
pub use keys::LockKeys;
pub use lease::{Lease, LeaseSnapshot, LeaseState};

pub use fastlease_common::{LockError, SharedStore, StoreError};
