//! Fastlease Common - Shared types, traits, and constants
//!
//! This crate provides the foundational types used across all fastlease components:
//! - Error types
//! - The `SharedStore` trait every backend implements
//! - Key naming and timing constants

pub mod error;
pub mod store;

// Re-exports for convenience
pub use error::{LockError, StoreError};
pub use store::SharedStore;

/// Suffix of the announcement key (`<name>-x`)
pub const ANNOUNCE_KEY_SUFFIX: &str = "-x";

/// Suffix of the lease key (`<name>-y`)
pub const LEASE_KEY_SUFFIX: &str = "-y";

/// Separator between holder id and timestamp in a lease value
pub const LEASE_SEPARATOR: char = ',';

/// Default lease lifetime without a refresh
pub const DEFAULT_MAX_LOCK_TIME_MS: u64 = 5000;

/// Default heartbeat interval
pub const DEFAULT_REFRESH_TIME_MS: u64 = 1000;

/// Worst-case time for a store write to become visible to other contexts
pub const DEFAULT_VERIFY_DELAY_MS: u64 = 100;

/// Upper bound (exclusive) of the initial random delay before the first attempt
pub const DEFAULT_MAX_JITTER_MS: u64 = 2000;
