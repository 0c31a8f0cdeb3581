//! Error types for fastlease
//!
//! This module defines:
//! - `StoreError`: failures reported by a shared store backend
//! - `LockError`: failures surfaced to a caller waiting on an acquisition

/// Shared store failures
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("io error on key '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("invalid key '{0}'")]
    InvalidKey(String),
}

impl StoreError {
    pub fn io(key: impl Into<String>, source: std::io::Error) -> Self {
        StoreError::Io {
            key: key.into(),
            source,
        }
    }
}

/// Errors delivered to a caller awaiting a lock acquisition.
///
/// Contention (a fresh lease held by someone else, or a claim lost during
/// verification) is never reported here; the acquisition loop absorbs it and
/// retries.
#[derive(thiserror::Error, Debug)]
pub enum LockError {
    #[error("shared store failed: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("lock '{name}' not acquired within {waited_ms} ms")]
    AcquireTimeout { name: String, waited_ms: u64 },

    #[error("acquisition of lock '{0}' was cancelled by release")]
    Cancelled(String),
}

impl LockError {
    /// Whether calling `acquire` again may succeed.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, LockError::Cancelled(_))
    }
}
