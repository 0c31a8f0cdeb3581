//! Fastlease Store - shared store backends
//!
//! This crate provides:
//! - `MemoryStore`: process-local store, shared by cloning
//! - `DirStore`: one file per key in a directory shared between processes
//! - `LaggedMedium` / `LaggedStore`: per-context views with injected write latency
//! - `FlakyStore`: wrapper that can be switched into a failing state

mod dir;
mod flaky;
mod lagged;
mod memory;

pub use dir::DirStore;
pub use flaky::FlakyStore;
pub use lagged::{LaggedMedium, LaggedStore};
pub use memory::MemoryStore;

pub use fastlease_common::{SharedStore, StoreError};
