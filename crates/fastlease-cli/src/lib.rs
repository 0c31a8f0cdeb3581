//! Fastlease CLI - hold, run under, inspect and break locks kept in a shared
//! directory, plus an in-process contention simulator.

pub mod commands;
pub mod config;
pub mod logging;
