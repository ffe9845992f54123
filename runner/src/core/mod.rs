//! Deterministic logic shared by every script.
//!
//! Core modules perform no I/O. Time is observed and spent only through the
//! injected [`wait::Clock`], so everything here runs against a virtual clock in
//! tests.

pub mod budget;
pub mod machine;
pub mod region;
pub mod scheduler;
pub mod stats;
pub mod types;
pub mod wait;
