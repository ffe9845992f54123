//! Deterministic resource-gathering control loops.
//!
//! Each script drives a game client through repeated bank, travel, deposit
//! and collect cycles. The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (transition tables, task
//!   selection, bounded waits, regions, stats). No I/O, time only through an
//!   injected clock.
//! - **[`io`]**: Side-effecting operations (client traits, clocks, config,
//!   run records on disk). Isolated to enable simulation in tests.
//! - **[`scripts`]**: The furnace, collector and serum variants built on the
//!   core engine.
//! - **[`sim`]**: A deterministic game world implementing every client trait.
//!
//! Orchestration modules ([`start`], [`looping`]) coordinate scripts with
//! I/O to implement CLI commands.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
pub mod scripts;
pub mod sim;
pub mod start;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
