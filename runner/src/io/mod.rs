//! Side-effecting adapters: clocks, the game-client boundary, and `.runner/` files.

pub mod client;
pub mod clock;
pub mod config;
pub mod init;
pub mod run_state;
pub mod transition_log;
