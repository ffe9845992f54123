//! Stable exit codes for runner CLI commands.

/// Command succeeded, or a simulated run ended by tick limit or cancellation.
pub const OK: i32 = 0;
/// Invalid layout, config or arguments, or any other error.
pub const INVALID: i32 = 1;
/// A script's hard precondition (equipment, teleport staff) was not met.
pub const PRECONDITION: i32 = 2;
/// A script stopped because a required raw material ran out.
pub const EXHAUSTED: i32 = 3;
