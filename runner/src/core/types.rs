//! Shared deterministic types for the control-loop core.
//!
//! These types define stable contracts between the engine, the scripts and the
//! host loop. They carry no I/O and serialize to stable JSON for status output.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Numeric identifier of an in-game item.
pub type ItemId = u32;

/// Why a run ended on its own accord (or was asked to end).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopReason {
    /// Required equipment or tool was missing.
    PreconditionFailed { what: String },
    /// A required raw material is absent from both bank and inventory.
    ResourceExhausted { item: ItemId },
    /// The host asked the loop to stop between ticks.
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::PreconditionFailed { what } => write!(f, "precondition failed: {what}"),
            StopReason::ResourceExhausted { item } => write!(f, "resource exhausted: item {item}"),
            StopReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::error::Error for StopReason {}

/// What the host should do after a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    /// Keep going; do not evaluate again sooner than this.
    Continue(Duration),
    /// End the run.
    Stop(StopReason),
}

impl Control {
    pub fn delay(&self) -> Option<Duration> {
        match self {
            Control::Continue(delay) => Some(*delay),
            Control::Stop(_) => None,
        }
    }
}

/// Shorthand used by handlers: `ms(600)`.
pub const fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}
