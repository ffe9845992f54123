//! Clock implementations for the host loop and waits.

use std::cell::Cell;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use crate::core::wait::Clock;

/// Wall-clock time; `sleep` blocks the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Deterministic time for simulation and tests.
///
/// Clones share the same timeline, so a simulated world and the script driving
/// it observe the same `now()`. `sleep` advances time instantly.
#[derive(Debug, Clone)]
pub struct VirtualClock {
    origin: Instant,
    offset: Rc<Cell<Duration>>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Rc::new(Cell::new(Duration::ZERO)),
        }
    }

    /// Time elapsed on this timeline since the clock was created.
    pub fn elapsed(&self) -> Duration {
        self.offset.get()
    }

    pub fn advance(&self, by: Duration) {
        self.offset.set(self.offset.get() + by);
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Instant {
        self.origin + self.offset.get()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
