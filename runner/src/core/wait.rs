//! Bounded polling waits.
//!
//! Every synchronization point against the game world goes through
//! [`WaitCondition`]: evaluate a predicate, sleep one poll interval through the
//! injected [`Clock`], repeat until the predicate holds or the deadline passes.
//! A `false` result is not an error; callers pick a recovery path.

use std::time::{Duration, Instant};

use tracing::trace;

/// Minimum poll step. A zero interval would spin without advancing a virtual clock.
const MIN_POLL: Duration = Duration::from_millis(1);

/// Source of time for waits and the host loop.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

impl<K: Clock + ?Sized> Clock for &K {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration);
    }
}

/// Poll interval plus deadline. Stateless between calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitCondition {
    pub poll: Duration,
    pub timeout: Duration,
}

impl WaitCondition {
    pub fn new(poll: Duration, timeout: Duration) -> Self {
        Self {
            poll: poll.max(MIN_POLL),
            timeout,
        }
    }

    /// Return `true` the first time `predicate` holds, or `false` once the
    /// timeout has elapsed without it holding.
    ///
    /// The final sleep is clipped to the deadline, so the call returns no later
    /// than `timeout` plus the cost of one predicate evaluation.
    pub fn until<K: Clock, P: FnMut() -> bool>(&self, clock: &K, mut predicate: P) -> bool {
        let deadline = clock.now() + self.timeout;
        loop {
            if predicate() {
                return true;
            }
            let now = clock.now();
            let Some(remaining) = deadline.checked_duration_since(now) else {
                break;
            };
            if remaining.is_zero() {
                break;
            }
            clock.sleep(self.poll.min(remaining));
        }
        trace!(timeout_ms = self.timeout.as_millis() as u64, "wait condition timed out");
        false
    }
}

/// Free-function form of [`WaitCondition::until`].
pub fn wait_until<K: Clock, P: FnMut() -> bool>(
    clock: &K,
    poll: Duration,
    timeout: Duration,
    predicate: P,
) -> bool {
    WaitCondition::new(poll, timeout).until(clock, predicate)
}
