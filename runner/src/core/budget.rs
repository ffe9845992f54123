//! Retry and deadline bookkeeping for state handlers.

use std::time::{Duration, Instant};

/// Counts failures in the current state against a fixed allowance.
///
/// `retries` is the number of in-place retries permitted; the failure after
/// that exhausts the budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    retries: u32,
    failures: u32,
}

impl RetryBudget {
    pub fn new(retries: u32) -> Self {
        Self {
            retries,
            failures: 0,
        }
    }

    /// Record a failure. Returns `true` when the allowance is used up.
    pub fn record_failure(&mut self) -> bool {
        self.failures = self.failures.saturating_add(1);
        self.failures > self.retries
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn reset(&mut self, retries: u32) {
        self.retries = retries;
        self.failures = 0;
    }
}

/// Minimum spacing between repeated interactions.
#[derive(Debug, Clone, Copy)]
pub struct Cooldown {
    spacing: Duration,
    last: Option<Instant>,
}

impl Cooldown {
    pub fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            last: None,
        }
    }

    pub fn ready(&self, now: Instant) -> bool {
        match self.last {
            Some(last) => now.saturating_duration_since(last) >= self.spacing,
            None => true,
        }
    }

    pub fn mark(&mut self, now: Instant) {
        self.last = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_exhausts_after_retries() {
        let mut budget = RetryBudget::new(2);
        assert!(!budget.record_failure());
        assert!(!budget.record_failure());
        assert!(budget.record_failure());
        budget.reset(0);
        assert_eq!(budget.failures(), 0);
        assert!(budget.record_failure());
    }

    #[test]
    fn cooldown_spaces_interactions() {
        let start = Instant::now();
        let mut cooldown = Cooldown::new(Duration::from_millis(1200));
        assert!(cooldown.ready(start));
        cooldown.mark(start);
        assert!(!cooldown.ready(start + Duration::from_millis(1199)));
        assert!(cooldown.ready(start + Duration::from_millis(1200)));
    }
}
