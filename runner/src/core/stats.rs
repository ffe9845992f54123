//! Run statistics: elapsed time, monotonic counters and derived hourly rates.
//!
//! Pure bookkeeping; nothing here influences control flow.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Per-hour rate of `count` over `elapsed`. Zero elapsed time yields zero.
pub fn rate_per_hour(count: u64, elapsed: Duration) -> f64 {
    if elapsed.is_zero() {
        return 0.0;
    }
    count as f64 * SECONDS_PER_HOUR / elapsed.as_secs_f64()
}

/// Format a duration as `HH:MM:SS`. Hours are not wrapped.
pub fn format_runtime(elapsed: Duration) -> String {
    let seconds = elapsed.as_secs();
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds / 60) % 60,
        seconds % 60
    )
}

#[derive(Debug, Clone)]
pub struct RunStats {
    started: Instant,
    counters: BTreeMap<&'static str, u64>,
}

impl RunStats {
    pub fn new(now: Instant) -> Self {
        Self {
            started: now,
            counters: BTreeMap::new(),
        }
    }

    /// Restart the clock and clear every counter.
    pub fn reset(&mut self, now: Instant) {
        self.started = now;
        self.counters.clear();
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started)
    }

    pub fn add(&mut self, counter: &'static str, amount: u64) {
        let value = self.counters.entry(counter).or_insert(0);
        *value = value.saturating_add(amount);
    }

    /// Raise `counter` to `total` if that is higher; never lowers it.
    pub fn record_total(&mut self, counter: &'static str, total: u64) {
        let value = self.counters.entry(counter).or_insert(0);
        *value = (*value).max(total);
    }

    pub fn get(&self, counter: &str) -> u64 {
        self.counters.get(counter).copied().unwrap_or(0)
    }

    pub fn rate_per_hour(&self, counter: &str, now: Instant) -> f64 {
        rate_per_hour(self.get(counter), self.elapsed(now))
    }

    pub fn snapshot(&self, now: Instant) -> StatsSnapshot {
        let elapsed = self.elapsed(now);
        let counters = self
            .counters
            .iter()
            .map(|(name, value)| CounterSnapshot {
                name: (*name).to_string(),
                total: *value,
                per_hour: rate_per_hour(*value, elapsed).floor() as u64,
            })
            .collect();
        StatsSnapshot {
            runtime: format_runtime(elapsed),
            elapsed_ms: elapsed.as_millis() as u64,
            counters,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub runtime: String,
    pub elapsed_ms: u64,
    pub counters: Vec<CounterSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub name: String,
    pub total: u64,
    pub per_hour: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_elapsed_rate_is_zero() {
        assert_eq!(rate_per_hour(0, Duration::ZERO), 0.0);
        assert_eq!(rate_per_hour(250, Duration::ZERO), 0.0);
    }

    #[test]
    fn rate_scales_to_an_hour() {
        assert_eq!(rate_per_hour(27, Duration::from_secs(1800)), 54.0);
    }

    #[test]
    fn runtime_formats_hours_minutes_seconds() {
        assert_eq!(format_runtime(Duration::from_secs(0)), "00:00:00");
        assert_eq!(format_runtime(Duration::from_secs(3 * 3600 + 7 * 60 + 9)), "03:07:09");
        assert_eq!(format_runtime(Duration::from_secs(100 * 3600)), "100:00:00");
    }

    #[test]
    fn counters_are_monotonic() {
        let start = Instant::now();
        let mut stats = RunStats::new(start);
        stats.add("bars", 27);
        stats.record_total("xp", 500);
        stats.record_total("xp", 300);
        assert_eq!(stats.get("bars"), 27);
        assert_eq!(stats.get("xp"), 500);
        assert_eq!(stats.get("missing"), 0);

        let snapshot = stats.snapshot(start + Duration::from_secs(3600));
        assert_eq!(snapshot.runtime, "01:00:00");
        assert_eq!(
            snapshot.counters[0],
            CounterSnapshot {
                name: "bars".to_string(),
                total: 27,
                per_hour: 27,
            }
        );

        stats.reset(start);
        assert_eq!(stats.get("bars"), 0);
    }
}
