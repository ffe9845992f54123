//! Host control loop for `gather-runner simulate`.
//!
//! One script step per tick, then a sleep for the delay the step returned.
//! Cancellation is checked between ticks only, so an in-flight wait always
//! runs to its own deadline first.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use tracing::{debug, info};

use crate::core::types::{Control, StopReason};
use crate::core::wait::Clock;
use crate::io::init::RunnerPaths;
use crate::io::run_state::{RunStatus, write_status};
use crate::io::transition_log::append_transitions;
use crate::scripts::Script;

/// Reason why `run_loop` stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// The script stopped itself (resource exhausted, unmet precondition).
    Halted(StopReason),
    /// The cancel flag was raised between ticks.
    Cancelled,
    /// The configured tick limit was reached.
    MaxTicks,
}

impl LoopStop {
    /// Reason recorded in the status snapshot. Reaching the tick limit is not a stop reason.
    pub fn reason(&self) -> Option<StopReason> {
        match self {
            LoopStop::Halted(reason) => Some(reason.clone()),
            LoopStop::Cancelled => Some(StopReason::Cancelled),
            LoopStop::MaxTicks => None,
        }
    }
}

/// Summary of a loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub ticks: u64,
    pub stop: LoopStop,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopLimits {
    /// Stop after this many ticks. `None` runs until the script stops itself.
    pub max_ticks: Option<u64>,
}

/// Persists the status snapshot and transition log of one run.
#[derive(Debug, Clone)]
pub struct Recorder {
    status_path: PathBuf,
    log_path: PathBuf,
    script: String,
    run_id: String,
    status_every: u64,
}

impl Recorder {
    pub fn new(paths: &RunnerPaths, script: &str, run_id: &str, status_every: u64) -> Self {
        Self {
            status_path: paths.status_path.clone(),
            log_path: paths.transition_log(run_id),
            script: script.to_string(),
            run_id: run_id.to_string(),
            status_every: status_every.max(1),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Append new transitions and write the status snapshot.
    pub fn record<S: Script + ?Sized>(
        &self,
        script: &mut S,
        ticks: u64,
        stop: Option<&StopReason>,
    ) -> Result<()> {
        let entries = script.take_transitions();
        append_transitions(&self.log_path, &entries)?;
        let status = script.status();
        write_status(
            &self.status_path,
            &RunStatus {
                script: self.script.clone(),
                run_id: self.run_id.clone(),
                ticks,
                state: status.state,
                stats: status.stats,
                stop: stop.cloned(),
                recent_transitions: status.recent,
            },
        )
    }

    /// Like [`Recorder::record`], but only writes the snapshot every
    /// `status_every` ticks. Transitions are always appended.
    pub fn record_tick<S: Script + ?Sized>(&self, script: &mut S, ticks: u64) -> Result<()> {
        if ticks % self.status_every == 0 {
            return self.record(script, ticks, None);
        }
        let entries = script.take_transitions();
        append_transitions(&self.log_path, &entries)
    }
}

/// Step a started script until it stops itself, the tick limit is reached,
/// or `cancel` is raised.
///
/// The final status snapshot is always written, so a fatal stop leaves the
/// last known state visible.
pub fn run_loop<S, K>(
    script: &mut S,
    clock: &K,
    limits: &LoopLimits,
    cancel: &AtomicBool,
    recorder: &Recorder,
) -> Result<LoopOutcome>
where
    S: Script + ?Sized,
    K: Clock,
{
    let mut ticks = 0u64;
    let stop = loop {
        if cancel.load(Ordering::SeqCst) {
            break LoopStop::Cancelled;
        }
        if limits.max_ticks.is_some_and(|max| ticks >= max) {
            break LoopStop::MaxTicks;
        }
        ticks += 1;
        match script.step() {
            Control::Continue(delay) => {
                recorder.record_tick(script, ticks)?;
                debug!(tick = ticks, delay_ms = delay.as_millis() as u64, "tick");
                clock.sleep(delay);
            }
            Control::Stop(reason) => break LoopStop::Halted(reason),
        }
    };

    script.stop();
    recorder.record(script, ticks, stop.reason().as_ref())?;
    info!(script = script.name(), ticks, stop = ?stop, "loop finished");
    Ok(LoopOutcome { ticks, stop })
}
