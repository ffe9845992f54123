//! Status snapshot for the current run (`.runner/state/status.json`).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::machine::{StateLabel, TransitionRecord, Trigger};
use crate::core::stats::StatsSnapshot;
use crate::core::types::StopReason;

/// One transition with its states rendered as labels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransitionEntry {
    pub tick: u64,
    pub from: String,
    pub to: String,
    pub trigger: Trigger,
}

impl<S: StateLabel> From<&TransitionRecord<S>> for TransitionEntry {
    fn from(record: &TransitionRecord<S>) -> Self {
        Self {
            tick: record.tick,
            from: record.from.to_string(),
            to: record.to.to_string(),
            trigger: record.trigger.clone(),
        }
    }
}

/// What a script exposes to observers while it runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunStatus {
    pub script: String,
    pub run_id: String,
    /// Host loop ticks so far.
    pub ticks: u64,
    /// Current state label, or the last selected task for scheduled scripts.
    pub state: Option<String>,
    pub stats: StatsSnapshot,
    /// Set once the run has stopped.
    pub stop: Option<StopReason>,
    /// Most recent transitions, oldest first.
    pub recent_transitions: Vec<TransitionEntry>,
}

/// Load a status snapshot from disk.
pub fn load_status(path: &Path) -> Result<RunStatus> {
    debug!(path = %path.display(), "loading run status");
    let contents =
        fs::read_to_string(path).with_context(|| format!("read run status {}", path.display()))?;
    let status: RunStatus = serde_json::from_str(&contents)
        .with_context(|| format!("parse run status {}", path.display()))?;
    Ok(status)
}

/// Atomically write the status snapshot (temp file + rename).
pub fn write_status(path: &Path, status: &RunStatus) -> Result<()> {
    debug!(
        path = %path.display(),
        run_id = %status.run_id,
        ticks = status.ticks,
        state = ?status.state,
        "writing run status"
    );
    let mut buf = serde_json::to_string_pretty(status)?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("run status path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp run status {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace run status {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stats::CounterSnapshot;

    fn status() -> RunStatus {
        RunStatus {
            script: "furnace".to_string(),
            run_id: "run-7".to_string(),
            ticks: 42,
            state: Some("DepositingInputs".to_string()),
            stats: StatsSnapshot {
                runtime: "00:01:05".to_string(),
                elapsed_ms: 65_000,
                counters: vec![CounterSnapshot {
                    name: "bars".to_string(),
                    total: 27,
                    per_hour: 1495,
                }],
            },
            stop: Some(StopReason::ResourceExhausted { item: 440 }),
            recent_transitions: vec![TransitionEntry {
                tick: 41,
                from: "WalkingToInputStation".to_string(),
                to: "DepositingInputs".to_string(),
                trigger: Trigger::Confirmed,
            }],
        }
    }

    #[test]
    fn status_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("state").join("status.json");
        let status = status();
        write_status(&path, &status).expect("write");
        assert_eq!(load_status(&path).expect("load"), status);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn stop_reason_is_tagged_in_json() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("status.json");
        write_status(&path, &status()).expect("write");
        let contents = fs::read_to_string(&path).expect("read");
        assert!(contents.contains("\"kind\": \"resource_exhausted\""));
        assert!(contents.contains("\"item\": 440"));
    }
}
