//! Append-only transition log under `.runner/transitions/`.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::run_state::TransitionEntry;

/// `.runner/transitions/<run-id>.jsonl` for `root`.
pub fn transition_log_path(root: &Path, run_id: &str) -> PathBuf {
    root.join(".runner")
        .join("transitions")
        .join(format!("{run_id}.jsonl"))
}

/// Append one JSON line per entry. Creates the file and its directory on first use.
pub fn append_transitions(path: &Path, entries: &[TransitionEntry]) -> Result<()> {
    if entries.is_empty() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut buf = String::new();
    for entry in entries {
        buf.push_str(&serde_json::to_string(entry).context("serialize transition")?);
        buf.push('\n');
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open transition log {}", path.display()))?;
    file.write_all(buf.as_bytes())
        .with_context(|| format!("append transition log {}", path.display()))
}

/// Read every entry back, in write order.
pub fn read_transitions(path: &Path) -> Result<Vec<TransitionEntry>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read transition log {}", path.display()))?;
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(idx, line)| {
            serde_json::from_str(line).with_context(|| {
                format!("parse transition log {} line {}", path.display(), idx + 1)
            })
        })
        .collect()
}
