//! Orchestration for starting a new run.
//!
//! A "run" is a single script execution identified by a `run_id`. Starting a
//! run ensures `.runner/` scaffolding exists, loads and validates the config,
//! picks an id with no transition log yet, and calls the script's `start`
//! hook. A failed precondition is recorded in the status snapshot before the
//! run is abandoned.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, warn};

use crate::core::types::StopReason;
use crate::io::config::{RunnerConfig, load_config};
use crate::io::init::{InitOptions, RunnerPaths, init_runner};
use crate::looping::Recorder;
use crate::scripts::Script;

/// Outcome of preparing a run.
#[derive(Debug, Clone)]
pub struct StartOutcome {
    pub run_id: String,
    pub paths: RunnerPaths,
    pub config: RunnerConfig,
}

/// Prepare a run of `script` in `root`.
///
/// - Ensures `.runner/` scaffolding exists (runs `init` if missing).
/// - Ensures `.runner/.gitignore` ignores the run records.
/// - Loads and validates `.runner/config.toml`.
/// - Generates a run id unique among existing transition logs.
pub fn prepare_run(root: &Path, script: &str) -> Result<StartOutcome> {
    debug!(root = %root.display(), script, "preparing run");
    let paths = RunnerPaths::new(root);
    if !paths.runner_dir.exists() {
        init_runner(root, &InitOptions { force: false }).context("runner init")?;
    }
    ensure_runner_gitignore(&paths.gitignore_path)?;

    let config = load_config(&paths.config_path)
        .with_context(|| format!("load {}", paths.config_path.display()))?;
    config.validate()?;

    let run_id = generate_run_id(&paths, script)?;
    info!(run_id = %run_id, "generated run id");
    Ok(StartOutcome {
        run_id,
        paths,
        config,
    })
}

/// Call the script's `start` hook. A precondition failure is written to the
/// status snapshot and returned as `Ok(Some(reason))`.
pub fn start_script<S: Script + ?Sized>(
    script: &mut S,
    recorder: &Recorder,
) -> Result<Option<StopReason>> {
    match script.start() {
        Ok(()) => {
            info!(script = script.name(), run_id = %recorder.run_id(), "run started");
            recorder.record(script, 0, None)?;
            Ok(None)
        }
        Err(reason) => {
            warn!(script = script.name(), reason = %reason, "run refused to start");
            recorder.record(script, 0, Some(&reason))?;
            Ok(Some(reason))
        }
    }
}

fn generate_run_id(paths: &RunnerPaths, script: &str) -> Result<String> {
    for suffix in 1..=999u32 {
        let id = format!("{script}-{suffix}");
        if !paths.transition_log(&id).exists() {
            return Ok(id);
        }
    }

    Err(anyhow!(
        "unable to generate unique run id for '{script}' (too many existing transition logs)"
    ))
}

fn ensure_runner_gitignore(path: &Path) -> Result<()> {
    const REQUIRED_LINES: [&str; 2] = ["state/", "transitions/"];

    let mut existing = String::new();
    if path.exists() {
        existing =
            std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    }

    let mut lines: Vec<String> = existing
        .lines()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect();

    for req in REQUIRED_LINES {
        if !lines.iter().any(|l| l == req) {
            lines.push(req.to_string());
        }
    }

    // Stable ordering.
    lines.sort();
    lines.dedup();

    let mut out = lines.join("\n");
    out.push('\n');

    if out != existing {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        std::fs::write(path, out).with_context(|| format!("write {}", path.display()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::run_state::load_status;
    use crate::io::transition_log::append_transitions;
    use crate::scripts::collector::CollectorScript;
    use crate::sim::SimWorld;
    use crate::core::region::Tile;
    use crate::io::clock::VirtualClock;

    #[test]
    fn prepare_initialises_missing_scaffolding() {
        let temp = tempfile::tempdir().expect("tempdir");
        let run = prepare_run(temp.path(), "furnace").expect("prepare");
        assert_eq!(run.run_id, "furnace-1");
        assert!(run.paths.config_path.exists());
        let ignore = std::fs::read_to_string(&run.paths.gitignore_path).expect("gitignore");
        assert_eq!(ignore, "state/\ntransitions/\n");
    }

    #[test]
    fn run_ids_skip_existing_logs() {
        let temp = tempfile::tempdir().expect("tempdir");
        let first = prepare_run(temp.path(), "serum").expect("prepare");
        append_transitions(
            &first.paths.transition_log(&first.run_id),
            &[crate::io::run_state::TransitionEntry {
                tick: 1,
                from: "Plan".to_string(),
                to: "WalkToRing".to_string(),
                trigger: crate::core::machine::Trigger::Confirmed,
            }],
        )
        .expect("append");
        let second = prepare_run(temp.path(), "serum").expect("prepare");
        assert_eq!(second.run_id, "serum-2");
    }

    #[test]
    fn invalid_config_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_runner(temp.path(), &InitOptions { force: false }).expect("init");
        std::fs::write(&paths.config_path, "[tick]\npoll_interval_ms = 0\n").expect("write");
        let err = prepare_run(temp.path(), "furnace").unwrap_err();
        assert!(format!("{err:#}").contains("poll_interval_ms"));
    }

    #[test]
    fn precondition_failure_is_recorded_in_status() {
        let temp = tempfile::tempdir().expect("tempdir");
        let run = prepare_run(temp.path(), "collector").expect("prepare");
        let clock = VirtualClock::new();
        let world = SimWorld::new(clock.clone(), Tile::new(3165, 3487));
        let mut script = CollectorScript::new(world, clock, &run.config).expect("script");
        let recorder = Recorder::new(&run.paths, "collector", &run.run_id, 10);

        let refused = start_script(&mut script, &recorder).expect("start");
        assert!(matches!(refused, Some(StopReason::PreconditionFailed { .. })));

        let status = load_status(&run.paths.status_path).expect("status");
        assert_eq!(status.stop, refused);
        assert_eq!(status.state.as_deref(), Some("Banking"));
    }
}
