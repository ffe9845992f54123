//! `.runner/` scaffolding and canonical paths.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use super::config::{RunnerConfig, write_config};
use super::transition_log::transition_log_path;

/// All canonical paths within `.runner/` for a project root.
#[derive(Debug, Clone)]
pub struct RunnerPaths {
    pub root: PathBuf,
    pub runner_dir: PathBuf,
    pub state_dir: PathBuf,
    pub transitions_dir: PathBuf,
    pub gitignore_path: PathBuf,
    pub config_path: PathBuf,
    pub status_path: PathBuf,
}

impl RunnerPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let runner_dir = root.join(".runner");
        let state_dir = runner_dir.join("state");
        Self {
            root: root.clone(),
            runner_dir: runner_dir.clone(),
            state_dir: state_dir.clone(),
            transitions_dir: runner_dir.join("transitions"),
            gitignore_path: runner_dir.join(".gitignore"),
            config_path: runner_dir.join("config.toml"),
            status_path: state_dir.join("status.json"),
        }
    }

    pub fn transition_log(&self, run_id: &str) -> PathBuf {
        transition_log_path(&self.root, run_id)
    }
}

/// Options for `init_runner`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite existing runner-owned files.
    pub force: bool,
}

/// Create `.runner/` scaffolding in `root` with a default config.
///
/// Fails if `.runner/` already exists unless `options.force` is set.
pub fn init_runner(root: &Path, options: &InitOptions) -> Result<RunnerPaths> {
    let paths = RunnerPaths::new(root);
    if paths.runner_dir.exists() && !paths.runner_dir.is_dir() {
        return Err(anyhow!(
            "runner init: .runner exists but is not a directory"
        ));
    }
    if paths.runner_dir.exists() && !options.force {
        return Err(anyhow!(
            "runner init: .runner already exists (use --force to overwrite)"
        ));
    }

    create_dir(&paths.runner_dir)?;
    create_dir(&paths.state_dir)?;
    create_dir(&paths.transitions_dir)?;

    write_file(&paths.gitignore_path, RUNNER_GITIGNORE)?;
    write_config(&paths.config_path, &RunnerConfig::default())?;

    Ok(paths)
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir(parent)?;
    }
    fs::write(path, contents).with_context(|| format!("write file {}", path.display()))
}

const RUNNER_GITIGNORE: &str = "state/\ntransitions/\n";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::{Recipe, load_config};

    #[test]
    fn init_creates_expected_layout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_runner(temp.path(), &InitOptions { force: false }).expect("init");

        assert!(paths.runner_dir.is_dir());
        assert!(paths.state_dir.is_dir());
        assert!(paths.transitions_dir.is_dir());
        assert!(paths.config_path.is_file());
        assert_eq!(
            fs::read_to_string(&paths.gitignore_path).expect("gitignore"),
            RUNNER_GITIGNORE
        );
        assert_eq!(
            load_config(&paths.config_path).expect("config"),
            RunnerConfig::default()
        );
        assert!(paths.transition_log("run-1").ends_with("transitions/run-1.jsonl"));
    }

    #[test]
    fn init_without_force_refuses_existing_runner_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_runner(temp.path(), &InitOptions { force: false }).expect("init");
        let err = init_runner(temp.path(), &InitOptions { force: false }).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn init_with_force_restores_default_config() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_runner(temp.path(), &InitOptions { force: false }).expect("init");
        let mut custom = RunnerConfig::default();
        custom.furnace.recipe = Recipe::Adamant;
        write_config(&paths.config_path, &custom).expect("write custom");

        init_runner(temp.path(), &InitOptions { force: true }).expect("re-init");
        let cfg = load_config(&paths.config_path).expect("config");
        assert_eq!(cfg.furnace.recipe, Recipe::Steel);
    }
}
