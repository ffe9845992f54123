//! Runner configuration stored under `.runner/config.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Runner configuration (TOML).
///
/// Read once before a run starts and passed by value into each script; never
/// mutated while a run is in progress. Missing fields take the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunnerConfig {
    pub tick: TickConfig,
    pub timeouts: Timeouts,
    pub retries: RetryConfig,
    pub furnace: FurnaceConfig,
    pub serum: SerumConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TickConfig {
    /// Pause when no task admits.
    pub idle_delay_ms: u64,
    /// Granularity of every bounded wait.
    pub poll_interval_ms: u64,
    /// Write the status snapshot every N ticks (and always on stop).
    pub status_every_ticks: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            idle_delay_ms: 600,
            poll_interval_ms: 50,
            status_every_ticks: 10,
        }
    }
}

/// Per-interaction wait budgets, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Timeouts {
    pub quick_check_ms: u64,
    pub bank_open_ms: u64,
    pub item_ms: u64,
    pub deposit_ms: u64,
    pub travel_ms: u64,
    pub collector_ms: u64,
    pub dialogue_ms: u64,
    pub teleport_ms: u64,
    /// Longest stay in a collecting state before regressing.
    pub collect_dwell_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            quick_check_ms: 1200,
            bank_open_ms: 5000,
            item_ms: 2000,
            deposit_ms: 5000,
            travel_ms: 5000,
            collector_ms: 3000,
            dialogue_ms: 2000,
            teleport_ms: 5000,
            collect_dwell_ms: 30_000,
        }
    }
}

impl Timeouts {
    fn all(&self) -> [(&'static str, u64); 9] {
        [
            ("quick_check_ms", self.quick_check_ms),
            ("bank_open_ms", self.bank_open_ms),
            ("item_ms", self.item_ms),
            ("deposit_ms", self.deposit_ms),
            ("travel_ms", self.travel_ms),
            ("collector_ms", self.collector_ms),
            ("dialogue_ms", self.dialogue_ms),
            ("teleport_ms", self.teleport_ms),
            ("collect_dwell_ms", self.collect_dwell_ms),
        ]
    }
}

/// In-place retries per pipeline stage before regressing to its recovery state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    pub banking: u32,
    pub walking: u32,
    pub depositing: u32,
    pub collecting: u32,
    pub teleport: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            banking: 3,
            walking: 2,
            depositing: 1,
            collecting: 3,
            teleport: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Recipe {
    Steel,
    Adamant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FurnaceConfig {
    pub recipe: Recipe,
    /// Drink a stamina dose at or below this run energy.
    pub stamina_threshold: u8,
    /// Equipment that must be worn when the run starts.
    pub required_equipment: Vec<String>,
}

impl Default for FurnaceConfig {
    fn default() -> Self {
        Self {
            recipe: Recipe::Steel,
            stamina_threshold: 30,
            required_equipment: vec!["Ice gloves".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SerumConfig {
    /// Clean grimy herbs as they are collected.
    pub clean_herbs: bool,
    /// Withdraw serum ingredients and combine them with cleaned herbs.
    pub make_serums: bool,
}

impl Default for SerumConfig {
    fn default() -> Self {
        Self {
            clean_herbs: true,
            make_serums: true,
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            tick: TickConfig::default(),
            timeouts: Timeouts::default(),
            retries: RetryConfig::default(),
            furnace: FurnaceConfig::default(),
            serum: SerumConfig::default(),
        }
    }
}

impl RunnerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tick.idle_delay_ms == 0 {
            return Err(anyhow!("tick.idle_delay_ms must be > 0"));
        }
        if self.tick.poll_interval_ms == 0 {
            return Err(anyhow!("tick.poll_interval_ms must be > 0"));
        }
        if self.tick.status_every_ticks == 0 {
            return Err(anyhow!("tick.status_every_ticks must be > 0"));
        }
        for (name, value) in self.timeouts.all() {
            if value == 0 {
                return Err(anyhow!("timeouts.{name} must be > 0"));
            }
            if value < self.tick.poll_interval_ms {
                return Err(anyhow!(
                    "timeouts.{name} ({value}) must not be shorter than tick.poll_interval_ms ({})",
                    self.tick.poll_interval_ms
                ));
            }
        }
        if self.furnace.stamina_threshold > 100 {
            return Err(anyhow!("furnace.stamina_threshold must be <= 100"));
        }
        if self
            .furnace
            .required_equipment
            .iter()
            .any(|name| name.trim().is_empty())
        {
            return Err(anyhow!("furnace.required_equipment entries must be non-empty"));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.tick.poll_interval_ms)
    }

    pub fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.tick.idle_delay_ms)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RunnerConfig::default()`.
pub fn load_config(path: &Path) -> Result<RunnerConfig> {
    if !path.exists() {
        let cfg = RunnerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RunnerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RunnerConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, RunnerConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let mut cfg = RunnerConfig::default();
        cfg.furnace.recipe = Recipe::Adamant;
        cfg.serum.make_serums = false;
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "[timeouts]\ndeposit_ms = 8000\n\n[serum]\nclean_herbs = false\n")
            .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.timeouts.deposit_ms, 8000);
        assert_eq!(cfg.timeouts.travel_ms, Timeouts::default().travel_ms);
        assert!(!cfg.serum.clean_herbs);
        assert!(cfg.serum.make_serums);
    }

    #[test]
    fn validate_rejects_timeout_shorter_than_poll() {
        let mut cfg = RunnerConfig::default();
        cfg.tick.poll_interval_ms = 2000;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("quick_check_ms"));
    }

    #[test]
    fn validate_rejects_zero_poll_interval() {
        let mut cfg = RunnerConfig::default();
        cfg.tick.poll_interval_ms = 0;
        assert!(cfg.validate().is_err());
    }
}
