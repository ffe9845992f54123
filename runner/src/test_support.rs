//! Test-only helpers: simulated script fixtures and a tick driver.

use anyhow::Result;
use tempfile::TempDir;

use crate::core::types::{Control, StopReason};
use crate::io::clock::VirtualClock;
use crate::io::config::{Recipe, RunnerConfig};
use crate::io::init::{InitOptions, RunnerPaths, init_runner};
use crate::scripts::Script;
use crate::scripts::collector::CollectorScript;
use crate::scripts::furnace::FurnaceScript;
use crate::scripts::serum::SerumScript;
use crate::sim::{SimWorld, collector_world, furnace_world, serum_world};

pub type SimFurnace = FurnaceScript<SimWorld<VirtualClock>, VirtualClock>;
pub type SimCollector = CollectorScript<SimWorld<VirtualClock>, VirtualClock>;
pub type SimSerum = SerumScript<SimWorld<VirtualClock>, VirtualClock>;

/// How [`tick_until`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ticked {
    /// The condition held after this many ticks.
    Reached(u64),
    /// The script stopped itself before the condition held.
    Stopped(StopReason),
    /// The tick allowance ran out.
    Exhausted,
}

/// Step `script` until `done` holds, advancing the virtual clock by each
/// returned delay.
pub fn tick_until<S: Script>(
    script: &mut S,
    clock: &VirtualClock,
    max_ticks: u64,
    mut done: impl FnMut(&S) -> bool,
) -> Ticked {
    for tick in 1..=max_ticks {
        match script.step() {
            Control::Continue(delay) => clock.advance(delay),
            Control::Stop(reason) => return Ticked::Stopped(reason),
        }
        if done(script) {
            return Ticked::Reached(tick);
        }
    }
    Ticked::Exhausted
}

pub fn furnace_script(recipe: Recipe, loads: u32) -> (VirtualClock, SimFurnace) {
    let clock = VirtualClock::new();
    let mut cfg = RunnerConfig::default();
    cfg.furnace.recipe = recipe;
    let world = furnace_world(clock.clone(), recipe, loads);
    let script = match FurnaceScript::new(world, clock.clone(), &cfg) {
        Ok(script) => script,
        Err(err) => panic!("furnace table must compile: {err:#}"),
    };
    (clock, script)
}

pub fn collector_script() -> (VirtualClock, SimCollector) {
    let clock = VirtualClock::new();
    let world = collector_world(clock.clone());
    let script = match CollectorScript::new(world, clock.clone(), &RunnerConfig::default()) {
        Ok(script) => script,
        Err(err) => panic!("collector table must compile: {err:#}"),
    };
    (clock, script)
}

pub fn serum_script(cfg: &RunnerConfig, sets: u32) -> (VirtualClock, SimSerum) {
    let clock = VirtualClock::new();
    let world = serum_world(clock.clone(), sets);
    let script = match SerumScript::new(world, clock.clone(), cfg) {
        Ok(script) => script,
        Err(err) => panic!("serum travel table must compile: {err:#}"),
    };
    (clock, script)
}

/// A temp directory with a freshly initialised `.runner/`.
pub fn initialized_root() -> Result<(TempDir, RunnerPaths)> {
    let dir = tempfile::tempdir()?;
    let paths = init_runner(dir.path(), &InitOptions { force: false })?;
    Ok((dir, paths))
}
