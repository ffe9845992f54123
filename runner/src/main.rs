//! Resource-gathering script runner.
//!
//! Manages `.runner/` (config, status snapshot, transition logs) and drives
//! the furnace, collector and serum scripts against a simulated game world.

use std::path::Path;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use gather_runner::core::types::StopReason;
use gather_runner::core::wait::Clock;
use gather_runner::exit_codes;
use gather_runner::io::clock::{SystemClock, VirtualClock};
use gather_runner::io::config::{RunnerConfig, load_config};
use gather_runner::io::init::{InitOptions, RunnerPaths, init_runner};
use gather_runner::logging;
use gather_runner::looping::{LoopLimits, LoopStop, Recorder, run_loop};
use gather_runner::scripts::collector::CollectorScript;
use gather_runner::scripts::furnace::FurnaceScript;
use gather_runner::scripts::serum::SerumScript;
use gather_runner::scripts::{Script, ScriptKind};
use gather_runner::sim::{collector_world, furnace_world, serum_world};
use gather_runner::start::{prepare_run, start_script};

#[derive(Parser)]
#[command(
    name = "gather-runner",
    version,
    about = "Resource-gathering control loops over a simulated game world"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.runner/` with a default config.
    Init {
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },
    /// Load and validate `.runner/config.toml`.
    Validate,
    /// Run a script against the simulated world.
    Simulate {
        /// furnace, collector or serum.
        script: ScriptKind,
        /// Stop after this many ticks.
        #[arg(long, default_value_t = 2000)]
        ticks: u64,
        /// Furnace loads or serum ingredient sets stocked in the bank.
        #[arg(long, default_value_t = 3)]
        stock: u32,
        /// Sleep in real time instead of advancing a virtual clock.
        ///
        /// Interrupting the process skips the final status snapshot; the last
        /// periodic one (every `status_every_ticks`) is left in place.
        #[arg(long)]
        realtime: bool,
    },
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let root = std::env::current_dir().context("resolve working directory")?;
    match cli.command {
        Command::Init { force } => cmd_init(&root, force),
        Command::Validate => cmd_validate(&root),
        Command::Simulate {
            script,
            ticks,
            stock,
            realtime,
        } => {
            let limits = LoopLimits {
                max_ticks: Some(ticks),
            };
            if realtime {
                cmd_simulate(&root, script, SystemClock, stock, &limits)
            } else {
                cmd_simulate(&root, script, VirtualClock::new(), stock, &limits)
            }
        }
    }
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let paths = init_runner(root, &InitOptions { force })?;
    println!("initialised {}", paths.runner_dir.display());
    Ok(exit_codes::OK)
}

fn cmd_validate(root: &Path) -> Result<i32> {
    let paths = RunnerPaths::new(root);
    load_config(&paths.config_path)?;
    println!("config ok");
    Ok(exit_codes::OK)
}

fn build_script<K>(kind: ScriptKind, clock: &K, cfg: &RunnerConfig, stock: u32) -> Result<Box<dyn Script>>
where
    K: Clock + Clone + 'static,
{
    let script: Box<dyn Script> = match kind {
        ScriptKind::Furnace => {
            let world = furnace_world(clock.clone(), cfg.furnace.recipe, stock);
            Box::new(FurnaceScript::new(world, clock.clone(), cfg)?)
        }
        ScriptKind::Collector => {
            let world = collector_world(clock.clone());
            Box::new(CollectorScript::new(world, clock.clone(), cfg)?)
        }
        ScriptKind::Serum => {
            let world = serum_world(clock.clone(), stock);
            Box::new(SerumScript::new(world, clock.clone(), cfg)?)
        }
    };
    Ok(script)
}

fn cmd_simulate<K>(root: &Path, kind: ScriptKind, clock: K, stock: u32, limits: &LoopLimits) -> Result<i32>
where
    K: Clock + Clone + 'static,
{
    let run = prepare_run(root, kind.as_str())?;
    let mut script = build_script(kind, &clock, &run.config, stock)?;
    let recorder = Recorder::new(
        &run.paths,
        kind.as_str(),
        &run.run_id,
        run.config.tick.status_every_ticks,
    );

    if let Some(reason) = start_script(script.as_mut(), &recorder)? {
        println!("{kind} run {}: not started: {reason}", run.run_id);
        return Ok(exit_code_for(&reason));
    }

    // No signal handler is installed: a run ends by stopping itself or at the
    // tick limit.
    let cancel = AtomicBool::new(false);
    let outcome = run_loop(script.as_mut(), &clock, limits, &cancel, &recorder)?;

    let status = script.status();
    let counters: Vec<String> = status
        .stats
        .counters
        .iter()
        .map(|counter| format!("{}={} ({}/h)", counter.name, counter.total, counter.per_hour))
        .collect();
    let stopped = match &outcome.stop {
        LoopStop::Halted(reason) => reason.to_string(),
        LoopStop::Cancelled => "cancelled".to_string(),
        LoopStop::MaxTicks => "tick limit".to_string(),
    };
    println!(
        "{kind} run {}: {} ticks, {} elapsed, state {}, {}; stopped: {stopped}",
        run.run_id,
        outcome.ticks,
        status.stats.runtime,
        status.state.as_deref().unwrap_or("-"),
        counters.join(", "),
    );

    Ok(match &outcome.stop {
        LoopStop::Halted(reason) => exit_code_for(reason),
        LoopStop::Cancelled | LoopStop::MaxTicks => exit_codes::OK,
    })
}

fn exit_code_for(reason: &StopReason) -> i32 {
    match reason {
        StopReason::PreconditionFailed { .. } => exit_codes::PRECONDITION,
        StopReason::ResourceExhausted { .. } => exit_codes::EXHAUSTED,
        StopReason::Cancelled => exit_codes::OK,
    }
}
