//! Task-scheduled snakeweed run with optional cleaning and serum crafting.
//!
//! Five tasks are evaluated in priority order every tick: travel, collect,
//! clean, craft, bank. Travel owns a small state machine of its own; the
//! other tasks are single interactions guarded by their admission predicate.

use std::collections::VecDeque;
use std::fmt;

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::core::budget::Cooldown;
use crate::core::machine::{Outcome, Row, StateMachine, TransitionTable, Verdict};
use crate::core::region::{Region, Tile};
use crate::core::scheduler::{Task, TaskScheduler};
use crate::core::stats::RunStats;
use crate::core::types::{Control, ItemId, StopReason, ms};
use crate::core::wait::Clock;
use crate::io::client::{GameClient, ObjectQuery};
use crate::io::config::RunnerConfig;
use crate::io::run_state::TransitionEntry;

use super::catalog::{
    BANK_CHEST, COLLECTION_SUPPLIES, DRAMEN_STAFF, GRIMY_SNAKEWEED, HOME_CODE, PATCH_CODE,
    SANFEW_SERUM, SERUM_INGREDIENTS, SNAKEWEED, SUPER_RESTORE, bank_area, home_ring_area,
    patch_ring_area, patch_side, vine_area,
};
use super::{
    RETRY, SETTLE, Script, ScriptStatus, Waits, approach, herbs_gained, search_vine,
    use_fairy_ring, walk_into,
};

pub const HERBS: &str = "herbs";
pub const CLEANED: &str = "cleaned";
pub const SERUMS: &str = "serums";

const SEARCH_SPACING: std::time::Duration = ms(1200);
const RECENT_LIMIT: usize = 64;

/// Where the run is heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Patch,
    Bank,
}

/// One direction of the fairy-ring route.
struct Leg {
    ring: Region,
    code: &'static str,
    landing: Region,
    target: Region,
}

impl Destination {
    fn leg(self) -> Leg {
        match self {
            Destination::Patch => Leg {
                ring: home_ring_area(),
                code: PATCH_CODE,
                landing: patch_ring_area(),
                target: vine_area(),
            },
            Destination::Bank => Leg {
                ring: patch_ring_area(),
                code: HOME_CODE,
                landing: home_ring_area(),
                target: bank_area(),
            },
        }
    }

    /// Whether `tile` can reach this destination on foot.
    fn walkable_from(self, tile: &Tile) -> bool {
        match self {
            Destination::Patch => patch_side().contains(tile),
            Destination::Bank => !patch_side().contains(tile),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TravelState {
    Plan,
    WalkToRing,
    UseRing,
    WalkToDestination,
}

impl fmt::Display for TravelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Shared context every serum task reads and the selected task mutates.
pub struct SerumRun<W, K> {
    world: W,
    clock: K,
    waits: Waits,
    stats: RunStats,
    cooldown: Cooldown,
    herbs_seen: u32,
    clean_herbs: bool,
    make_serums: bool,
    /// Destination the travel machine is currently routed to.
    route: Destination,
    /// Travel transitions not yet collected by the script.
    transitions: Vec<TransitionEntry>,
    ingredients_warned: bool,
}

impl<W: GameClient, K: Clock> SerumRun<W, K> {
    fn carries(&self, item: ItemId) -> bool {
        self.world.inventory_contains(item)
            || (item == DRAMEN_STAFF && self.world.equipment_contains_item(item))
    }

    fn needs_supplies(&self) -> bool {
        COLLECTION_SUPPLIES.iter().any(|item| !self.carries(*item))
    }

    fn has_produce(&self) -> bool {
        [GRIMY_SNAKEWEED, SNAKEWEED, SANFEW_SERUM]
            .iter()
            .any(|item| self.world.inventory_contains(*item))
    }

    fn at_bank(&self) -> bool {
        bank_area().contains(&self.world.player_tile())
    }

    fn at_patch(&self) -> bool {
        vine_area().contains(&self.world.player_tile())
    }

    fn needs_bank(&self) -> bool {
        self.world.inventory_is_full()
            || self.needs_supplies()
            || self.world.bank_is_open()
            || (self.at_bank() && self.has_produce())
    }

    fn destination(&self) -> Destination {
        if self.needs_bank() {
            Destination::Bank
        } else {
            Destination::Patch
        }
    }

    fn keep_set(&self) -> Vec<ItemId> {
        let mut keep = COLLECTION_SUPPLIES.to_vec();
        if self.make_serums {
            keep.extend(SERUM_INGREDIENTS);
        }
        keep
    }

    fn has_serum_parts(&self) -> bool {
        SERUM_INGREDIENTS
            .iter()
            .chain([SNAKEWEED].iter())
            .all(|item| self.world.inventory_contains(*item))
    }
}

fn plan<W: GameClient, K: Clock>(ctx: &mut SerumRun<W, K>) -> Outcome<TravelState> {
    if ctx.route.walkable_from(&ctx.world.player_tile()) {
        return Outcome::branch(TravelState::WalkToDestination, SETTLE);
    }
    Outcome::confirmed(SETTLE)
}

fn walk_to_ring<W: GameClient, K: Clock>(ctx: &mut SerumRun<W, K>) -> Outcome<TravelState> {
    let leg = ctx.route.leg();
    walk_into(&mut ctx.world, &ctx.clock, ctx.waits.travel, &leg.ring)
}

fn use_ring<W: GameClient, K: Clock>(ctx: &mut SerumRun<W, K>) -> Outcome<TravelState> {
    let leg = ctx.route.leg();
    use_fairy_ring(
        &mut ctx.world,
        &ctx.clock,
        &ctx.waits,
        &leg.ring,
        leg.code,
        &leg.landing,
    )
}

fn walk_to_destination<W: GameClient, K: Clock>(
    ctx: &mut SerumRun<W, K>,
) -> Outcome<TravelState> {
    let leg = ctx.route.leg();
    walk_into(&mut ctx.world, &ctx.clock, ctx.waits.travel, &leg.target)
}

pub fn travel_table<W: GameClient, K: Clock>(
    cfg: &RunnerConfig,
) -> Result<TransitionTable<TravelState, SerumRun<W, K>>> {
    let retries = &cfg.retries;
    TransitionTable::build(
        TravelState::Plan,
        vec![
            Row::new(TravelState::Plan, plan::<W, K>, TravelState::WalkToRing),
            Row::new(
                TravelState::WalkToRing,
                walk_to_ring::<W, K>,
                TravelState::UseRing,
            )
            .retries(retries.walking)
            .recover_to(TravelState::Plan),
            Row::new(TravelState::UseRing, use_ring::<W, K>, TravelState::WalkToDestination)
                .retries(retries.teleport)
                .recover_to(TravelState::WalkToRing),
            Row::new(
                TravelState::WalkToDestination,
                walk_to_destination::<W, K>,
                TravelState::Plan,
            )
            .retries(retries.walking)
            .recover_to(TravelState::Plan),
        ],
    )
}

/// Map a single-interaction outcome onto scheduler control.
fn control(task: &str, outcome: Outcome<()>) -> Control {
    match outcome.verdict {
        Verdict::Fatal(reason) => Control::Stop(reason),
        Verdict::Failed(reason) => {
            debug!(task, reason = %reason, "interaction failed");
            Control::Continue(outcome.delay)
        }
        Verdict::Pending | Verdict::Confirmed | Verdict::Branch(()) => {
            Control::Continue(outcome.delay)
        }
    }
}

struct Travel<W, K> {
    machine: StateMachine<TravelState, SerumRun<W, K>>,
}

impl<W: GameClient, K: Clock + Clone> Task<SerumRun<W, K>> for Travel<W, K> {
    fn name(&self) -> &str {
        "travel"
    }

    fn admit(&self, ctx: &SerumRun<W, K>) -> bool {
        match ctx.destination() {
            Destination::Bank => !ctx.at_bank(),
            Destination::Patch => !ctx.at_patch(),
        }
    }

    fn step(&mut self, ctx: &mut SerumRun<W, K>) -> Control {
        let destination = ctx.destination();
        if destination != ctx.route {
            info!(from = ?ctx.route, to = ?destination, "rerouting");
            ctx.route = destination;
            self.machine.restart(ctx.clock.now());
        }
        let clock = ctx.clock.clone();
        let control = self.machine.step(ctx, &clock);
        ctx.transitions.extend(
            self.machine
                .take_transitions()
                .iter()
                .map(TransitionEntry::from),
        );
        control
    }

    fn reset(&mut self) {
        self.machine.reset();
    }
}

struct Collect;

impl Collect {
    const NAME: &'static str = "collect";
}

impl<W: GameClient, K: Clock> Task<SerumRun<W, K>> for Collect {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn admit(&self, ctx: &SerumRun<W, K>) -> bool {
        ctx.at_patch() && !ctx.world.inventory_is_full()
    }

    fn step(&mut self, ctx: &mut SerumRun<W, K>) -> Control {
        let outcome = search_vine(&mut ctx.world, &ctx.clock, &ctx.waits, &mut ctx.cooldown);
        control(Self::NAME, outcome)
    }
}

struct CleanHerbs;

impl CleanHerbs {
    const NAME: &'static str = "clean-herbs";
}

impl<W: GameClient, K: Clock> Task<SerumRun<W, K>> for CleanHerbs {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn admit(&self, ctx: &SerumRun<W, K>) -> bool {
        ctx.clean_herbs && ctx.world.inventory_contains(GRIMY_SNAKEWEED)
    }

    fn step(&mut self, ctx: &mut SerumRun<W, K>) -> Control {
        let before = ctx.world.inventory_count(GRIMY_SNAKEWEED);
        if !ctx.world.interact_item(GRIMY_SNAKEWEED, "Clean") {
            return control(Self::NAME, Outcome::failed("herb refused cleaning", RETRY));
        }
        let cleaned = ctx.waits.item.until(&ctx.clock, || {
            ctx.world.inventory_count(GRIMY_SNAKEWEED) < before
        });
        if !cleaned {
            return control(Self::NAME, Outcome::failed("herb not cleaned", RETRY));
        }
        ctx.stats.add(CLEANED, 1);
        Control::Continue(SETTLE)
    }
}

struct CraftSerum;

impl CraftSerum {
    const NAME: &'static str = "craft-serum";
}

impl<W: GameClient, K: Clock> Task<SerumRun<W, K>> for CraftSerum {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn admit(&self, ctx: &SerumRun<W, K>) -> bool {
        ctx.make_serums && ctx.has_serum_parts() && !ctx.world.inventory_contains(SANFEW_SERUM)
    }

    fn step(&mut self, ctx: &mut SerumRun<W, K>) -> Control {
        if !ctx.world.interact_item(SUPER_RESTORE, "Use") {
            return control(Self::NAME, Outcome::failed("ingredients refused", RETRY));
        }
        if !ctx
            .waits
            .item
            .until(&ctx.clock, || ctx.world.inventory_contains(SANFEW_SERUM))
        {
            return control(Self::NAME, Outcome::failed("serum not made", RETRY));
        }
        ctx.stats.add(SERUMS, 1);
        info!(total = ctx.stats.get(SERUMS), "made serum");
        Control::Continue(SETTLE)
    }
}

struct Banking;

impl Banking {
    const NAME: &'static str = "banking";

    fn interact<W: GameClient, K: Clock>(ctx: &mut SerumRun<W, K>) -> Outcome<()> {
        if !ctx.world.bank_is_open() {
            let walked = approach(
                &mut ctx.world,
                &ctx.clock,
                ctx.waits.travel,
                &ObjectQuery::named(BANK_CHEST),
            );
            if walked.verdict != Verdict::Confirmed {
                return walked;
            }
            if !ctx.world.open_bank() {
                return Outcome::failed("bank chest refused", RETRY);
            }
            if !ctx.waits.bank.until(&ctx.clock, || ctx.world.bank_is_open()) {
                return Outcome::failed("bank did not open", RETRY);
            }
            return Outcome::pending(SETTLE);
        }

        let keep = ctx.keep_set();
        if ctx.world.inventory_contains_other_than(&keep) {
            ctx.world.deposit_all_except(&keep);
            if !ctx
                .waits
                .item
                .until(&ctx.clock, || !ctx.world.inventory_contains_other_than(&keep))
            {
                return Outcome::failed("produce not deposited", RETRY);
            }
            return Outcome::pending(SETTLE);
        }

        for supply in COLLECTION_SUPPLIES {
            if ctx.carries(supply) {
                continue;
            }
            if !ctx.world.bank_contains(supply) {
                return Outcome::fatal(StopReason::ResourceExhausted { item: supply });
            }
            return withdraw_one(ctx, supply);
        }

        if ctx.make_serums {
            for ingredient in SERUM_INGREDIENTS {
                if ctx.world.inventory_contains(ingredient) {
                    continue;
                }
                if ctx.world.bank_contains(ingredient) {
                    return withdraw_one(ctx, ingredient);
                }
                if !ctx.ingredients_warned {
                    warn!(item = ingredient, "serum ingredient missing, crafting skipped");
                    ctx.ingredients_warned = true;
                }
            }
        }

        ctx.world.close_bank();
        Outcome::confirmed(SETTLE)
    }
}

fn withdraw_one<W: GameClient, K: Clock>(ctx: &mut SerumRun<W, K>, item: ItemId) -> Outcome<()> {
    if !ctx.world.withdraw(item, 1) {
        return Outcome::failed(format!("item {item} not withdrawn"), RETRY);
    }
    if ctx
        .waits
        .item
        .until(&ctx.clock, || ctx.world.inventory_contains(item))
    {
        Outcome::pending(SETTLE)
    } else {
        Outcome::failed(format!("item {item} not seen after withdrawal"), RETRY)
    }
}

impl<W: GameClient, K: Clock> Task<SerumRun<W, K>> for Banking {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn admit(&self, ctx: &SerumRun<W, K>) -> bool {
        ctx.at_bank() && ctx.needs_bank()
    }

    fn step(&mut self, ctx: &mut SerumRun<W, K>) -> Control {
        control(Self::NAME, Banking::interact(ctx))
    }
}

pub struct SerumScript<W, K> {
    scheduler: TaskScheduler<SerumRun<W, K>>,
    ctx: SerumRun<W, K>,
    recent: VecDeque<TransitionEntry>,
    unreported: Vec<TransitionEntry>,
    last_task: Option<String>,
}

impl<W, K> SerumScript<W, K>
where
    W: GameClient + 'static,
    K: Clock + Clone + 'static,
{
    pub fn new(world: W, clock: K, cfg: &RunnerConfig) -> Result<Self> {
        let mut scheduler = TaskScheduler::new(cfg.idle_delay());
        scheduler
            .register(Travel {
                machine: StateMachine::new(travel_table(cfg)?),
            })
            .register(Collect)
            .register(CleanHerbs)
            .register(CraftSerum)
            .register(Banking);
        let now = clock.now();
        Ok(Self {
            scheduler,
            ctx: SerumRun {
                world,
                clock,
                waits: Waits::from_config(cfg),
                stats: RunStats::new(now),
                cooldown: Cooldown::new(SEARCH_SPACING),
                herbs_seen: 0,
                clean_herbs: cfg.serum.clean_herbs,
                make_serums: cfg.serum.make_serums,
                route: Destination::Patch,
                transitions: Vec::new(),
                ingredients_warned: false,
            },
            recent: VecDeque::new(),
            unreported: Vec::new(),
            last_task: None,
        })
    }

    pub fn task_names(&self) -> Vec<&str> {
        self.scheduler.task_names()
    }

    /// The task that would run on the next tick. Evaluates admission only.
    pub fn next_task(&self) -> Option<&str> {
        let index = self.scheduler.select(&self.ctx)?;
        self.scheduler.task_names().get(index).copied()
    }

    /// The task that ran on the latest tick, if any admitted.
    pub fn last_task(&self) -> Option<&str> {
        self.last_task.as_deref()
    }

    pub fn destination(&self) -> Destination {
        self.ctx.destination()
    }

    pub fn stats(&self) -> &RunStats {
        &self.ctx.stats
    }

    pub fn world(&self) -> &W {
        &self.ctx.world
    }

    pub fn world_mut(&mut self) -> &mut W {
        &mut self.ctx.world
    }
}

impl<W, K> Script for SerumScript<W, K>
where
    W: GameClient + 'static,
    K: Clock + Clone + 'static,
{
    fn name(&self) -> &'static str {
        "serum"
    }

    #[instrument(skip_all, fields(script = "serum"))]
    fn start(&mut self) -> Result<(), StopReason> {
        self.scheduler.reset();
        self.recent.clear();
        self.unreported.clear();
        self.last_task = None;
        let ctx = &mut self.ctx;
        ctx.stats.reset(ctx.clock.now());
        ctx.cooldown = Cooldown::new(SEARCH_SPACING);
        ctx.route = Destination::Patch;
        ctx.transitions.clear();
        ctx.ingredients_warned = false;
        ctx.herbs_seen = 0;
        herbs_gained(&ctx.world, &mut ctx.herbs_seen);
        if !ctx.carries(DRAMEN_STAFF) {
            warn!("no dramen staff carried or worn");
            return Err(StopReason::PreconditionFailed {
                what: "Dramen staff not carried".to_string(),
            });
        }
        info!(
            clean = ctx.clean_herbs,
            serums = ctx.make_serums,
            "serum run started"
        );
        Ok(())
    }

    fn step(&mut self) -> Control {
        let report = self.scheduler.tick(&mut self.ctx);
        self.last_task = report.task;

        let gained = herbs_gained(&self.ctx.world, &mut self.ctx.herbs_seen);
        if gained > 0 {
            self.ctx.stats.add(HERBS, u64::from(gained));
        }
        for entry in self.ctx.transitions.drain(..) {
            if self.recent.len() == RECENT_LIMIT {
                self.recent.pop_front();
            }
            self.recent.push_back(entry.clone());
            self.unreported.push(entry);
        }
        report.control
    }

    fn stop(&mut self) {
        let now = self.ctx.clock.now();
        let stats = &self.ctx.stats;
        info!(
            herbs = stats.get(HERBS),
            cleaned = stats.get(CLEANED),
            serums = stats.get(SERUMS),
            runtime = %stats.snapshot(now).runtime,
            "serum run stopped"
        );
    }

    fn status(&self) -> ScriptStatus {
        ScriptStatus {
            state: self.last_task.clone(),
            stats: self.ctx.stats.snapshot(self.ctx.clock.now()),
            recent: self.recent.iter().cloned().collect(),
        }
    }

    fn take_transitions(&mut self) -> Vec<TransitionEntry> {
        std::mem::take(&mut self.unreported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::client::{Bank, Inventory, Movement};
    use crate::io::clock::VirtualClock;
    use crate::scripts::catalog::{GUAM_LEAF, SWAMP_TAR, UNICORN_HORN_DUST};
    use crate::sim::{SimWorld, serum_world};
    use crate::test_support::{Ticked, tick_until};

    type Sim = SerumScript<SimWorld<VirtualClock>, VirtualClock>;

    fn script(cfg: &RunnerConfig, sets: u32) -> (VirtualClock, Sim) {
        let clock = VirtualClock::new();
        let world = serum_world(clock.clone(), sets);
        let script = SerumScript::new(world, clock.clone(), cfg).expect("script");
        (clock, script)
    }

    #[test]
    fn tasks_are_registered_in_priority_order() {
        let (_, script) = script(&RunnerConfig::default(), 1);
        assert_eq!(
            script.task_names(),
            vec!["travel", "collect", "clean-herbs", "craft-serum", "banking"]
        );
    }

    #[test]
    fn start_requires_the_staff() {
        let clock = VirtualClock::new();
        let world = SimWorld::new(clock.clone(), Tile::new(3165, 3487));
        let mut script = SerumScript::new(world, clock, &RunnerConfig::default()).expect("script");
        assert!(matches!(
            script.start(),
            Err(StopReason::PreconditionFailed { .. })
        ));
    }

    #[test]
    fn first_ticks_bank_for_supplies_then_travel() {
        let (clock, mut script) = script(&RunnerConfig::default(), 1);
        script.start().expect("start");
        assert_eq!(script.destination(), Destination::Bank);

        script.step();
        assert_eq!(script.last_task(), Some("banking"));

        let ticked = tick_until(&mut script, &clock, 50, |s| s.last_task() == Some("travel"));
        assert!(matches!(ticked, Ticked::Reached(_)), "{ticked:?}");
        for item in [SWAMP_TAR, GUAM_LEAF, SUPER_RESTORE, UNICORN_HORN_DUST] {
            assert!(script.world().inventory_contains(item), "missing {item}");
        }
        assert!(!script.world().bank_is_open());
    }

    #[test]
    fn missing_supplies_in_the_bank_stop_the_run() {
        let clock = VirtualClock::new();
        let mut world = serum_world(clock.clone(), 1);
        world.clear_bank(SWAMP_TAR);
        let mut script =
            SerumScript::new(world, clock.clone(), &RunnerConfig::default()).expect("script");
        script.start().expect("start");
        let ticked = tick_until(&mut script, &clock, 20, |_| false);
        assert_eq!(
            ticked,
            Ticked::Stopped(StopReason::ResourceExhausted { item: SWAMP_TAR })
        );
    }

    #[test]
    fn a_full_trip_cleans_crafts_and_banks() {
        let (clock, mut script) = script(&RunnerConfig::default(), 2);
        script.start().expect("start");
        let ticked = tick_until(&mut script, &clock, 3000, |s| {
            s.world().bank_count(SANFEW_SERUM) > 0
        });
        assert!(matches!(ticked, Ticked::Reached(_)), "{ticked:?}");
        // Tar, guam and three ingredients leave 23 free slots.
        assert_eq!(script.stats().get(HERBS), 23);
        assert_eq!(script.stats().get(CLEANED), 23);
        assert_eq!(script.stats().get(SERUMS), 1);
        assert_eq!(script.world().bank_count(SNAKEWEED), 22);
        assert_eq!(script.world().bank_count(GRIMY_SNAKEWEED), 0);
    }

    #[test]
    fn toggles_off_bank_grimy_herbs_untouched() {
        let mut cfg = RunnerConfig::default();
        cfg.serum.clean_herbs = false;
        cfg.serum.make_serums = false;
        let (clock, mut script) = script(&cfg, 1);
        script.start().expect("start");
        let ticked = tick_until(&mut script, &clock, 3000, |s| {
            s.world().bank_count(GRIMY_SNAKEWEED) > 0
        });
        assert!(matches!(ticked, Ticked::Reached(_)), "{ticked:?}");
        assert_eq!(script.world().bank_count(GRIMY_SNAKEWEED), 26);
        assert_eq!(script.stats().get(CLEANED), 0);
        assert!(!script.world().inventory_contains(SUPER_RESTORE));
    }

    #[test]
    fn travel_transitions_surface_in_status() {
        let (clock, mut script) = script(&RunnerConfig::default(), 1);
        script.start().expect("start");
        let ticked = tick_until(&mut script, &clock, 500, |s| {
            vine_area().contains(&s.world().player_tile())
        });
        assert!(matches!(ticked, Ticked::Reached(_)), "{ticked:?}");
        let taken = script.take_transitions();
        assert!(taken.iter().any(|entry| entry.to == "UseRing"));
        assert!(script.take_transitions().is_empty());
        assert_eq!(script.status().recent.len(), taken.len());
    }
}
