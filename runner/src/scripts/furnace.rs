//! Blast-furnace smelting loop.
//!
//! The canonical six-state pipeline: bank, carry ore and coal to the conveyor,
//! deposit (emptying the coal bag on the way), collect bars from the dispenser
//! and walk back. Recipes differ only in data: adamant needs an extra
//! coal-only trip before each ore trip.

use std::fmt;

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::core::machine::{Outcome, Row, StateMachine, TransitionTable, Verdict};
use crate::core::stats::RunStats;
use crate::core::types::{Control, ItemId, StopReason};
use crate::core::wait::Clock;
use crate::io::client::{GameClient, ObjectQuery, SceneObject};
use crate::io::config::{Recipe, RunnerConfig};
use crate::io::run_state::TransitionEntry;

use super::catalog::{
    ADAMANTITE_BAR, ADAMANTITE_ORE, BANK_CHEST, BAR_DISPENSER, COAL, COAL_BAG, CONVEYOR, IRON_ORE,
    SMITHING, STAMINA_POTION, STEEL_BAR,
};
use super::{RETRY, SETTLE, Script, ScriptStatus, Waits, approach};

pub const BARS: &str = "bars";
pub const XP: &str = "xp";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FurnaceState {
    Banking,
    WalkingToInputStation,
    DepositingInputs,
    WalkingToCollector,
    CollectingOutputs,
    WalkingToBank,
}

impl fmt::Display for FurnaceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Inputs and output of one recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecipePlan {
    pub ore: ItemId,
    pub bar: ItemId,
    /// Coal-only trips made before each ore trip.
    pub coal_preloads: u32,
}

impl RecipePlan {
    pub fn for_recipe(recipe: Recipe) -> Self {
        match recipe {
            Recipe::Steel => Self {
                ore: IRON_ORE,
                bar: STEEL_BAR,
                coal_preloads: 0,
            },
            Recipe::Adamant => Self {
                ore: ADAMANTITE_ORE,
                bar: ADAMANTITE_BAR,
                coal_preloads: 1,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Load {
    Coal,
    Ore,
}

/// Everything the furnace handlers read and write.
pub struct Smelter<W, K> {
    world: W,
    clock: K,
    waits: Waits,
    plan: RecipePlan,
    stamina_threshold: u8,
    required_equipment: Vec<String>,
    stats: RunStats,
    start_xp: u64,
    /// What the current trip carries, set when banking completes.
    load: Option<Load>,
    preloads_done: u32,
    bag_loaded: bool,
    stamina_warned: bool,
}

impl<W: GameClient, K: Clock> Smelter<W, K> {
    fn next_load(&self) -> Load {
        if self.preloads_done < self.plan.coal_preloads {
            Load::Coal
        } else {
            Load::Ore
        }
    }

    fn record_xp(&mut self) {
        let gained = self
            .world
            .experience(SMITHING)
            .saturating_sub(self.start_xp);
        self.stats.record_total(XP, gained);
    }

    /// Drink a stamina dose when run energy is low. Never blocks the pipeline.
    fn top_up_run_energy(&mut self) {
        let threshold = self.stamina_threshold;
        if self.world.run_energy() > threshold {
            return;
        }
        if !self.world.inventory_contains(STAMINA_POTION) {
            if !self.world.bank_contains(STAMINA_POTION) {
                if !self.stamina_warned {
                    info!(energy = self.world.run_energy(), "no stamina potions left, continuing without");
                    self.stamina_warned = true;
                }
                return;
            }
            self.world.withdraw(STAMINA_POTION, 1);
            let withdrawn = self
                .waits
                .item
                .until(&self.clock, || self.world.inventory_contains(STAMINA_POTION));
            if !withdrawn {
                debug!("stamina potion withdrawal not confirmed");
                return;
            }
        }
        self.world.interact_item(STAMINA_POTION, "Drink");
        if self
            .waits
            .item
            .until(&self.clock, || self.world.run_energy() > threshold)
        {
            debug!(energy = self.world.run_energy(), "drank stamina potion");
        }
    }

    fn reachable(&self, name: &str) -> Option<SceneObject> {
        self.world
            .closest_object(&ObjectQuery::named(name))
            .filter(|object| object.reachable)
    }
}

fn banking<W: GameClient, K: Clock>(ctx: &mut Smelter<W, K>) -> Outcome<FurnaceState> {
    ctx.record_xp();
    if !ctx.world.bank_is_open() {
        if !ctx.world.open_bank() {
            return Outcome::failed("bank chest out of reach", RETRY);
        }
        if !ctx.waits.bank.until(&ctx.clock, || ctx.world.bank_is_open()) {
            return Outcome::failed("bank did not open", RETRY);
        }
        return Outcome::pending(SETTLE);
    }

    ctx.top_up_run_energy();

    let bar = ctx.plan.bar;
    let bars = ctx.world.inventory_count(bar);
    if bars > 0 {
        ctx.world.deposit_all(bar);
        if !ctx
            .waits
            .item
            .until(&ctx.clock, || !ctx.world.inventory_contains(bar))
        {
            return Outcome::failed("bars not deposited", RETRY);
        }
        ctx.stats.add(BARS, u64::from(bars));
        info!(bars, total = ctx.stats.get(BARS), "banked bars");
        return Outcome::pending(SETTLE);
    }

    if !ctx.world.inventory_contains(COAL_BAG) {
        if !ctx.world.bank_contains(COAL_BAG) {
            return Outcome::fatal(StopReason::ResourceExhausted { item: COAL_BAG });
        }
        ctx.world.withdraw(COAL_BAG, 1);
        if !ctx
            .waits
            .item
            .until(&ctx.clock, || ctx.world.inventory_contains(COAL_BAG))
        {
            return Outcome::failed("coal bag not withdrawn", RETRY);
        }
        return Outcome::pending(SETTLE);
    }

    let load = ctx.next_load();
    let input = match load {
        Load::Coal => COAL,
        Load::Ore => ctx.plan.ore,
    };
    if ctx.world.inventory_contains_other_than(&[COAL_BAG, input]) {
        ctx.world.deposit_all_except(&[COAL_BAG]);
        if !ctx.waits.item.until(&ctx.clock, || {
            !ctx.world.inventory_contains_other_than(&[COAL_BAG])
        }) {
            return Outcome::failed("inventory not cleared", RETRY);
        }
        return Outcome::pending(SETTLE);
    }
    if !ctx.world.inventory_contains(input) && !ctx.world.bank_contains(input) {
        return Outcome::fatal(StopReason::ResourceExhausted { item: input });
    }

    if !ctx.bag_loaded {
        if !ctx.world.bank_contains(COAL) {
            return Outcome::fatal(StopReason::ResourceExhausted { item: COAL });
        }
        if !ctx.world.interact_item(COAL_BAG, "Fill") {
            return Outcome::failed("coal bag refused to fill", RETRY);
        }
        ctx.bag_loaded = true;
        return Outcome::pending(SETTLE);
    }

    if !ctx.world.inventory_contains(input) {
        let free = ctx.world.inventory_free_slots();
        ctx.world.withdraw(input, free);
        if !ctx
            .waits
            .item
            .until(&ctx.clock, || ctx.world.inventory_contains(input))
        {
            return Outcome::failed(format!("item {input} not withdrawn"), RETRY);
        }
        return Outcome::pending(SETTLE);
    }

    ctx.world.close_bank();
    ctx.load = Some(load);
    debug!(load = ?load, carried = ctx.world.inventory_count(input), "inputs ready");
    Outcome::confirmed(SETTLE)
}

fn walk_to_conveyor<W: GameClient, K: Clock>(ctx: &mut Smelter<W, K>) -> Outcome<FurnaceState> {
    approach(
        &mut ctx.world,
        &ctx.clock,
        ctx.waits.travel,
        &ObjectQuery::named(CONVEYOR),
    )
}

fn deposit_inputs<W: GameClient, K: Clock>(ctx: &mut Smelter<W, K>) -> Outcome<FurnaceState> {
    let Some(conveyor) = ctx.reachable(CONVEYOR) else {
        return Outcome::failed("conveyor out of reach", RETRY);
    };
    let ore = ctx.plan.ore;
    let carrying = |world: &W| world.inventory_contains(COAL) || world.inventory_contains(ore);

    if carrying(&ctx.world) {
        if !ctx.world.interact_object(&conveyor, "Put-ore-on") {
            return Outcome::failed("conveyor refused the load", RETRY);
        }
        if !ctx.waits.deposit.until(&ctx.clock, || !carrying(&ctx.world)) {
            return Outcome::failed("deposit not confirmed", RETRY);
        }
        return Outcome::pending(SETTLE);
    }

    if ctx.bag_loaded {
        // Stays loaded until the coal is seen in the inventory.
        if !ctx.world.interact_item(COAL_BAG, "Empty") {
            return Outcome::failed("coal bag did not empty", RETRY);
        }
        if !ctx
            .waits
            .item
            .until(&ctx.clock, || ctx.world.inventory_contains(COAL))
        {
            return Outcome::failed("coal from bag not seen", RETRY);
        }
        ctx.bag_loaded = false;
        return Outcome::pending(SETTLE);
    }

    match ctx.load.take() {
        Some(Load::Coal) => {
            ctx.preloads_done += 1;
            debug!(preloads = ctx.preloads_done, "coal preload deposited");
            Outcome::branch(FurnaceState::WalkingToBank, SETTLE)
        }
        Some(Load::Ore) | None => {
            ctx.preloads_done = 0;
            Outcome::confirmed(SETTLE)
        }
    }
}

fn walk_to_dispenser<W: GameClient, K: Clock>(ctx: &mut Smelter<W, K>) -> Outcome<FurnaceState> {
    approach(
        &mut ctx.world,
        &ctx.clock,
        ctx.waits.travel,
        &ObjectQuery::named(BAR_DISPENSER),
    )
}

fn collect_bars<W: GameClient, K: Clock>(ctx: &mut Smelter<W, K>) -> Outcome<FurnaceState> {
    ctx.record_xp();
    let bar = ctx.plan.bar;
    if ctx.world.inventory_contains(bar) {
        return Outcome::confirmed(SETTLE);
    }
    let Some(dispenser) = ctx.reachable(BAR_DISPENSER) else {
        return Outcome::failed("dispenser out of reach", RETRY);
    };
    if ctx.world.in_dialogue() && !ctx.world.can_continue() {
        ctx.world.type_keys("1");
        if ctx
            .waits
            .item
            .until(&ctx.clock, || ctx.world.inventory_contains(bar))
        {
            return Outcome::confirmed(SETTLE);
        }
        return Outcome::failed("bars not taken", RETRY);
    }
    if !ctx.world.interact_object(&dispenser, "Take") {
        return Outcome::failed("dispenser refused", RETRY);
    }
    if ctx
        .waits
        .collector
        .until(&ctx.clock, || ctx.world.in_dialogue())
    {
        return Outcome::pending(SETTLE);
    }
    Outcome::failed("no bars ready", RETRY)
}

fn walk_to_bank<W: GameClient, K: Clock>(ctx: &mut Smelter<W, K>) -> Outcome<FurnaceState> {
    if ctx.world.bank_is_open() {
        return Outcome::confirmed(SETTLE);
    }
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
    if ctx.waits.bank.until(&ctx.clock, || ctx.world.bank_is_open()) {
        Outcome::confirmed(SETTLE)
    } else {
        Outcome::failed("bank did not open", RETRY)
    }
}

/// The furnace transition table for `cfg`.
pub fn furnace_table<W: GameClient, K: Clock>(
    cfg: &RunnerConfig,
) -> Result<TransitionTable<FurnaceState, Smelter<W, K>>> {
    let retries = &cfg.retries;
    TransitionTable::build(
        FurnaceState::Banking,
        vec![
            Row::new(FurnaceState::Banking, banking::<W, K>, FurnaceState::WalkingToInputStation)
                .retries(retries.banking)
                .recover_to(FurnaceState::WalkingToBank),
            Row::new(
                FurnaceState::WalkingToInputStation,
                walk_to_conveyor::<W, K>,
                FurnaceState::DepositingInputs,
            )
            .retries(retries.walking),
            Row::new(
                FurnaceState::DepositingInputs,
                deposit_inputs::<W, K>,
                FurnaceState::WalkingToCollector,
            )
            .retries(retries.depositing)
            .recover_to(FurnaceState::WalkingToBank),
            Row::new(
                FurnaceState::WalkingToCollector,
                walk_to_dispenser::<W, K>,
                FurnaceState::CollectingOutputs,
            )
            .retries(retries.walking)
            .recover_to(FurnaceState::WalkingToInputStation),
            Row::new(
                FurnaceState::CollectingOutputs,
                collect_bars::<W, K>,
                FurnaceState::WalkingToBank,
            )
            .retries(retries.collecting)
            .recover_to(FurnaceState::WalkingToBank)
            .dwell_limit(std::time::Duration::from_millis(cfg.timeouts.collect_dwell_ms)),
            Row::new(FurnaceState::WalkingToBank, walk_to_bank::<W, K>, FurnaceState::Banking)
                .retries(retries.walking),
        ],
    )
}

pub struct FurnaceScript<W, K> {
    machine: StateMachine<FurnaceState, Smelter<W, K>>,
    ctx: Smelter<W, K>,
}

impl<W: GameClient, K: Clock + Clone> FurnaceScript<W, K> {
    pub fn new(world: W, clock: K, cfg: &RunnerConfig) -> Result<Self> {
        let machine = StateMachine::new(furnace_table(cfg)?);
        let now = clock.now();
        Ok(Self {
            machine,
            ctx: Smelter {
                world,
                clock,
                waits: Waits::from_config(cfg),
                plan: RecipePlan::for_recipe(cfg.furnace.recipe),
                stamina_threshold: cfg.furnace.stamina_threshold,
                required_equipment: cfg.furnace.required_equipment.clone(),
                stats: RunStats::new(now),
                start_xp: 0,
                load: None,
                preloads_done: 0,
                bag_loaded: false,
                stamina_warned: false,
            },
        })
    }

    pub fn state(&self) -> FurnaceState {
        self.machine.current()
    }

    pub fn machine(&self) -> &StateMachine<FurnaceState, Smelter<W, K>> {
        &self.machine
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

impl<W: GameClient, K: Clock + Clone> Script for FurnaceScript<W, K> {
    fn name(&self) -> &'static str {
        "furnace"
    }

    #[instrument(skip_all, fields(script = "furnace"))]
    fn start(&mut self) -> Result<(), StopReason> {
        self.machine.reset();
        let ctx = &mut self.ctx;
        ctx.stats.reset(ctx.clock.now());
        ctx.start_xp = ctx.world.experience(SMITHING);
        ctx.load = None;
        ctx.preloads_done = 0;
        ctx.bag_loaded = false;
        ctx.stamina_warned = false;
        for name in &ctx.required_equipment {
            if !ctx.world.equipment_contains(name) {
                warn!(item = %name, "required equipment missing");
                return Err(StopReason::PreconditionFailed {
                    what: format!("{name} not equipped"),
                });
            }
        }
        info!(plan = ?ctx.plan, "furnace started");
        Ok(())
    }

    fn step(&mut self) -> Control {
        let clock = self.ctx.clock.clone();
        self.machine.step(&mut self.ctx, &clock)
    }

    fn stop(&mut self) {
        let now = self.ctx.clock.now();
        info!(
            bars = self.ctx.stats.get(BARS),
            xp = self.ctx.stats.get(XP),
            runtime = %self.ctx.stats.snapshot(now).runtime,
            state = %self.machine.current(),
            "furnace stopped"
        );
    }

    fn status(&self) -> ScriptStatus {
        ScriptStatus {
            state: Some(self.machine.current().to_string()),
            stats: self.ctx.stats.snapshot(self.ctx.clock.now()),
            recent: self.machine.history().map(TransitionEntry::from).collect(),
        }
    }

    fn take_transitions(&mut self) -> Vec<TransitionEntry> {
        self.machine
            .take_transitions()
            .iter()
            .map(TransitionEntry::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::client::{Inventory, Movement};
    use crate::io::clock::VirtualClock;
    use crate::sim::{SimWorld, furnace_world};
    use crate::test_support::{Ticked, tick_until};

    type Sim = FurnaceScript<SimWorld<VirtualClock>, VirtualClock>;

    fn script(recipe: Recipe, loads: u32) -> (VirtualClock, Sim) {
        let clock = VirtualClock::new();
        let mut cfg = RunnerConfig::default();
        cfg.furnace.recipe = recipe;
        let world = furnace_world(clock.clone(), recipe, loads);
        let script = FurnaceScript::new(world, clock.clone(), &cfg).expect("script");
        (clock, script)
    }

    #[test]
    fn table_follows_the_canonical_pipeline() {
        let table = furnace_table::<SimWorld<VirtualClock>, VirtualClock>(&RunnerConfig::default())
            .expect("table");
        assert_eq!(table.initial(), FurnaceState::Banking);
        assert_eq!(
            table.next_of(FurnaceState::DepositingInputs),
            Some(FurnaceState::WalkingToCollector)
        );
        assert_eq!(
            table.recovery_of(FurnaceState::DepositingInputs),
            Some(FurnaceState::WalkingToBank)
        );
        assert_eq!(
            table.recovery_of(FurnaceState::WalkingToCollector),
            Some(FurnaceState::WalkingToInputStation)
        );
        assert_eq!(table.recovery_of(FurnaceState::WalkingToInputStation), None);
        assert_eq!(table.states().count(), 6);
    }

    #[test]
    fn start_refuses_without_required_equipment() {
        let clock = VirtualClock::new();
        let world = SimWorld::new(clock.clone(), crate::scripts::catalog::FURNACE_BANK_TILE);
        let mut script =
            FurnaceScript::new(world, clock, &RunnerConfig::default()).expect("script");
        let err = script.start().unwrap_err();
        assert_eq!(
            err,
            StopReason::PreconditionFailed {
                what: "Ice gloves not equipped".to_string()
            }
        );
    }

    #[test]
    fn empty_bank_stops_with_resource_exhausted() {
        let (clock, mut script) = script(Recipe::Steel, 0);
        script.start().expect("start");
        let ticked = tick_until(&mut script, &clock, 50, |_| false);
        assert_eq!(
            ticked,
            Ticked::Stopped(StopReason::ResourceExhausted { item: IRON_ORE })
        );
        assert_eq!(script.state(), FurnaceState::Banking);
    }

    #[test]
    fn steel_cycle_banks_bars_and_counts_them() {
        let (clock, mut script) = script(Recipe::Steel, 1);
        script.start().expect("start");
        let ticked = tick_until(&mut script, &clock, 200, |s| s.stats().get(BARS) > 0);
        assert!(matches!(ticked, Ticked::Reached(_)), "{ticked:?}");
        assert_eq!(script.stats().get(BARS), 27);
        assert!(script.stats().get(XP) >= 472);
        assert_eq!(script.machine().entries(FurnaceState::CollectingOutputs), 1);

        let after = tick_until(&mut script, &clock, 200, |_| false);
        assert_eq!(
            after,
            Ticked::Stopped(StopReason::ResourceExhausted { item: IRON_ORE })
        );
    }

    #[test]
    fn adamant_makes_a_coal_trip_before_the_ore_trip() {
        let (clock, mut script) = script(Recipe::Adamant, 1);
        script.start().expect("start");
        let ticked = tick_until(&mut script, &clock, 400, |s| {
            s.machine().entries(FurnaceState::CollectingOutputs) > 0
        });
        assert!(matches!(ticked, Ticked::Reached(_)), "{ticked:?}");
        // Coal trip, then the ore trip: two deposits but one collection.
        assert_eq!(script.machine().entries(FurnaceState::DepositingInputs), 2);
        assert_eq!(script.machine().entries(FurnaceState::Banking), 2);
        let branched = script
            .machine()
            .history()
            .any(|record| record.trigger == crate::core::machine::Trigger::Branch);
        assert!(branched);
    }

    #[test]
    fn low_run_energy_is_topped_up_from_the_bank() {
        let (clock, mut script) = script(Recipe::Steel, 1);
        script.world_mut().set_run_energy(10);
        script.start().expect("start");
        let ticked = tick_until(&mut script, &clock, 20, |s| {
            s.state() == FurnaceState::WalkingToInputStation
        });
        assert!(matches!(ticked, Ticked::Reached(_)), "{ticked:?}");
        assert!(script.world().run_energy() > 30);
        assert_eq!(script.world().bank_count(STAMINA_POTION), 4);
        assert!(!script.world().inventory_contains(STAMINA_POTION));
    }

    #[test]
    fn missing_stamina_never_blocks_banking() {
        let clock = VirtualClock::new();
        let mut world = furnace_world(clock.clone(), Recipe::Steel, 1);
        world.set_run_energy(0).clear_bank(STAMINA_POTION);
        let mut script =
            FurnaceScript::new(world, clock.clone(), &RunnerConfig::default()).expect("script");
        script.start().expect("start");
        let ticked = tick_until(&mut script, &clock, 20, |s| {
            s.state() == FurnaceState::WalkingToInputStation
        });
        assert!(matches!(ticked, Ticked::Reached(_)));
        assert!(script.world().inventory_count(IRON_ORE) > 0);
    }
}
