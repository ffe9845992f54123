//! Fairy-ring snakeweed collection.
//!
//! Eight states round trip between the bank and the vine patch. Every arrival
//! is gated on region membership, and herbs are counted from inventory deltas.

use std::fmt;

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::core::budget::Cooldown;
use crate::core::machine::{Outcome, Row, StateMachine, TransitionTable};
use crate::core::stats::RunStats;
use crate::core::types::{Control, StopReason, ms};
use crate::core::wait::Clock;
use crate::io::client::{GameClient, ObjectQuery};
use crate::io::config::RunnerConfig;
use crate::io::run_state::TransitionEntry;

use super::catalog::{
    BANK_CHEST, DRAMEN_STAFF, HOME_CODE, PATCH_CODE, bank_area, home_ring_area, patch_ring_area,
    vine_area,
};
use super::{
    RETRY, SETTLE, Script, ScriptStatus, Waits, herbs_gained, search_vine, use_fairy_ring,
    walk_into,
};

pub const HERBS: &str = "herbs";

/// Minimum spacing between two vine searches.
const SEARCH_SPACING: std::time::Duration = ms(1200);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectorState {
    Banking,
    WalkToOutboundRing,
    TeleportOut,
    WalkToPatch,
    Gathering,
    WalkToReturnRing,
    TeleportBack,
    WalkToBank,
}

impl fmt::Display for CollectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

pub struct Collection<W, K> {
    world: W,
    clock: K,
    waits: Waits,
    cooldown: Cooldown,
    stats: RunStats,
    herbs_seen: u32,
}

fn banking<W: GameClient, K: Clock>(ctx: &mut Collection<W, K>) -> Outcome<CollectorState> {
    if !bank_area().contains(&ctx.world.player_tile()) {
        return Outcome::branch(CollectorState::WalkToBank, SETTLE);
    }
    if !ctx.world.bank_is_open() {
        let chest = ctx
            .world
            .closest_object(&ObjectQuery::named(BANK_CHEST))
            .filter(|chest| chest.reachable);
        if chest.is_none() || !ctx.world.open_bank() {
            return Outcome::failed("bank chest out of reach", RETRY);
        }
        if !ctx.waits.bank.until(&ctx.clock, || ctx.world.bank_is_open()) {
            return Outcome::failed("bank did not open", RETRY);
        }
        return Outcome::pending(SETTLE);
    }
    if ctx.world.inventory_contains_other_than(&[DRAMEN_STAFF]) {
        ctx.world.deposit_all_except(&[DRAMEN_STAFF]);
        if !ctx.waits.item.until(&ctx.clock, || {
            !ctx.world.inventory_contains_other_than(&[DRAMEN_STAFF])
        }) {
            return Outcome::failed("herbs not deposited", RETRY);
        }
        info!(total = ctx.stats.get(HERBS), "banked herbs");
        return Outcome::pending(SETTLE);
    }
    ctx.world.close_bank();
    Outcome::confirmed(SETTLE)
}

fn walk_to_outbound_ring<W: GameClient, K: Clock>(
    ctx: &mut Collection<W, K>,
) -> Outcome<CollectorState> {
    walk_into(&mut ctx.world, &ctx.clock, ctx.waits.travel, &home_ring_area())
}

fn teleport_out<W: GameClient, K: Clock>(ctx: &mut Collection<W, K>) -> Outcome<CollectorState> {
    use_fairy_ring(
        &mut ctx.world,
        &ctx.clock,
        &ctx.waits,
        &home_ring_area(),
        PATCH_CODE,
        &patch_ring_area(),
    )
}

fn walk_to_patch<W: GameClient, K: Clock>(ctx: &mut Collection<W, K>) -> Outcome<CollectorState> {
    walk_into(&mut ctx.world, &ctx.clock, ctx.waits.travel, &vine_area())
}

fn gathering<W: GameClient, K: Clock>(ctx: &mut Collection<W, K>) -> Outcome<CollectorState> {
    search_vine(&mut ctx.world, &ctx.clock, &ctx.waits, &mut ctx.cooldown)
}

fn walk_to_return_ring<W: GameClient, K: Clock>(
    ctx: &mut Collection<W, K>,
) -> Outcome<CollectorState> {
    walk_into(&mut ctx.world, &ctx.clock, ctx.waits.travel, &patch_ring_area())
}

fn teleport_back<W: GameClient, K: Clock>(ctx: &mut Collection<W, K>) -> Outcome<CollectorState> {
    use_fairy_ring(
        &mut ctx.world,
        &ctx.clock,
        &ctx.waits,
        &patch_ring_area(),
        HOME_CODE,
        &home_ring_area(),
    )
}

fn walk_to_bank<W: GameClient, K: Clock>(ctx: &mut Collection<W, K>) -> Outcome<CollectorState> {
    walk_into(&mut ctx.world, &ctx.clock, ctx.waits.travel, &bank_area())
}

pub fn collector_table<W: GameClient, K: Clock>(
    cfg: &RunnerConfig,
) -> Result<TransitionTable<CollectorState, Collection<W, K>>> {
    let retries = &cfg.retries;
    TransitionTable::build(
        CollectorState::Banking,
        vec![
            Row::new(
                CollectorState::Banking,
                banking::<W, K>,
                CollectorState::WalkToOutboundRing,
            )
            .retries(retries.banking)
            .recover_to(CollectorState::WalkToBank),
            Row::new(
                CollectorState::WalkToOutboundRing,
                walk_to_outbound_ring::<W, K>,
                CollectorState::TeleportOut,
            )
            .retries(retries.walking),
            Row::new(
                CollectorState::TeleportOut,
                teleport_out::<W, K>,
                CollectorState::WalkToPatch,
            )
            .retries(retries.teleport)
            .recover_to(CollectorState::WalkToOutboundRing),
            Row::new(
                CollectorState::WalkToPatch,
                walk_to_patch::<W, K>,
                CollectorState::Gathering,
            )
            .retries(retries.walking),
            Row::new(
                CollectorState::Gathering,
                gathering::<W, K>,
                CollectorState::WalkToReturnRing,
            )
            .retries(retries.collecting)
            .recover_to(CollectorState::WalkToPatch),
            Row::new(
                CollectorState::WalkToReturnRing,
                walk_to_return_ring::<W, K>,
                CollectorState::TeleportBack,
            )
            .retries(retries.walking),
            Row::new(
                CollectorState::TeleportBack,
                teleport_back::<W, K>,
                CollectorState::WalkToBank,
            )
            .retries(retries.teleport)
            .recover_to(CollectorState::WalkToReturnRing),
            Row::new(
                CollectorState::WalkToBank,
                walk_to_bank::<W, K>,
                CollectorState::Banking,
            )
            .retries(retries.walking),
        ],
    )
}

pub struct CollectorScript<W, K> {
    machine: StateMachine<CollectorState, Collection<W, K>>,
    ctx: Collection<W, K>,
}

impl<W: GameClient, K: Clock + Clone> CollectorScript<W, K> {
    pub fn new(world: W, clock: K, cfg: &RunnerConfig) -> Result<Self> {
        let machine = StateMachine::new(collector_table(cfg)?);
        let now = clock.now();
        Ok(Self {
            machine,
            ctx: Collection {
                world,
                clock,
                waits: Waits::from_config(cfg),
                cooldown: Cooldown::new(SEARCH_SPACING),
                stats: RunStats::new(now),
                herbs_seen: 0,
            },
        })
    }

    pub fn state(&self) -> CollectorState {
        self.machine.current()
    }

    pub fn machine(&self) -> &StateMachine<CollectorState, Collection<W, K>> {
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

impl<W: GameClient, K: Clock + Clone> Script for CollectorScript<W, K> {
    fn name(&self) -> &'static str {
        "collector"
    }

    #[instrument(skip_all, fields(script = "collector"))]
    fn start(&mut self) -> Result<(), StopReason> {
        self.machine.reset();
        let ctx = &mut self.ctx;
        ctx.stats.reset(ctx.clock.now());
        ctx.cooldown = Cooldown::new(SEARCH_SPACING);
        ctx.herbs_seen = 0;
        herbs_gained(&ctx.world, &mut ctx.herbs_seen);
        let staff = ctx.world.equipment_contains_item(DRAMEN_STAFF)
            || ctx.world.inventory_contains(DRAMEN_STAFF);
        if !staff {
            warn!("no dramen staff carried or worn");
            return Err(StopReason::PreconditionFailed {
                what: "Dramen staff not carried".to_string(),
            });
        }
        info!("collector started");
        Ok(())
    }

    fn step(&mut self) -> Control {
        let clock = self.ctx.clock.clone();
        let control = self.machine.step(&mut self.ctx, &clock);
        let gained = herbs_gained(&self.ctx.world, &mut self.ctx.herbs_seen);
        if gained > 0 {
            self.ctx.stats.add(HERBS, u64::from(gained));
        }
        control
    }

    fn stop(&mut self) {
        let now = self.ctx.clock.now();
        info!(
            herbs = self.ctx.stats.get(HERBS),
            per_hour = self.ctx.stats.rate_per_hour(HERBS, now),
            state = %self.machine.current(),
            "collector stopped"
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
    use crate::core::machine::Trigger;
    use crate::core::region::{Region, Tile};
    use crate::io::client::{Inventory, Movement};
    use crate::io::clock::VirtualClock;
    use crate::scripts::catalog::GRIMY_SNAKEWEED;
    use crate::sim::{SimWorld, collector_world};
    use crate::test_support::{Ticked, tick_until};

    type Sim = CollectorScript<SimWorld<VirtualClock>, VirtualClock>;

    fn script() -> (VirtualClock, Sim) {
        let clock = VirtualClock::new();
        let world = collector_world(clock.clone());
        let script =
            CollectorScript::new(world, clock.clone(), &RunnerConfig::default()).expect("script");
        (clock, script)
    }

    #[test]
    fn start_requires_the_staff() {
        let clock = VirtualClock::new();
        let world = SimWorld::new(clock.clone(), Tile::new(3165, 3487));
        let mut script =
            CollectorScript::new(world, clock, &RunnerConfig::default()).expect("script");
        assert!(matches!(
            script.start(),
            Err(StopReason::PreconditionFailed { .. })
        ));
    }

    #[test]
    fn full_trip_banks_a_full_inventory_of_herbs() {
        let (clock, mut script) = script();
        script.start().expect("start");
        let ticked = tick_until(&mut script, &clock, 2000, |s| {
            s.world().bank_count(GRIMY_SNAKEWEED) > 0
        });
        assert!(matches!(ticked, Ticked::Reached(_)), "{ticked:?}");
        assert_eq!(script.world().bank_count(GRIMY_SNAKEWEED), 28);
        assert_eq!(script.stats().get(HERBS), 28);
        assert!(bank_area().contains(&script.world().player_tile()));
        for state in [
            CollectorState::TeleportOut,
            CollectorState::Gathering,
            CollectorState::TeleportBack,
        ] {
            assert_eq!(script.machine().entries(state), 1, "{state}");
        }
    }

    #[test]
    fn second_trip_reuses_each_ring_last_destination() {
        let (clock, mut script) = script();
        script.start().expect("start");
        let ticked = tick_until(&mut script, &clock, 4000, |s| {
            s.world().bank_count(GRIMY_SNAKEWEED) >= 56
        });
        assert!(matches!(ticked, Ticked::Reached(_)), "{ticked:?}");
        assert_eq!(script.machine().entries(CollectorState::TeleportOut), 2);
        assert_eq!(script.machine().entries(CollectorState::TeleportBack), 2);
        assert_eq!(script.world().rings_configured(), 2);
    }

    #[test]
    fn unreachable_vines_regress_to_walking_to_the_patch() {
        let (clock, mut script) = script();
        script.start().expect("start");
        let ticked = tick_until(&mut script, &clock, 500, |s| {
            s.state() == CollectorState::Gathering
        });
        assert!(matches!(ticked, Ticked::Reached(_)), "{ticked:?}");
        script
            .world_mut()
            .block(Region::rect(Tile::new(2765, 3028), Tile::new(2765, 3028)))
            .block(Region::rect(Tile::new(2768, 3031), Tile::new(2768, 3031)));

        let ticked = tick_until(&mut script, &clock, 500, |s| {
            s.machine().history().any(|record| {
                record.from == CollectorState::Gathering
                    && matches!(record.trigger, Trigger::RetriesExhausted { .. })
            })
        });
        assert!(matches!(ticked, Ticked::Reached(_)), "{ticked:?}");
        assert!(!script.world().inventory_is_full());
    }

    #[test]
    fn starting_away_from_the_bank_branches_to_walk_there() {
        let clock = VirtualClock::new();
        let world = collector_world(clock.clone());
        let mut script =
            CollectorScript::new(world, clock.clone(), &RunnerConfig::default()).expect("script");
        script.start().expect("start");
        // Walk off toward the ring, then let the machine start from Banking.
        script.world_mut().walk_to(Tile::new(3150, 3490));
        clock.advance(ms(10_000));
        script.step();
        assert_eq!(script.state(), CollectorState::WalkToBank);
        let last = script.machine().history().last().cloned().expect("transition");
        assert_eq!(last.trigger, Trigger::Branch);
    }
}
