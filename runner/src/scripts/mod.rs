//! Resource-loop variants built on the core engine.
//!
//! - [`furnace`]: six-state smelting loop driven by a transition table.
//! - [`collector`]: eight-state fairy-ring herb run driven by a transition table.
//! - [`serum`]: priority-ordered tasks, one of which owns its own state machine.
//!
//! Every variant implements [`Script`], the lifecycle the host loop drives.

pub mod catalog;
pub mod collector;
pub mod furnace;
pub mod serum;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{debug, trace};

use crate::core::budget::Cooldown;
use crate::core::machine::{Outcome, Verdict};
use crate::core::region::Region;
use crate::core::stats::StatsSnapshot;
use crate::core::types::{Control, StopReason, ms};
use crate::core::wait::{Clock, WaitCondition};
use crate::io::client::{Dialogue, Inventory, Movement, ObjectQuery, Scene, Teleports};
use crate::io::config::RunnerConfig;
use crate::io::run_state::TransitionEntry;

use catalog::{FAIRY_RING, GRIMY_SNAKEWEED, VINE, VINE_ID, vine_area};

/// Lifecycle of one script run, as seen by the host loop.
pub trait Script {
    fn name(&self) -> &'static str;

    /// Return to the initial state, reset stats and check hard preconditions.
    fn start(&mut self) -> Result<(), StopReason>;

    /// One tick of work.
    fn step(&mut self) -> Control;

    fn stop(&mut self);

    fn status(&self) -> ScriptStatus;

    /// Transitions since the previous call.
    fn take_transitions(&mut self) -> Vec<TransitionEntry>;
}

/// Observable state of a running script.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptStatus {
    pub state: Option<String>,
    pub stats: StatsSnapshot,
    pub recent: Vec<TransitionEntry>,
}

/// Script names accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptKind {
    Furnace,
    Collector,
    Serum,
}

impl ScriptKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ScriptKind::Furnace => "furnace",
            ScriptKind::Collector => "collector",
            ScriptKind::Serum => "serum",
        }
    }
}

impl fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScriptKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "furnace" => Ok(ScriptKind::Furnace),
            "collector" => Ok(ScriptKind::Collector),
            "serum" => Ok(ScriptKind::Serum),
            other => Err(anyhow!(
                "unknown script '{other}' (expected furnace, collector or serum)"
            )),
        }
    }
}

/// Bounded waits for each kind of interaction, built once from config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Waits {
    pub quick: WaitCondition,
    pub bank: WaitCondition,
    pub item: WaitCondition,
    pub deposit: WaitCondition,
    pub travel: WaitCondition,
    pub collector: WaitCondition,
    pub dialogue: WaitCondition,
    pub teleport: WaitCondition,
}

impl Waits {
    pub fn from_config(cfg: &RunnerConfig) -> Self {
        let poll = cfg.poll_interval();
        let t = &cfg.timeouts;
        let wait = |millis: u64| WaitCondition::new(poll, Duration::from_millis(millis));
        Self {
            quick: wait(t.quick_check_ms),
            bank: wait(t.bank_open_ms),
            item: wait(t.item_ms),
            deposit: wait(t.deposit_ms),
            travel: wait(t.travel_ms),
            collector: wait(t.collector_ms),
            dialogue: wait(t.dialogue_ms),
            teleport: wait(t.teleport_ms),
        }
    }
}

/// Pause after an action whose effect was confirmed.
pub(crate) const SETTLE: Duration = ms(100);
/// Pause while an action is still playing out.
pub(crate) const BUSY: Duration = ms(300);
/// Pause after a failed or ongoing interaction.
pub(crate) const RETRY: Duration = ms(600);

/// One walking attempt into `region`; confirmed once the player stands inside it.
///
/// A walk still in progress when the wait ends is reported as pending, so long
/// routes are bounded by the caller's dwell limit rather than the travel wait.
pub(crate) fn walk_into<W, K, S>(world: &mut W, clock: &K, wait: WaitCondition, region: &Region) -> Outcome<S>
where
    W: Movement,
    K: Clock,
{
    if region.contains(&world.player_tile()) {
        return Outcome::confirmed(SETTLE);
    }
    if !world.is_moving() && !world.walk_to(region.center()) {
        return Outcome::failed(format!("no path toward {}", region.center()), RETRY);
    }
    if wait.until(clock, || region.contains(&world.player_tile())) {
        return Outcome::confirmed(SETTLE);
    }
    if world.is_moving() {
        trace!("still walking");
        return Outcome::pending(RETRY);
    }
    Outcome::failed(format!("did not reach {}", region.center()), RETRY)
}

/// One walking attempt toward the closest object matching `query`; confirmed
/// once it is within reach.
pub(crate) fn approach<W, K, S>(world: &mut W, clock: &K, wait: WaitCondition, query: &ObjectQuery) -> Outcome<S>
where
    W: Movement + Scene,
    K: Clock,
{
    let Some(target) = world.closest_object(query) else {
        return Outcome::failed("target not in view", RETRY);
    };
    if target.reachable {
        return Outcome::confirmed(SETTLE);
    }
    if !world.is_moving() && !world.walk_to(target.tile) {
        return Outcome::failed(format!("no path toward {}", target.name), RETRY);
    }
    let reached = wait.until(clock, || {
        world
            .closest_object(query)
            .is_some_and(|object| object.reachable)
    });
    if reached {
        return Outcome::confirmed(SETTLE);
    }
    if world.is_moving() {
        return Outcome::pending(RETRY);
    }
    Outcome::failed(format!("{} not reachable", target.name), RETRY)
}

/// One step of a fairy-ring teleport from the ring inside `ring_area` to
/// `landing`. Opening the code interface and travelling take separate ticks.
pub(crate) fn use_fairy_ring<W, K, S>(
    world: &mut W,
    clock: &K,
    waits: &Waits,
    ring_area: &Region,
    code: &str,
    landing: &Region,
) -> Outcome<S>
where
    W: Movement + Scene + Teleports,
    K: Clock,
{
    let landed = |world: &W| landing.contains(&world.player_tile());
    if landed(&*world) {
        return Outcome::confirmed(SETTLE);
    }
    if world.is_animating() {
        if waits.teleport.until(clock, || landed(&*world)) {
            return Outcome::confirmed(SETTLE);
        }
        return Outcome::pending(BUSY);
    }
    if !world.travel_interface_open() {
        let query = ObjectQuery::named(FAIRY_RING)
            .within(ring_area.expanded(2))
            .with_action("Configure");
        let Some(ring) = world.closest_object(&query).filter(|ring| ring.reachable) else {
            return Outcome::failed("fairy ring out of reach", RETRY);
        };
        if let Some((action, last)) = ring.last_destination().filter(|(_, last)| *last == code) {
            if !world.interact_object(&ring, action) {
                return Outcome::failed(format!("{action} refused"), RETRY);
            }
            debug!(code = last, "travelling to last destination");
            if waits.teleport.until(clock, || landed(&*world)) {
                return Outcome::confirmed(SETTLE);
            }
            return Outcome::pending(BUSY);
        }
        if !world.interact_object(&ring, "Configure") {
            return Outcome::failed("fairy ring refused", RETRY);
        }
        if !waits.quick.until(clock, || world.travel_interface_open()) {
            return Outcome::failed("code interface did not open", RETRY);
        }
        return Outcome::pending(SETTLE);
    }
    if !world.travel(code) {
        return Outcome::failed(format!("code {code} rejected"), RETRY);
    }
    if waits.teleport.until(clock, || landed(&*world)) {
        debug!(code, to = %world.player_tile(), "teleported");
        Outcome::confirmed(SETTLE)
    } else {
        Outcome::failed(format!("no landing after {code}"), RETRY)
    }
}

pub(crate) fn vine_query() -> ObjectQuery {
    ObjectQuery::named_or_id(VINE, VINE_ID)
        .within(vine_area())
        .with_action("Search")
}

/// One search of the closest vine. Confirmed when the inventory is full.
pub(crate) fn search_vine<W, K, S>(world: &mut W, clock: &K, waits: &Waits, cooldown: &mut Cooldown) -> Outcome<S>
where
    W: Inventory + Movement + Scene + Dialogue,
    K: Clock,
{
    if world.inventory_is_full() {
        return Outcome::confirmed(SETTLE);
    }
    if world.can_continue() {
        world.continue_dialogue();
        waits.dialogue.until(clock, || !world.can_continue());
        return Outcome::pending(BUSY);
    }
    if world.is_animating() || world.is_moving() {
        return Outcome::pending(BUSY);
    }
    let now = clock.now();
    if !cooldown.ready(now) {
        return Outcome::pending(BUSY);
    }
    let Some(vine) = world.closest_object(&vine_query()) else {
        return Outcome::failed("no vine in the patch", RETRY);
    };
    if !vine.reachable {
        let walked = approach(world, clock, waits.travel, &vine_query());
        return if matches!(walked.verdict, Verdict::Confirmed) {
            Outcome::pending(SETTLE)
        } else {
            walked
        };
    }
    let before = world.inventory_count(GRIMY_SNAKEWEED);
    if !world.interact_object(&vine, "Search") {
        return Outcome::failed("vine refused the search", RETRY);
    }
    cooldown.mark(now);
    let started = waits.quick.until(clock, || {
        world.is_animating() || world.inventory_count(GRIMY_SNAKEWEED) > before
    });
    if started {
        debug!("searching vine");
        Outcome::pending(RETRY)
    } else {
        Outcome::failed("search did not start", RETRY)
    }
}

/// Herbs gained since the last observation; drops (cleaning, banking) only
/// lower the baseline.
pub(crate) fn herbs_gained<W: Inventory>(world: &W, seen: &mut u32) -> u32 {
    let count = world.inventory_count(GRIMY_SNAKEWEED);
    let gained = count.saturating_sub(*seen);
    *seen = count;
    gained
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::region::Tile;
    use crate::io::clock::VirtualClock;
    use crate::sim::collector_world;

    #[test]
    fn script_kind_parses_known_names() {
        assert_eq!("serum".parse::<ScriptKind>().expect("parse"), ScriptKind::Serum);
        assert!("smelter".parse::<ScriptKind>().is_err());
        assert_eq!(ScriptKind::Furnace.to_string(), "furnace");
    }

    #[test]
    fn waits_follow_config() {
        let mut cfg = RunnerConfig::default();
        cfg.timeouts.travel_ms = 7000;
        let waits = Waits::from_config(&cfg);
        assert_eq!(waits.travel.timeout, ms(7000));
        assert_eq!(waits.quick.poll, cfg.poll_interval());
    }

    #[test]
    fn walk_into_reports_pending_for_long_walks_and_confirms_on_arrival() {
        let clock = VirtualClock::new();
        let mut world = collector_world(clock.clone());
        let ring = catalog::home_ring_area();
        let wait = WaitCondition::new(ms(50), ms(5000));

        let first: Outcome<()> = walk_into(&mut world, &clock, wait, &ring);
        assert_eq!(first.verdict, Verdict::Pending);
        let mut arrived = false;
        for _ in 0..3 {
            let next: Outcome<()> = walk_into(&mut world, &clock, wait, &ring);
            assert!(!matches!(next.verdict, Verdict::Failed(_)));
            if next.verdict == Verdict::Confirmed {
                arrived = true;
                break;
            }
        }
        assert!(arrived);
        assert!(ring.contains(&world.player_tile()));
    }

    #[test]
    fn walk_into_fails_after_the_wait_when_blocked() {
        let clock = VirtualClock::new();
        let mut world = collector_world(clock.clone());
        let ring = catalog::home_ring_area();
        world.block(ring.clone());
        let wait = WaitCondition::new(ms(50), ms(5000));
        let start = clock.now();

        let outcome: Outcome<()> = walk_into(&mut world, &clock, wait, &ring);
        assert!(matches!(outcome.verdict, Verdict::Failed(_)));
        assert!(clock.now() - start >= ms(5000));
        assert_eq!(world.player_tile(), Tile::new(3165, 3487));
    }

    #[test]
    fn herbs_gained_ignores_drops() {
        let clock = VirtualClock::new();
        let mut world = collector_world(clock);
        let mut seen = 0;
        world.give(GRIMY_SNAKEWEED, 3);
        assert_eq!(herbs_gained(&world, &mut seen), 3);
        assert_eq!(herbs_gained(&world, &mut seen), 0);
    }
}
