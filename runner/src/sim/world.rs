//! Deterministic in-process game world.
//!
//! Effects that take time in the real client (walking, smelting, teleporting,
//! searching) are queued with a due instant and applied lazily whenever the
//! world is observed, so a [`VirtualClock`](crate::io::clock::VirtualClock)
//! shared with the script drives everything.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::core::region::{Region, Tile};
use crate::core::types::ItemId;
use crate::core::wait::Clock;
use crate::io::client::{
    Bank, Dialogue, Equipment, Inventory, Movement, ObjectQuery, Scene, SceneObject, Skills,
    Teleports,
};
use crate::scripts::catalog::{
    COAL, COAL_BAG, DRAMEN_STAFF, GRIMY_SNAKEWEED, HERBLORE, NAIL_BEAST_NAILS, SANFEW_SERUM,
    SMITHING, SNAKEWEED, STAMINA_POTION, SUPER_RESTORE, UNICORN_HORN_DUST,
};

pub const INVENTORY_SLOTS: usize = 28;
pub const COAL_BAG_CAPACITY: u32 = 27;
/// Objects within this many steps can be interacted with.
pub const REACH: u32 = 2;
/// Longest walk the pathfinder accepts; anything further needs a teleport.
pub const MAX_WALK_STEPS: u32 = 200;

const MS_PER_STEP_RUNNING: u64 = 300;
const MS_PER_STEP_WALKING: u64 = 600;
const BANK_OPEN_DELAY: Duration = Duration::from_millis(600);
const SMELT_DELAY: Duration = Duration::from_millis(1200);
const SEARCH_DELAY: Duration = Duration::from_millis(1800);
const TELEPORT_DELAY: Duration = Duration::from_millis(1800);
const COMBINE_DELAY: Duration = Duration::from_millis(1200);
/// Every n-th successful search ends in a message that must be continued.
const SEARCH_MESSAGE_EVERY: u64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    BankChest,
    Conveyor,
    Dispenser,
    Vine,
    FairyRing,
}

impl ObjectKind {
    fn actions(self) -> &'static [&'static str] {
        match self {
            ObjectKind::BankChest => &["Use"],
            ObjectKind::Conveyor => &["Put-ore-on"],
            ObjectKind::Dispenser => &["Take", "Check"],
            ObjectKind::Vine => &["Search"],
            ObjectKind::FairyRing => &["Configure"],
        }
    }
}

#[derive(Debug, Clone)]
struct SimObject {
    id: u32,
    name: String,
    tile: Tile,
    kind: ObjectKind,
}

/// Ore smelted into bars by the furnace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmeltRule {
    pub ore: ItemId,
    pub bar: ItemId,
    pub coal_per_bar: u32,
    /// Experience per bar, in tenths.
    pub xp_tenths: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prompt {
    /// "How many bars?" quantity entry.
    Quantity,
    /// A message with a continue button.
    Message,
}

#[derive(Debug, Clone, Copy)]
enum Effect {
    OpenBank,
    Smelt,
    Herb,
    Teleport(Tile),
    Combine,
}

/// How the world answered an interaction.
enum Reply {
    Refused,
    Accepted,
    /// Accepted; the effect lands after a delay.
    Later(Duration, Effect),
}

#[derive(Debug, Clone, Copy)]
struct Walk {
    to: Tile,
    arrive_at: Instant,
}

#[derive(Debug, Default)]
struct Furnace {
    coal: u32,
    ore: BTreeMap<ItemId, u32>,
    ready: BTreeMap<ItemId, u32>,
}

#[derive(Debug)]
struct WorldState {
    player: Tile,
    walk: Option<Walk>,
    destination: Option<Tile>,
    run_energy: u8,
    inventory: Vec<ItemId>,
    bank: BTreeMap<ItemId, u32>,
    bank_open: bool,
    equipment: Vec<(ItemId, String)>,
    objects: Vec<SimObject>,
    blocked: Vec<Region>,
    prompt: Option<Prompt>,
    /// Ring whose code interface is open.
    dialling_at: Option<u32>,
    /// Last code dialled at each ring.
    last_codes: BTreeMap<u32, String>,
    rings_configured: u32,
    teleports: BTreeMap<String, Tile>,
    experience: BTreeMap<String, u64>,
    coal_bag: u32,
    rules: Vec<SmeltRule>,
    furnace: Furnace,
    animating_until: Option<Instant>,
    pending: Vec<(Instant, Effect)>,
    searches: u64,
}

impl WorldState {
    fn settle(&mut self, now: Instant) {
        if let Some(walk) = self.walk {
            if now >= walk.arrive_at {
                self.player = walk.to;
                self.walk = None;
            }
        }
        let mut due: Vec<(Instant, Effect)> = Vec::new();
        self.pending.retain(|(at, effect)| {
            if *at <= now {
                due.push((*at, *effect));
                false
            } else {
                true
            }
        });
        due.sort_by_key(|(at, _)| *at);
        for (_, effect) in due {
            self.apply(effect);
        }
    }

    fn apply(&mut self, effect: Effect) {
        trace!(effect = ?effect, "applying effect");
        match effect {
            Effect::OpenBank => self.bank_open = true,
            Effect::Smelt => self.smelt(),
            Effect::Herb => {
                if self.inventory.len() < INVENTORY_SLOTS {
                    self.inventory.push(GRIMY_SNAKEWEED);
                    self.searches += 1;
                    if self.searches % SEARCH_MESSAGE_EVERY == 0 {
                        self.prompt = Some(Prompt::Message);
                    }
                }
            }
            Effect::Teleport(tile) => {
                self.player = tile;
                self.walk = None;
                self.destination = None;
            }
            Effect::Combine => {
                let parts = [SUPER_RESTORE, UNICORN_HORN_DUST, NAIL_BEAST_NAILS, SNAKEWEED];
                if parts.iter().all(|part| self.inventory.contains(part)) {
                    for part in parts {
                        self.remove_one(part);
                    }
                    self.inventory.push(SANFEW_SERUM);
                    *self.experience.entry(HERBLORE.to_string()).or_insert(0) += 1600;
                }
            }
        }
    }

    fn smelt(&mut self) {
        for rule in &self.rules {
            let Some(ore) = self.furnace.ore.get_mut(&rule.ore) else {
                continue;
            };
            let bars = (*ore).min(self.furnace.coal / rule.coal_per_bar.max(1));
            if bars == 0 {
                continue;
            }
            *ore -= bars;
            self.furnace.coal -= bars * rule.coal_per_bar;
            *self.furnace.ready.entry(rule.bar).or_insert(0) += bars;
            *self.experience.entry(SMITHING.to_string()).or_insert(0) +=
                u64::from(bars) * rule.xp_tenths;
            debug!(bar = rule.bar, bars, "furnace produced bars");
        }
    }

    fn count(&self, item: ItemId) -> u32 {
        self.inventory.iter().filter(|held| **held == item).count() as u32
    }

    fn free_slots(&self) -> u32 {
        (INVENTORY_SLOTS - self.inventory.len().min(INVENTORY_SLOTS)) as u32
    }

    fn remove_one(&mut self, item: ItemId) -> bool {
        match self.inventory.iter().position(|held| *held == item) {
            Some(idx) => {
                self.inventory.remove(idx);
                true
            }
            None => false,
        }
    }

    fn is_blocked(&self, tile: &Tile) -> bool {
        self.blocked.iter().any(|region| region.contains(tile))
    }

    fn is_reachable(&self, tile: &Tile) -> bool {
        !self.is_blocked(tile) && self.player.steps_to(tile).is_some_and(|steps| steps <= REACH)
    }

    fn has_staff(&self) -> bool {
        self.inventory.contains(&DRAMEN_STAFF)
            || self.equipment.iter().any(|(id, _)| *id == DRAMEN_STAFF)
    }

    fn actions_of(&self, object: &SimObject) -> Vec<String> {
        let mut actions: Vec<String> = object
            .kind
            .actions()
            .iter()
            .map(|action| (*action).to_string())
            .collect();
        if let Some(code) = self.last_codes.get(&object.id) {
            actions.push(format!("Last-destination ({code})"));
        }
        actions
    }

    fn teleport_to(&mut self, code: &str, now: Instant) -> Reply {
        let Some(tile) = self.teleports.get(code).copied() else {
            return Reply::Refused;
        };
        self.walk = None;
        self.animating_until = Some(now + TELEPORT_DELAY);
        Reply::Later(TELEPORT_DELAY, Effect::Teleport(tile))
    }

    fn scene_object(&self, object: &SimObject) -> SceneObject {
        SceneObject {
            id: object.id,
            name: object.name.clone(),
            tile: object.tile,
            actions: self.actions_of(object),
            distance: self.player.distance(&object.tile),
            reachable: self.is_reachable(&object.tile),
        }
    }

    fn interrupt(&mut self) {
        self.bank_open = false;
        self.prompt = None;
        self.dialling_at = None;
    }
}

/// Simulated client implementing every collaborator trait.
#[derive(Debug)]
pub struct SimWorld<K> {
    clock: K,
    state: RefCell<WorldState>,
}

impl<K: Clock> SimWorld<K> {
    pub fn new(clock: K, player: Tile) -> Self {
        Self {
            clock,
            state: RefCell::new(WorldState {
                player,
                walk: None,
                destination: None,
                run_energy: 100,
                inventory: Vec::new(),
                bank: BTreeMap::new(),
                bank_open: false,
                equipment: Vec::new(),
                objects: Vec::new(),
                blocked: Vec::new(),
                prompt: None,
                dialling_at: None,
                last_codes: BTreeMap::new(),
                rings_configured: 0,
                teleports: BTreeMap::new(),
                experience: BTreeMap::new(),
                coal_bag: 0,
                rules: Vec::new(),
                furnace: Furnace::default(),
                animating_until: None,
                pending: Vec::new(),
                searches: 0,
            }),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut WorldState) -> R) -> R {
        let now = self.clock.now();
        let mut state = self.state.borrow_mut();
        state.settle(now);
        f(&mut state)
    }

    fn answer(&self, reply: Reply) -> bool {
        match reply {
            Reply::Refused => false,
            Reply::Accepted => true,
            Reply::Later(after, effect) => {
                let at = self.clock.now() + after;
                self.state.borrow_mut().pending.push((at, effect));
                true
            }
        }
    }

    pub fn add_object(&mut self, kind: ObjectKind, id: u32, name: &str, tile: Tile) -> &mut Self {
        self.state.get_mut().objects.push(SimObject {
            id,
            name: name.to_string(),
            tile,
            kind,
        });
        self
    }

    pub fn add_teleport(&mut self, code: &str, tile: Tile) -> &mut Self {
        self.state.get_mut().teleports.insert(code.to_string(), tile);
        self
    }

    pub fn add_smelt_rule(&mut self, rule: SmeltRule) -> &mut Self {
        self.state.get_mut().rules.push(rule);
        self
    }

    pub fn stock_bank(&mut self, item: ItemId, quantity: u32) -> &mut Self {
        *self.state.get_mut().bank.entry(item).or_insert(0) += quantity;
        self
    }

    pub fn clear_bank(&mut self, item: ItemId) -> &mut Self {
        self.state.get_mut().bank.remove(&item);
        self
    }

    /// Put `quantity` items straight into the inventory, ignoring the slot limit.
    pub fn give(&mut self, item: ItemId, quantity: u32) -> &mut Self {
        let state = self.state.get_mut();
        state
            .inventory
            .extend(std::iter::repeat_n(item, quantity as usize));
        self
    }

    pub fn equip(&mut self, item: ItemId, name: &str) -> &mut Self {
        self.state.get_mut().equipment.push((item, name.to_string()));
        self
    }

    pub fn set_run_energy(&mut self, energy: u8) -> &mut Self {
        self.state.get_mut().run_energy = energy.min(100);
        self
    }

    /// Walks into `region` never arrive and objects inside it are unreachable.
    pub fn block(&mut self, region: Region) -> &mut Self {
        self.state.get_mut().blocked.push(region);
        self
    }

    pub fn unblock_all(&mut self) -> &mut Self {
        self.state.get_mut().blocked.clear();
        self
    }

    pub fn bank_count(&self, item: ItemId) -> u32 {
        self.with(|s| s.bank.get(&item).copied().unwrap_or(0))
    }

    pub fn coal_bag(&self) -> u32 {
        self.with(|s| s.coal_bag)
    }

    /// How many times a fairy ring's code interface has been opened.
    pub fn rings_configured(&self) -> u32 {
        self.with(|s| s.rings_configured)
    }

    /// Bars waiting in the dispenser.
    pub fn dispenser_ready(&self, bar: ItemId) -> u32 {
        self.with(|s| s.furnace.ready.get(&bar).copied().unwrap_or(0))
    }

    pub fn inventory_items(&self) -> Vec<ItemId> {
        self.with(|s| s.inventory.clone())
    }
}

impl<K: Clock> Inventory for SimWorld<K> {
    fn inventory_contains(&self, item: ItemId) -> bool {
        self.with(|s| s.inventory.contains(&item))
    }

    fn inventory_count(&self, item: ItemId) -> u32 {
        self.with(|s| s.count(item))
    }

    fn inventory_is_full(&self) -> bool {
        self.with(|s| s.free_slots() == 0)
    }

    fn inventory_is_empty(&self) -> bool {
        self.with(|s| s.inventory.is_empty())
    }

    fn inventory_free_slots(&self) -> u32 {
        self.with(|s| s.free_slots())
    }

    fn inventory_contains_other_than(&self, keep: &[ItemId]) -> bool {
        self.with(|s| s.inventory.iter().any(|held| !keep.contains(held)))
    }

    fn interact_item(&mut self, item: ItemId, action: &str) -> bool {
        let reply = self.with(|s| {
            if !s.inventory.contains(&item) {
                return Reply::Refused;
            }
            match (item, action) {
                (COAL_BAG, "Fill") => {
                    if !s.bank_open {
                        return Reply::Refused;
                    }
                    let in_bank = s.bank.get(&COAL).copied().unwrap_or(0);
                    let moved = (COAL_BAG_CAPACITY - s.coal_bag).min(in_bank);
                    if moved > 0 {
                        s.coal_bag += moved;
                        if let Some(stock) = s.bank.get_mut(&COAL) {
                            *stock -= moved;
                        }
                    }
                    Reply::Accepted
                }
                (COAL_BAG, "Empty") => {
                    let moved = s.coal_bag.min(s.free_slots());
                    if moved == 0 {
                        return Reply::Refused;
                    }
                    s.coal_bag -= moved;
                    s.inventory
                        .extend(std::iter::repeat_n(COAL, moved as usize));
                    Reply::Accepted
                }
                (STAMINA_POTION, "Drink") => {
                    s.remove_one(STAMINA_POTION);
                    s.run_energy = 100;
                    Reply::Accepted
                }
                (GRIMY_SNAKEWEED, "Clean") => {
                    s.remove_one(GRIMY_SNAKEWEED);
                    s.inventory.push(SNAKEWEED);
                    *s.experience.entry(HERBLORE.to_string()).or_insert(0) += 25;
                    Reply::Accepted
                }
                (SUPER_RESTORE, "Use") => {
                    let ready = [UNICORN_HORN_DUST, NAIL_BEAST_NAILS, SNAKEWEED]
                        .iter()
                        .all(|part| s.inventory.contains(part));
                    if ready {
                        Reply::Later(COMBINE_DELAY, Effect::Combine)
                    } else {
                        Reply::Refused
                    }
                }
                _ => Reply::Refused,
            }
        });
        self.answer(reply)
    }
}

impl<K: Clock> Bank for SimWorld<K> {
    fn bank_is_open(&self) -> bool {
        self.with(|s| s.bank_open)
    }

    fn bank_contains(&self, item: ItemId) -> bool {
        self.with(|s| s.bank.get(&item).is_some_and(|count| *count > 0))
    }

    fn open_bank(&mut self) -> bool {
        let near_chest = self.with(|s| {
            s.bank_open
                || s.objects
                    .iter()
                    .any(|o| o.kind == ObjectKind::BankChest && s.is_reachable(&o.tile))
        });
        if near_chest {
            self.answer(Reply::Later(BANK_OPEN_DELAY, Effect::OpenBank))
        } else {
            false
        }
    }

    fn close_bank(&mut self) -> bool {
        self.with(|s| {
            s.bank_open = false;
            true
        })
    }

    fn deposit_all(&mut self, item: ItemId) -> bool {
        self.with(|s| {
            let count = s.count(item);
            if !s.bank_open || count == 0 {
                return false;
            }
            s.inventory.retain(|held| *held != item);
            *s.bank.entry(item).or_insert(0) += count;
            true
        })
    }

    fn deposit_all_except(&mut self, keep: &[ItemId]) -> bool {
        self.with(|s| {
            if !s.bank_open {
                return false;
            }
            let (kept, deposited): (Vec<ItemId>, Vec<ItemId>) =
                s.inventory.iter().partition(|held| keep.contains(held));
            for item in deposited {
                *s.bank.entry(item).or_insert(0) += 1;
            }
            s.inventory = kept;
            true
        })
    }

    fn withdraw(&mut self, item: ItemId, quantity: u32) -> bool {
        self.with(|s| {
            if !s.bank_open {
                return false;
            }
            let stock = s.bank.get(&item).copied().unwrap_or(0);
            let moved = quantity.min(stock).min(s.free_slots());
            if moved == 0 {
                return false;
            }
            if let Some(count) = s.bank.get_mut(&item) {
                *count -= moved;
            }
            s.inventory
                .extend(std::iter::repeat_n(item, moved as usize));
            true
        })
    }
}

impl<K: Clock> Scene for SimWorld<K> {
    fn closest_object(&self, query: &ObjectQuery) -> Option<SceneObject> {
        self.with(|s| {
            s.objects
                .iter()
                .filter(|o| o.tile.plane == s.player.plane)
                .map(|o| s.scene_object(o))
                .filter(|o| query.matches(o))
                .min_by(|a, b| a.distance.total_cmp(&b.distance))
        })
    }

    fn interact_object(&mut self, object: &SceneObject, action: &str) -> bool {
        let now = self.clock.now();
        let reply = self.with(|s| {
            let Some(target) = s
                .objects
                .iter()
                .find(|o| o.id == object.id && o.tile == object.tile)
                .cloned()
            else {
                return Reply::Refused;
            };
            let offered = s.actions_of(&target).iter().any(|a| a == action);
            if !offered || !s.is_reachable(&target.tile) {
                return Reply::Refused;
            }
            match target.kind {
                ObjectKind::BankChest => Reply::Later(BANK_OPEN_DELAY, Effect::OpenBank),
                ObjectKind::Conveyor => {
                    let ores: Vec<ItemId> = s.rules.iter().map(|rule| rule.ore).collect();
                    let mut loaded = false;
                    let mut kept = Vec::with_capacity(s.inventory.len());
                    for item in std::mem::take(&mut s.inventory) {
                        if item == COAL {
                            s.furnace.coal += 1;
                            loaded = true;
                        } else if ores.contains(&item) {
                            *s.furnace.ore.entry(item).or_insert(0) += 1;
                            loaded = true;
                        } else {
                            kept.push(item);
                        }
                    }
                    s.inventory = kept;
                    if loaded {
                        Reply::Later(SMELT_DELAY, Effect::Smelt)
                    } else {
                        Reply::Refused
                    }
                }
                ObjectKind::Dispenser => {
                    if action == "Take" && s.furnace.ready.values().any(|bars| *bars > 0) {
                        s.prompt = Some(Prompt::Quantity);
                    }
                    Reply::Accepted
                }
                ObjectKind::Vine => {
                    let busy = s.prompt.is_some()
                        || s.animating_until.is_some_and(|until| until > now);
                    if busy {
                        return Reply::Refused;
                    }
                    s.animating_until = Some(now + SEARCH_DELAY);
                    Reply::Later(SEARCH_DELAY, Effect::Herb)
                }
                ObjectKind::FairyRing => {
                    if !s.has_staff() {
                        return Reply::Refused;
                    }
                    if action == "Configure" {
                        s.dialling_at = Some(target.id);
                        s.rings_configured += 1;
                        return Reply::Accepted;
                    }
                    match s.last_codes.get(&target.id).cloned() {
                        Some(code) => s.teleport_to(&code, now),
                        None => Reply::Refused,
                    }
                }
            }
        });
        self.answer(reply)
    }
}

impl<K: Clock> Movement for SimWorld<K> {
    fn player_tile(&self) -> Tile {
        self.with(|s| s.player)
    }

    fn walk_to(&mut self, target: Tile) -> bool {
        let now = self.clock.now();
        self.with(|s| {
            let Some(steps) = s.player.steps_to(&target) else {
                return false;
            };
            if steps > MAX_WALK_STEPS {
                return false;
            }
            s.interrupt();
            s.destination = Some(target);
            if s.is_blocked(&target) {
                s.walk = None;
                return true;
            }
            let per_step = if s.run_energy > 0 {
                MS_PER_STEP_RUNNING
            } else {
                MS_PER_STEP_WALKING
            };
            s.run_energy = s.run_energy.saturating_sub((steps / 4) as u8);
            s.walk = Some(Walk {
                to: target,
                arrive_at: now + Duration::from_millis(u64::from(steps) * per_step),
            });
            true
        })
    }

    fn should_walk(&self) -> bool {
        self.with(|s| s.walk.is_none() && s.destination.is_some_and(|d| d != s.player))
    }

    fn is_moving(&self) -> bool {
        self.with(|s| s.walk.is_some())
    }

    fn is_animating(&self) -> bool {
        let now = self.clock.now();
        self.with(|s| s.animating_until.is_some_and(|until| until > now))
    }

    fn run_energy(&self) -> u8 {
        self.with(|s| s.run_energy)
    }
}

impl<K: Clock> Dialogue for SimWorld<K> {
    fn in_dialogue(&self) -> bool {
        self.with(|s| s.prompt.is_some())
    }

    fn can_continue(&self) -> bool {
        self.with(|s| s.prompt == Some(Prompt::Message))
    }

    fn continue_dialogue(&mut self) -> bool {
        self.with(|s| {
            if s.prompt == Some(Prompt::Message) {
                s.prompt = None;
                true
            } else {
                false
            }
        })
    }

    fn type_keys(&mut self, keys: &str) -> bool {
        self.with(|s| {
            if s.prompt != Some(Prompt::Quantity) || keys.trim().is_empty() {
                return false;
            }
            s.prompt = None;
            let bars: Vec<ItemId> = s.furnace.ready.keys().copied().collect();
            for bar in bars {
                let taken = s.furnace.ready.get(&bar).copied().unwrap_or(0).min(s.free_slots());
                if taken == 0 {
                    continue;
                }
                if let Some(ready) = s.furnace.ready.get_mut(&bar) {
                    *ready -= taken;
                }
                s.inventory.extend(std::iter::repeat_n(bar, taken as usize));
            }
            true
        })
    }
}

impl<K: Clock> Equipment for SimWorld<K> {
    fn equipment_contains(&self, name: &str) -> bool {
        self.with(|s| s.equipment.iter().any(|(_, worn)| worn == name))
    }

    fn equipment_contains_item(&self, item: ItemId) -> bool {
        self.with(|s| s.equipment.iter().any(|(id, _)| *id == item))
    }
}

impl<K: Clock> Skills for SimWorld<K> {
    fn experience(&self, skill: &str) -> u64 {
        self.with(|s| s.experience.get(skill).copied().unwrap_or(0) / 10)
    }
}

impl<K: Clock> Teleports for SimWorld<K> {
    fn travel_interface_open(&self) -> bool {
        self.with(|s| s.dialling_at.is_some())
    }

    fn travel(&mut self, code: &str) -> bool {
        let now = self.clock.now();
        let reply = self.with(|s| {
            let Some(ring) = s.dialling_at else {
                return Reply::Refused;
            };
            if !s.teleports.contains_key(code) {
                return Reply::Refused;
            }
            s.dialling_at = None;
            s.last_codes.insert(ring, code.to_string());
            s.teleport_to(code, now)
        });
        self.answer(reply)
    }
}
