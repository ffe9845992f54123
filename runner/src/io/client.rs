//! Narrow interfaces to the game client.
//!
//! Scripts depend only on these traits. Queries take `&self` so task admission
//! can be evaluated without mutation; interactions take `&mut self` and report
//! whether the client accepted the action, not whether it took effect. Effects
//! are confirmed separately with a bounded wait.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::region::{Region, Tile};
use crate::core::types::ItemId;

pub trait Inventory {
    fn inventory_contains(&self, item: ItemId) -> bool;
    fn inventory_count(&self, item: ItemId) -> u32;
    fn inventory_is_full(&self) -> bool;
    fn inventory_is_empty(&self) -> bool;
    fn inventory_free_slots(&self) -> u32;
    /// Whether any slot holds an item outside `keep`.
    fn inventory_contains_other_than(&self, keep: &[ItemId]) -> bool;
    fn interact_item(&mut self, item: ItemId, action: &str) -> bool;
}

pub trait Bank {
    fn bank_is_open(&self) -> bool;
    fn bank_contains(&self, item: ItemId) -> bool;
    fn open_bank(&mut self) -> bool;
    fn close_bank(&mut self) -> bool;
    fn deposit_all(&mut self, item: ItemId) -> bool;
    fn deposit_all_except(&mut self, keep: &[ItemId]) -> bool;
    fn withdraw(&mut self, item: ItemId, quantity: u32) -> bool;
}

pub trait Scene {
    fn closest_object(&self, query: &ObjectQuery) -> Option<SceneObject>;
    fn interact_object(&mut self, object: &SceneObject, action: &str) -> bool;
}

pub trait Movement {
    fn player_tile(&self) -> Tile;
    /// Start walking toward `target`. `false` when no path was found.
    fn walk_to(&mut self, target: Tile) -> bool;
    /// No walk is in progress and the last destination has not been reached.
    fn should_walk(&self) -> bool;
    fn is_moving(&self) -> bool;
    fn is_animating(&self) -> bool;
    /// Run energy percentage, 0..=100.
    fn run_energy(&self) -> u8;
}

pub trait Dialogue {
    fn in_dialogue(&self) -> bool;
    fn can_continue(&self) -> bool;
    fn continue_dialogue(&mut self) -> bool;
    /// Raw keystrokes, used for quantity prompts.
    fn type_keys(&mut self, keys: &str) -> bool;
}

pub trait Equipment {
    fn equipment_contains(&self, name: &str) -> bool;
    fn equipment_contains_item(&self, item: ItemId) -> bool;
}

pub trait Skills {
    fn experience(&self, skill: &str) -> u64;
}

/// Teleport network with a code-entry interface (fairy rings).
pub trait Teleports {
    fn travel_interface_open(&self) -> bool;
    fn travel(&mut self, code: &str) -> bool;
}

/// Everything a script may touch.
pub trait GameClient:
    Inventory + Bank + Scene + Movement + Dialogue + Equipment + Skills + Teleports
{
}

impl<T> GameClient for T where
    T: Inventory + Bank + Scene + Movement + Dialogue + Equipment + Skills + Teleports
{
}

/// A scene object as seen at query time.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneObject {
    pub id: u32,
    pub name: String,
    pub tile: Tile,
    pub actions: Vec<String>,
    pub distance: f64,
    pub reachable: bool,
}

/// One-click fairy-ring action offered once a code has been dialled there,
/// e.g. `Last-destination (CKR)`.
static LAST_DESTINATION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^Last-destination \(([A-Z]{3})\)$").ok());

impl SceneObject {
    pub fn has_action(&self, action: &str) -> bool {
        self.actions.iter().any(|a| a == action)
    }

    /// The last-destination action and the code it travels to, if offered.
    pub fn last_destination(&self) -> Option<(&str, &str)> {
        let pattern = LAST_DESTINATION.as_ref()?;
        self.actions.iter().find_map(|action| {
            let code = pattern.captures(action)?.get(1)?.as_str();
            Some((action.as_str(), code))
        })
    }
}

/// Filter for [`Scene::closest_object`]. Every populated field must match.
#[derive(Debug, Clone, Default)]
pub struct ObjectQuery {
    name: Option<String>,
    id: Option<u32>,
    within: Option<Region>,
    action: Option<String>,
}

impl ObjectQuery {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Match by name or by id, whichever the client reports.
    pub fn named_or_id(name: impl Into<String>, id: u32) -> Self {
        Self {
            name: Some(name.into()),
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn within(mut self, region: Region) -> Self {
        self.within = Some(region);
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn matches(&self, object: &SceneObject) -> bool {
        let by_name = self.name.as_ref().map(|name| *name == object.name);
        let by_id = self.id.map(|id| id == object.id);
        let identity = match (by_name, by_id) {
            (Some(n), Some(i)) => n || i,
            (Some(n), None) => n,
            (None, Some(i)) => i,
            (None, None) => true,
        };
        if !identity {
            return false;
        }
        if let Some(region) = &self.within {
            if !region.contains(&object.tile) {
                return false;
            }
        }
        if let Some(action) = &self.action {
            if !object.has_action(action) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(id: u32, name: &str, tile: Tile) -> SceneObject {
        SceneObject {
            id,
            name: name.to_string(),
            tile,
            actions: vec!["Search".to_string()],
            distance: 1.0,
            reachable: true,
        }
    }

    #[test]
    fn region_disambiguates_same_named_objects() {
        let here = Region::rect(Tile::new(0, 0), Tile::new(10, 10));
        let query = ObjectQuery::named("Fairy ring").within(here);
        assert!(query.matches(&object(1, "Fairy ring", Tile::new(3, 3))));
        assert!(!query.matches(&object(1, "Fairy ring", Tile::new(30, 3))));
        assert!(!query.matches(&object(1, "Bank chest", Tile::new(3, 3))));
    }

    #[test]
    fn name_or_id_accepts_either_identity() {
        let query = ObjectQuery::named_or_id("Marshy jungle vine", 21941).with_action("Search");
        assert!(query.matches(&object(21941, "Vine", Tile::new(0, 0))));
        assert!(query.matches(&object(7, "Marshy jungle vine", Tile::new(0, 0))));
        assert!(!query.matches(&object(7, "Marshy jungle vine (dead)", Tile::new(0, 0))));
        assert!(!query.with_action("Pick").matches(&object(21941, "Vine", Tile::new(0, 0))));
    }

    #[test]
    fn last_destination_reads_the_dialled_code() {
        let mut ring = object(29495, "Fairy ring", Tile::new(0, 0));
        ring.actions = vec!["Configure".to_string()];
        assert_eq!(ring.last_destination(), None);

        ring.actions.push("Last-destination (CKR)".to_string());
        assert_eq!(
            ring.last_destination(),
            Some(("Last-destination (CKR)", "CKR"))
        );

        ring.actions[1] = "Last-destination (ckr)".to_string();
        assert_eq!(ring.last_destination(), None);
    }
}
