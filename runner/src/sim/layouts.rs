//! Prebuilt worlds matching the locations each script expects.

use crate::core::region::Tile;
use crate::core::wait::Clock;
use crate::io::config::Recipe;
use crate::scripts::catalog::{
    ADAMANTITE_BAR, ADAMANTITE_ORE, BANK_CHEST, BAR_DISPENSER, COAL, COAL_BAG, CONVEYOR,
    CONVEYOR_TILE, DISPENSER_TILE, DRAMEN_STAFF, FAIRY_RING, FURNACE_BANK_TILE, GUAM_LEAF,
    HOME_CODE, ICE_GLOVES, IRON_ORE, NAIL_BEAST_NAILS, PATCH_CODE, STAMINA_POTION, STEEL_BAR,
    SUPER_RESTORE, SWAMP_TAR, UNICORN_HORN_DUST, VINE, VINE_ID,
};

use super::world::{ObjectKind, SimWorld, SmeltRule};

const ICE_GLOVES_ID: u32 = 1580;
const HOME_RING_TILE: Tile = Tile::new(3129, 3497);
const PATCH_RING_TILE: Tile = Tile::new(2801, 3003);
const GE_BANK_CHEST_TILE: Tile = Tile::new(3166, 3488);
const GE_BANK_START: Tile = Tile::new(3165, 3487);

/// Blast furnace with the player beside the bank chest, gloves worn and an
/// empty inventory. The bank holds `loads` full loads of the recipe's inputs.
pub fn furnace_world<K: Clock>(clock: K, recipe: Recipe, loads: u32) -> SimWorld<K> {
    let mut world = SimWorld::new(clock, Tile::new(FURNACE_BANK_TILE.x, FURNACE_BANK_TILE.y + 1));
    world
        .add_object(ObjectKind::BankChest, 26707, BANK_CHEST, FURNACE_BANK_TILE)
        .add_object(ObjectKind::Conveyor, 9100, CONVEYOR, CONVEYOR_TILE)
        .add_object(ObjectKind::Dispenser, 9092, BAR_DISPENSER, DISPENSER_TILE)
        .add_smelt_rule(SmeltRule {
            ore: IRON_ORE,
            bar: STEEL_BAR,
            coal_per_bar: 1,
            xp_tenths: 175,
        })
        .add_smelt_rule(SmeltRule {
            ore: ADAMANTITE_ORE,
            bar: ADAMANTITE_BAR,
            coal_per_bar: 3,
            xp_tenths: 375,
        })
        .equip(ICE_GLOVES_ID, ICE_GLOVES)
        .stock_bank(COAL_BAG, 1)
        .stock_bank(STAMINA_POTION, 5);
    match recipe {
        Recipe::Steel => {
            world
                .stock_bank(IRON_ORE, 27 * loads)
                .stock_bank(COAL, 27 * loads);
        }
        Recipe::Adamant => {
            world
                .stock_bank(ADAMANTITE_ORE, 27 * loads)
                .stock_bank(COAL, 81 * loads);
        }
    }
    world
}

/// Fairy-ring route between the bank and the snakeweed vines, with a staff worn.
pub fn collector_world<K: Clock>(clock: K) -> SimWorld<K> {
    let mut world = SimWorld::new(clock, GE_BANK_START);
    world
        .add_object(ObjectKind::BankChest, 10060, BANK_CHEST, GE_BANK_CHEST_TILE)
        .add_object(ObjectKind::FairyRing, 29495, FAIRY_RING, HOME_RING_TILE)
        .add_object(ObjectKind::FairyRing, 29560, FAIRY_RING, PATCH_RING_TILE)
        .add_object(ObjectKind::Vine, VINE_ID, VINE, Tile::new(2765, 3028))
        .add_object(ObjectKind::Vine, VINE_ID, VINE, Tile::new(2768, 3031))
        .add_teleport(PATCH_CODE, PATCH_RING_TILE)
        .add_teleport(HOME_CODE, HOME_RING_TILE)
        .equip(DRAMEN_STAFF, "Dramen staff");
    world
}

/// The collector route plus a bank stocked with trip supplies and `sets` of
/// serum ingredients.
pub fn serum_world<K: Clock>(clock: K, sets: u32) -> SimWorld<K> {
    let mut world = collector_world(clock);
    world
        .stock_bank(SWAMP_TAR, 100)
        .stock_bank(GUAM_LEAF, 100)
        .stock_bank(SUPER_RESTORE, sets)
        .stock_bank(UNICORN_HORN_DUST, sets)
        .stock_bank(NAIL_BEAST_NAILS, sets);
    world
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::client::{Equipment, Movement, ObjectQuery, Scene};
    use crate::io::clock::VirtualClock;
    use crate::scripts::catalog::{bank_area, furnace_area};

    #[test]
    fn furnace_world_starts_at_the_bank_chest() {
        let world = furnace_world(VirtualClock::new(), Recipe::Steel, 2);
        assert!(furnace_area().contains(&world.player_tile()));
        assert!(world.equipment_contains(ICE_GLOVES));
        let chest = world
            .closest_object(&ObjectQuery::named(BANK_CHEST))
            .expect("chest");
        assert!(chest.reachable);
        assert_eq!(world.bank_count(IRON_ORE), 54);
    }

    #[test]
    fn collector_world_starts_in_the_bank_area() {
        let world = collector_world(VirtualClock::new());
        assert!(bank_area().contains(&world.player_tile()));
        assert!(world.equipment_contains_item(DRAMEN_STAFF));
    }
}
