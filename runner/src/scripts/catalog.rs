//! Item ids, object names and locations the scripts act on.

use crate::core::region::{Region, Tile};
use crate::core::types::ItemId;

pub const COAL: ItemId = 453;
pub const IRON_ORE: ItemId = 440;
pub const STEEL_BAR: ItemId = 2353;
pub const ADAMANTITE_ORE: ItemId = 449;
pub const ADAMANTITE_BAR: ItemId = 2361;
pub const COAL_BAG: ItemId = 12019;
pub const STAMINA_POTION: ItemId = 12625;

pub const GRIMY_SNAKEWEED: ItemId = 1525;
pub const SNAKEWEED: ItemId = 1526;
pub const DRAMEN_STAFF: ItemId = 772;
pub const SWAMP_TAR: ItemId = 1939;
pub const GUAM_LEAF: ItemId = 249;
pub const SUPER_RESTORE: ItemId = 3024;
pub const UNICORN_HORN_DUST: ItemId = 235;
pub const NAIL_BEAST_NAILS: ItemId = 4198;
pub const SANFEW_SERUM: ItemId = 10925;

/// Carried on every snakeweed trip. The staff may be worn instead.
pub const COLLECTION_SUPPLIES: [ItemId; 3] = [SWAMP_TAR, GUAM_LEAF, DRAMEN_STAFF];
pub const SERUM_INGREDIENTS: [ItemId; 3] = [SUPER_RESTORE, UNICORN_HORN_DUST, NAIL_BEAST_NAILS];

pub const CONVEYOR: &str = "Conveyor belt";
pub const BAR_DISPENSER: &str = "Bar dispenser";
pub const BANK_CHEST: &str = "Bank chest";
pub const FAIRY_RING: &str = "Fairy ring";
pub const VINE: &str = "Marshy jungle vine";
pub const VINE_ID: u32 = 21941;

pub const ICE_GLOVES: &str = "Ice gloves";
pub const SMITHING: &str = "Smithing";
pub const HERBLORE: &str = "Herblore";

/// Fairy ring code that lands beside the vines.
pub const PATCH_CODE: &str = "CKR";
/// Fairy ring code that lands near the bank.
pub const HOME_CODE: &str = "DKR";

pub const CONVEYOR_TILE: Tile = Tile::new(1942, 4967);
pub const DISPENSER_TILE: Tile = Tile::new(1940, 4964);
pub const FURNACE_BANK_TILE: Tile = Tile::new(1948, 4957);

pub fn furnace_area() -> Region {
    Region::rect(Tile::new(1934, 4956), Tile::new(1954, 4974))
}

pub fn vine_area() -> Region {
    Region::rect(Tile::new(2757, 3014), Tile::new(2776, 3044))
}

pub fn home_ring_area() -> Region {
    Region::rect(Tile::new(3128, 3496), Tile::new(3131, 3498))
}

pub fn patch_ring_area() -> Region {
    Region::rect(Tile::new(2798, 3000), Tile::new(2804, 3006))
}

pub fn bank_area() -> Region {
    Region::rect(Tile::new(3164, 3485), Tile::new(3167, 3489))
}

/// Everything reachable on foot from the patch-side fairy ring.
pub fn patch_side() -> Region {
    Region::rect(Tile::new(2700, 2950), Tile::new(2850, 3100))
}
