use gather_runner::core::machine::Trigger;
use gather_runner::core::region::Region;
use gather_runner::core::types::{Control, StopReason};
use gather_runner::io::client::Inventory;
use gather_runner::io::config::Recipe;
use gather_runner::scripts::Script;
use gather_runner::scripts::catalog::{COAL, DISPENSER_TILE, GUAM_LEAF, IRON_ORE, STEEL_BAR};
use gather_runner::scripts::furnace::{BARS, FurnaceState};
use gather_runner::test_support::{Ticked, furnace_script, tick_until};

#[test]
fn every_cycle_collects_once_and_banks_with_no_raw_materials() {
    let (clock, mut script) = furnace_script(Recipe::Steel, 3);
    script.start().expect("start");

    let mut bankings_seen = script.machine().entries(FurnaceState::Banking);
    let stop = loop {
        match script.step() {
            Control::Continue(delay) => clock.advance(delay),
            Control::Stop(reason) => break reason,
        }
        let bankings = script.machine().entries(FurnaceState::Banking);
        if bankings > bankings_seen {
            bankings_seen = bankings;
            let world = script.world();
            assert!(!world.inventory_contains(IRON_ORE), "ore carried back to the bank");
            assert!(!world.inventory_contains(COAL), "coal carried back to the bank");
            assert_eq!(world.coal_bag(), 0);
        }
        assert!(script.machine().steps() < 2_000, "furnace run did not terminate");
    };

    assert_eq!(stop, StopReason::ResourceExhausted { item: IRON_ORE });
    assert_eq!(script.machine().entries(FurnaceState::CollectingOutputs), 3);
    assert_eq!(script.stats().get(BARS), 81);
    assert_eq!(script.world().bank_count(STEEL_BAR), 81);
}

#[test]
fn blocked_dispenser_regresses_to_the_input_station() {
    let (clock, mut script) = furnace_script(Recipe::Steel, 1);
    script.start().expect("start");

    let ticked = tick_until(&mut script, &clock, 100, |s| {
        s.state() == FurnaceState::WalkingToCollector
    });
    assert!(matches!(ticked, Ticked::Reached(_)), "{ticked:?}");
    script
        .world_mut()
        .block(Region::rect(DISPENSER_TILE, DISPENSER_TILE));

    let ticked = tick_until(&mut script, &clock, 50, |s| {
        s.state() == FurnaceState::WalkingToInputStation
    });
    assert!(matches!(ticked, Ticked::Reached(_)), "{ticked:?}");
    let regressed = script
        .machine()
        .history()
        .last()
        .expect("transition recorded");
    assert_eq!(regressed.from, FurnaceState::WalkingToCollector);
    assert!(matches!(regressed.trigger, Trigger::RetriesExhausted { .. }));

    script.world_mut().unblock_all();
    let ticked = tick_until(&mut script, &clock, 100, |s| s.stats().get(BARS) > 0);
    assert!(matches!(ticked, Ticked::Reached(_)), "{ticked:?}");
    assert_eq!(script.machine().entries(FurnaceState::CollectingOutputs), 1);
    assert_eq!(script.stats().get(BARS), 27);
}

#[test]
fn refused_coal_bag_empty_never_leaves_for_the_collector() {
    let (clock, mut script) = furnace_script(Recipe::Steel, 2);
    script.start().expect("start");

    let ticked = tick_until(&mut script, &clock, 100, |s| {
        s.state() == FurnaceState::DepositingInputs
    });
    assert!(matches!(ticked, Ticked::Reached(_)), "{ticked:?}");
    // No free slot left for the bag's coal.
    script.world_mut().give(GUAM_LEAF, 27);

    let ticked = tick_until(&mut script, &clock, 20, |s| {
        s.state() != FurnaceState::DepositingInputs
    });
    assert!(matches!(ticked, Ticked::Reached(_)), "{ticked:?}");
    assert_eq!(script.state(), FurnaceState::WalkingToBank);
    assert_eq!(script.world().coal_bag(), 27);
    let regressed = script
        .machine()
        .history()
        .last()
        .expect("transition recorded");
    assert_eq!(regressed.from, FurnaceState::DepositingInputs);
    assert!(matches!(regressed.trigger, Trigger::RetriesExhausted { .. }));

    let ticked = tick_until(&mut script, &clock, 200, |s| {
        s.state() == FurnaceState::WalkingToCollector
    });
    assert!(matches!(ticked, Ticked::Reached(_)), "{ticked:?}");
    assert_eq!(script.world().coal_bag(), 0);
    assert!(!script.world().inventory_contains(COAL));
    assert!(!script.world().inventory_contains(GUAM_LEAF));
}
