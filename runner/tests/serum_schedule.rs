use std::collections::BTreeSet;

use gather_runner::core::types::Control;
use gather_runner::io::config::RunnerConfig;
use gather_runner::scripts::Script;
use gather_runner::scripts::catalog::SANFEW_SERUM;
use gather_runner::test_support::serum_script;

#[test]
fn exactly_the_selected_task_runs_each_tick() {
    let (clock, mut script) = serum_script(&RunnerConfig::default(), 2);
    script.start().expect("start");

    let mut ran = BTreeSet::new();
    for _ in 0..3_000 {
        if script.world().bank_count(SANFEW_SERUM) > 0 {
            break;
        }
        let selected = script.next_task().map(str::to_string);
        assert_eq!(
            script.next_task().map(str::to_string),
            selected,
            "admission must not change the world"
        );
        let control = script.step();
        assert_eq!(script.last_task().map(str::to_string), selected);
        if let Some(name) = selected {
            ran.insert(name);
        }
        match control {
            Control::Continue(delay) => clock.advance(delay),
            Control::Stop(reason) => panic!("serum run stopped early: {reason}"),
        }
    }

    assert!(script.world().bank_count(SANFEW_SERUM) > 0);
    for task in ["travel", "collect", "clean-herbs", "craft-serum", "banking"] {
        assert!(ran.contains(task), "{task} never ran: {ran:?}");
    }
}

#[test]
fn disabled_processing_tasks_never_admit() {
    let mut cfg = RunnerConfig::default();
    cfg.serum.clean_herbs = false;
    cfg.serum.make_serums = false;
    let (clock, mut script) = serum_script(&cfg, 2);
    script.start().expect("start");

    for _ in 0..400 {
        match script.step() {
            Control::Continue(delay) => clock.advance(delay),
            Control::Stop(_) => break,
        }
        let task = script.last_task().unwrap_or("idle");
        assert!(
            task != "clean-herbs" && task != "craft-serum",
            "{task} ran while disabled"
        );
    }
}
