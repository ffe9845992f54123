//! Priority-ordered task selection.
//!
//! Tasks are evaluated strictly in registration order and the first one that
//! admits runs exactly one step. Admission takes `&self` and `&C`, so the type
//! system keeps it free of side effects; only the selected task's `step` may
//! mutate anything.

use std::time::Duration;

use tracing::{debug, trace};

use crate::core::types::Control;

/// A candidate unit of work.
pub trait Task<C> {
    fn name(&self) -> &str;

    /// Whether this task wants to run against the current world snapshot.
    fn admit(&self, ctx: &C) -> bool;

    /// Perform one bounded unit of interaction.
    fn step(&mut self, ctx: &mut C) -> Control;

    /// Forget per-run state when the owning script restarts.
    fn reset(&mut self) {}
}

/// What happened during one scheduler tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    /// Name of the task that ran, if any admitted.
    pub task: Option<String>,
    pub control: Control,
}

pub struct TaskScheduler<C> {
    tasks: Vec<Box<dyn Task<C>>>,
    idle_delay: Duration,
    ticks: u64,
}

impl<C> TaskScheduler<C> {
    pub fn new(idle_delay: Duration) -> Self {
        Self {
            tasks: Vec::new(),
            idle_delay,
            ticks: 0,
        }
    }

    /// Append a task at the lowest priority so far.
    pub fn register<T: Task<C> + 'static>(&mut self, task: T) -> &mut Self {
        self.tasks.push(Box::new(task));
        self
    }

    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|task| task.name()).collect()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Reset the tick counter and every task's per-run state.
    pub fn reset(&mut self) {
        self.ticks = 0;
        self.tasks.iter_mut().for_each(|task| task.reset());
    }

    /// Index of the first admitting task.
    pub fn select(&self, ctx: &C) -> Option<usize> {
        self.tasks.iter().position(|task| task.admit(ctx))
    }

    /// Run one tick: select, then step the selected task only.
    pub fn tick(&mut self, ctx: &mut C) -> TickReport {
        self.ticks += 1;
        let Some(index) = self.select(ctx) else {
            trace!(tick = self.ticks, "no task admitted");
            return TickReport {
                tick: self.ticks,
                task: None,
                control: Control::Continue(self.idle_delay),
            };
        };
        let task = &mut self.tasks[index];
        debug!(tick = self.ticks, task = task.name(), "running task");
        let control = task.step(ctx);
        TickReport {
            tick: self.ticks,
            task: Some(task.name().to_string()),
            control,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{StopReason, ms};

    #[derive(Default)]
    struct Shared {
        inventory_full: bool,
        log: Vec<&'static str>,
    }

    struct Probe {
        name: &'static str,
        admit_when_full: Option<bool>,
        delay: Duration,
    }

    impl Task<Shared> for Probe {
        fn name(&self) -> &str {
            self.name
        }

        fn admit(&self, ctx: &Shared) -> bool {
            match self.admit_when_full {
                Some(full) => ctx.inventory_full == full,
                None => false,
            }
        }

        fn step(&mut self, ctx: &mut Shared) -> Control {
            ctx.log.push(self.name);
            Control::Continue(self.delay)
        }
    }

    fn scheduler() -> TaskScheduler<Shared> {
        let mut scheduler = TaskScheduler::new(ms(600));
        scheduler
            .register(Probe {
                name: "bank",
                admit_when_full: Some(true),
                delay: ms(300),
            })
            .register(Probe {
                name: "collect",
                admit_when_full: Some(false),
                delay: ms(200),
            })
            .register(Probe {
                name: "also-bank",
                admit_when_full: Some(true),
                delay: ms(100),
            });
        scheduler
    }

    #[test]
    fn earlier_registration_wins_and_only_one_task_runs() {
        let mut scheduler = scheduler();
        let mut shared = Shared {
            inventory_full: true,
            ..Shared::default()
        };

        let report = scheduler.tick(&mut shared);
        assert_eq!(report.task.as_deref(), Some("bank"));
        assert_eq!(report.control, Control::Continue(ms(300)));
        assert_eq!(shared.log, vec!["bank"]);

        shared.inventory_full = false;
        let report = scheduler.tick(&mut shared);
        assert_eq!(report.task.as_deref(), Some("collect"));
        assert_eq!(shared.log, vec!["bank", "collect"]);
        assert_eq!(scheduler.ticks(), 2);
    }

    #[test]
    fn selection_is_stable_for_a_fixed_snapshot() {
        let scheduler = scheduler();
        let shared = Shared {
            inventory_full: true,
            ..Shared::default()
        };
        let first = scheduler.select(&shared);
        for _ in 0..5 {
            assert_eq!(scheduler.select(&shared), first);
        }
        assert!(shared.log.is_empty());
    }

    #[test]
    fn idle_tick_returns_default_delay() {
        let mut scheduler = TaskScheduler::new(ms(600));
        scheduler.register(Probe {
            name: "never",
            admit_when_full: None,
            delay: ms(1),
        });
        let mut shared = Shared::default();
        let report = scheduler.tick(&mut shared);
        assert_eq!(report.task, None);
        assert_eq!(report.control, Control::Continue(ms(600)));
        assert!(shared.log.is_empty());
    }

    #[test]
    fn reset_clears_the_tick_counter() {
        let mut scheduler = scheduler();
        let mut shared = Shared::default();
        scheduler.tick(&mut shared);
        scheduler.tick(&mut shared);
        scheduler.reset();
        assert_eq!(scheduler.ticks(), 0);
        assert_eq!(scheduler.task_names(), vec!["bank", "collect", "also-bank"]);
    }

    #[test]
    fn stop_from_task_is_reported() {
        struct Quit;
        impl Task<Shared> for Quit {
            fn name(&self) -> &str {
                "quit"
            }
            fn admit(&self, _ctx: &Shared) -> bool {
                true
            }
            fn step(&mut self, _ctx: &mut Shared) -> Control {
                Control::Stop(StopReason::ResourceExhausted { item: 1939 })
            }
        }
        let mut scheduler = TaskScheduler::new(ms(600));
        scheduler.register(Quit);
        let report = scheduler.tick(&mut Shared::default());
        assert_eq!(
            report.control,
            Control::Stop(StopReason::ResourceExhausted { item: 1939 })
        );
    }
}
