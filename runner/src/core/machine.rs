//! Table-driven activity state machine.
//!
//! Each resource-loop variant is a [`TransitionTable`]: for every state, the
//! handler that performs one interaction, the state to enter when the handler
//! confirms success, and the recovery state to regress to when failures exhaust
//! the row's retry allowance. The engine owns the current state; handlers only
//! report a [`Verdict`], so every transition carries a [`Trigger`].

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::core::budget::RetryBudget;
use crate::core::types::{Control, StopReason};
use crate::core::wait::Clock;

const HISTORY_LIMIT: usize = 64;
/// Delay returned on ticks where the engine escalates without calling a handler.
const ESCALATION_DELAY: Duration = Duration::from_millis(100);

/// Requirements for a state enumeration.
pub trait StateLabel: Copy + Eq + fmt::Debug + fmt::Display {}

impl<T: Copy + Eq + fmt::Debug + fmt::Display> StateLabel for T {}

/// Performs one interaction attempt for the current state.
pub type Handler<S, C> = fn(&mut C) -> Outcome<S>;

/// What a handler observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict<S> {
    /// Work in this state is still in progress; stay.
    Pending,
    /// The expected effect was observed; take the success edge.
    Confirmed,
    /// An inventory or equipment predicate selects a different edge.
    Branch(S),
    /// The expected effect did not appear in time, or the interaction was refused.
    Failed(String),
    /// Nothing can recover this run.
    Fatal(StopReason),
}

/// Handler result: the verdict plus the minimum pause before the next tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome<S> {
    pub verdict: Verdict<S>,
    pub delay: Duration,
}

impl<S> Outcome<S> {
    pub fn pending(delay: Duration) -> Self {
        Self {
            verdict: Verdict::Pending,
            delay,
        }
    }

    pub fn confirmed(delay: Duration) -> Self {
        Self {
            verdict: Verdict::Confirmed,
            delay,
        }
    }

    pub fn branch(state: S, delay: Duration) -> Self {
        Self {
            verdict: Verdict::Branch(state),
            delay,
        }
    }

    pub fn failed(reason: impl Into<String>, delay: Duration) -> Self {
        Self {
            verdict: Verdict::Failed(reason.into()),
            delay,
        }
    }

    pub fn fatal(reason: StopReason) -> Self {
        Self {
            verdict: Verdict::Fatal(reason),
            delay: Duration::ZERO,
        }
    }
}

/// Why a transition happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    /// The handler confirmed its expected effect.
    Confirmed,
    /// The handler chose an alternate edge from an inventory/equipment predicate.
    Branch,
    /// Failures exceeded the row's retry allowance.
    RetriesExhausted { reason: String },
    /// The state's dwell limit elapsed.
    DwellExpired,
    /// The owner restarted the machine from its initial state.
    Restart,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRecord<S> {
    pub tick: u64,
    pub from: S,
    pub to: S,
    pub trigger: Trigger,
}

/// One row of a transition table, before compilation.
pub struct Row<S, C> {
    state: S,
    handler: Handler<S, C>,
    next: S,
    recovery: Option<S>,
    retries: u32,
    dwell_limit: Option<Duration>,
}

impl<S: StateLabel, C> Row<S, C> {
    pub fn new(state: S, handler: Handler<S, C>, next: S) -> Self {
        Self {
            state,
            handler,
            next,
            recovery: None,
            retries: 0,
            dwell_limit: None,
        }
    }

    /// State to regress to once retries are exhausted. Without one the state
    /// re-enters itself.
    pub fn recover_to(mut self, state: S) -> Self {
        self.recovery = Some(state);
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn dwell_limit(mut self, limit: Duration) -> Self {
        self.dwell_limit = Some(limit);
        self
    }
}

struct CompiledRow<S, C> {
    state: S,
    handler: Handler<S, C>,
    next: usize,
    recovery: Option<usize>,
    retries: u32,
    dwell_limit: Option<Duration>,
}

/// Compiled transition table. Every referenced state is guaranteed to have a row.
pub struct TransitionTable<S, C> {
    initial: usize,
    rows: Vec<CompiledRow<S, C>>,
}

impl<S: StateLabel, C> TransitionTable<S, C> {
    pub fn build(initial: S, rows: Vec<Row<S, C>>) -> Result<Self> {
        let states: Vec<S> = rows.iter().map(|row| row.state).collect();
        for (i, state) in states.iter().enumerate() {
            if states[..i].contains(state) {
                bail!("duplicate row for state {state}");
            }
        }
        let index = |state: S| -> Result<usize> {
            states
                .iter()
                .position(|s| *s == state)
                .ok_or_else(|| anyhow!("state {state} is referenced but has no row"))
        };
        let initial = index(initial)?;
        let mut compiled = Vec::with_capacity(rows.len());
        for row in rows {
            compiled.push(CompiledRow {
                state: row.state,
                handler: row.handler,
                next: index(row.next)?,
                recovery: row.recovery.map(index).transpose()?,
                retries: row.retries,
                dwell_limit: row.dwell_limit,
            });
        }
        Ok(Self {
            initial,
            rows: compiled,
        })
    }

    pub fn initial(&self) -> S {
        self.rows[self.initial].state
    }

    pub fn states(&self) -> impl Iterator<Item = S> + '_ {
        self.rows.iter().map(|row| row.state)
    }

    /// Success edge for `state`, if it has a row.
    pub fn next_of(&self, state: S) -> Option<S> {
        self.index_of(state)
            .map(|idx| self.rows[self.rows[idx].next].state)
    }

    /// Recovery edge for `state`, if it has a row and a recovery state.
    pub fn recovery_of(&self, state: S) -> Option<S> {
        self.index_of(state)
            .and_then(|idx| self.rows[idx].recovery)
            .map(|idx| self.rows[idx].state)
    }

    fn index_of(&self, state: S) -> Option<usize> {
        self.rows.iter().position(|row| row.state == state)
    }
}

/// Drives a [`TransitionTable`] one handler call per step.
pub struct StateMachine<S, C> {
    table: TransitionTable<S, C>,
    current: usize,
    entered_at: Option<Instant>,
    budget: RetryBudget,
    steps: u64,
    entries: Vec<u64>,
    history: VecDeque<TransitionRecord<S>>,
    unreported: Vec<TransitionRecord<S>>,
    halted: Option<StopReason>,
}

impl<S: StateLabel, C> StateMachine<S, C> {
    pub fn new(table: TransitionTable<S, C>) -> Self {
        let current = table.initial;
        let mut entries = vec![0; table.rows.len()];
        entries[current] = 1;
        let budget = RetryBudget::new(table.rows[current].retries);
        Self {
            table,
            current,
            entered_at: None,
            budget,
            steps: 0,
            entries,
            history: VecDeque::new(),
            unreported: Vec::new(),
            halted: None,
        }
    }

    pub fn current(&self) -> S {
        self.table.rows[self.current].state
    }

    pub fn table(&self) -> &TransitionTable<S, C> {
        &self.table
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// How many times `state` has been entered, counting the initial entry.
    pub fn entries(&self, state: S) -> u64 {
        self.table
            .index_of(state)
            .map_or(0, |idx| self.entries[idx])
    }

    /// Failures recorded in the current state since it was entered.
    pub fn failures(&self) -> u32 {
        self.budget.failures()
    }

    pub fn halted(&self) -> Option<&StopReason> {
        self.halted.as_ref()
    }

    /// Most recent transitions, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &TransitionRecord<S>> {
        self.history.iter()
    }

    /// Transitions since the previous call, for append-only logging.
    pub fn take_transitions(&mut self) -> Vec<TransitionRecord<S>> {
        std::mem::take(&mut self.unreported)
    }

    /// Run the current state's handler once.
    pub fn step<K: Clock>(&mut self, ctx: &mut C, clock: &K) -> Control {
        if let Some(reason) = &self.halted {
            return Control::Stop(reason.clone());
        }
        self.steps += 1;
        let now = clock.now();
        let entered = *self.entered_at.get_or_insert(now);

        let row = &self.table.rows[self.current];
        let (handler, next, recovery, dwell_limit) =
            (row.handler, row.next, row.recovery, row.dwell_limit);

        if let Some(limit) = dwell_limit {
            if now.saturating_duration_since(entered) >= limit {
                warn!(
                    state = %self.current(),
                    dwell_ms = limit.as_millis() as u64,
                    "dwell limit reached"
                );
                let target = recovery.unwrap_or(self.current);
                self.transition(target, Trigger::DwellExpired, now);
                return Control::Continue(ESCALATION_DELAY);
            }
        }

        let outcome = handler(ctx);
        let after = clock.now();
        match outcome.verdict {
            Verdict::Pending => {}
            Verdict::Confirmed => self.transition(next, Trigger::Confirmed, after),
            Verdict::Branch(target) => match self.table.index_of(target) {
                Some(idx) => self.transition(idx, Trigger::Branch, after),
                None => {
                    error!(state = %self.current(), target = %target, "branch to a state without a row");
                    self.fail(format!("branch to unknown state {target}"), recovery, after);
                }
            },
            Verdict::Failed(reason) => self.fail(reason, recovery, after),
            Verdict::Fatal(reason) => {
                error!(state = %self.current(), reason = %reason, "fatal stop");
                self.halted = Some(reason.clone());
                return Control::Stop(reason);
            }
        }
        Control::Continue(outcome.delay)
    }

    /// Forget everything and sit in the initial state, as if freshly built.
    pub fn reset(&mut self) {
        self.current = self.table.initial;
        self.entered_at = None;
        self.budget.reset(self.table.rows[self.current].retries);
        self.steps = 0;
        self.entries.iter_mut().for_each(|count| *count = 0);
        self.entries[self.current] = 1;
        self.history.clear();
        self.unreported.clear();
        self.halted = None;
    }

    /// Return to the initial state. Used by owners whose goal changed.
    pub fn restart(&mut self, now: Instant) {
        self.transition(self.table.initial, Trigger::Restart, now);
    }

    fn fail(&mut self, reason: String, recovery: Option<usize>, now: Instant) {
        if !self.budget.record_failure() {
            debug!(
                state = %self.current(),
                failures = self.budget.failures(),
                reason = %reason,
                "retrying in place"
            );
            return;
        }
        let target = recovery.unwrap_or(self.current);
        warn!(
            state = %self.current(),
            to = %self.table.rows[target].state,
            reason = %reason,
            "retries exhausted"
        );
        self.transition(target, Trigger::RetriesExhausted { reason }, now);
    }

    fn transition(&mut self, to: usize, trigger: Trigger, now: Instant) {
        let from = self.current();
        let to_state = self.table.rows[to].state;
        info!(from = %from, to = %to_state, trigger = ?trigger, "state transition");
        let record = TransitionRecord {
            tick: self.steps,
            from,
            to: to_state,
            trigger,
        };
        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(record.clone());
        self.unreported.push(record);
        self.current = to;
        self.entered_at = Some(now);
        self.entries[to] += 1;
        self.budget.reset(self.table.rows[to].retries);
    }
}
