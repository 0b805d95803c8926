//! Transition dispatch engine.
//!
//! The engine owns nothing but the current state. Bindings (handlers and
//! transition tables) and the host context are borrowed for the duration of
//! a dispatch cycle.
//!
//! A dispatch cycle is driven by one outer call. Handler code never calls
//! back into the engine: it receives a [`Reactor`] whose requests fill a
//! single pending slot, and the outer loop drains that slot. Chains of
//! reactions therefore run in constant stack depth.

use crate::bindings::{Bindings, Destination, Transition, TransitionTable};
use crate::definition::is_reserved;
use crate::error::CoreError;
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

/// Index of a state in its bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub u32);

impl StateId {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Human-readable state names for diagnostics and logs.
pub trait Stringify {
    fn stringify(&self, state: StateId) -> Cow<'_, str>;
}

/// Why a dispatch cycle could not continue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FatalReason {
    #[error("event cannot happen in state {state}")]
    CannotHappen { state: String },

    #[error("transition from {from} to unknown state {to}")]
    UnknownState { from: String, to: StateId },
}

/// Result of a dispatch cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// At least one transition was accepted.
    Transitioned { from: StateId, to: StateId },
    /// No row for the current state, or an explicit ignore.
    Ignored,
    /// The guard refused the transition. Nothing ran.
    Rejected { from: StateId, to: StateId },
    Fatal { reason: FatalReason },
}

impl DispatchOutcome {
    pub fn is_transitioned(&self) -> bool {
        matches!(self, DispatchOutcome::Transitioned { .. })
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, DispatchOutcome::Fatal { .. })
    }
}

/// Handle given to actions and handlers while a cycle runs.
///
/// The machine already looks transitioned: [`Reactor::current_state`] is the
/// destination of the transition being processed.
pub struct Reactor<'a, C> {
    current: StateId,
    pending: Option<Transition<C>>,
    bindings: &'a Bindings<C>,
}

impl<'a, C> Reactor<'a, C> {
    fn new(current: StateId, bindings: &'a Bindings<C>) -> Self {
        Self {
            current,
            pending: None,
            bindings,
        }
    }

    pub fn current_state(&self) -> StateId {
        self.current
    }

    pub fn bindings(&self) -> &'a Bindings<C> {
        self.bindings
    }

    /// Memorizes the current state's row of `table`.
    ///
    /// Returns false and leaves the slot untouched if the table has no row
    /// for the current state.
    pub fn react(&mut self, table: &TransitionTable<C>) -> bool {
        match table.get(self.current) {
            Some(transition) => {
                self.request(transition.clone());
                true
            }
            None => {
                tracing::trace!(
                    "[{}][IGNORING EVENT {} IN {}]",
                    self.bindings.name(),
                    table.name(),
                    self.bindings.stringify(self.current)
                );
                false
            }
        }
    }

    /// Memorizes the current state's row of the named event's table.
    pub fn fire(&mut self, event: &str) -> bool {
        let bindings = self.bindings;
        match bindings.table(event) {
            Some(table) => self.react(table),
            None => {
                tracing::debug!("[{}][UNKNOWN EVENT {}]", bindings.name(), event);
                false
            }
        }
    }

    /// Memorizes a transition, replacing any earlier request.
    pub fn request(&mut self, transition: Transition<C>) {
        if self.pending.is_some() {
            tracing::debug!(
                "[{}][REPLACING PENDING REQUEST IN {}]",
                self.bindings.name(),
                self.bindings.stringify(self.current)
            );
        }
        self.pending = Some(transition);
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// The flat dispatch engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchEngine {
    current: StateId,
    initial: StateId,
}

impl DispatchEngine {
    /// Creates an engine positioned on `initial`.
    pub fn new<C>(initial: StateId, bindings: &Bindings<C>) -> Result<Self, CoreError> {
        let Some(name) = bindings.state_name(initial) else {
            return Err(CoreError::UnknownState {
                name: initial.to_string(),
            });
        };
        if is_reserved(name) {
            return Err(CoreError::ReservedState {
                name: name.to_string(),
            });
        }
        Ok(Self {
            current: initial,
            initial,
        })
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }

    pub fn current_state(&self) -> StateId {
        self.current
    }

    pub fn initial_state(&self) -> StateId {
        self.initial
    }

    /// Runs a dispatch cycle, aborting the process on a fatal outcome.
    pub fn dispatch<C>(
        &mut self,
        table: &TransitionTable<C>,
        bindings: &Bindings<C>,
        context: &mut C,
    ) -> DispatchOutcome {
        let outcome = self.try_dispatch(table, bindings, context);
        abort_if_fatal(&outcome, bindings);
        outcome
    }

    /// Runs a dispatch cycle and reports fatal outcomes instead of aborting.
    pub fn try_dispatch<C>(
        &mut self,
        table: &TransitionTable<C>,
        bindings: &Bindings<C>,
        context: &mut C,
    ) -> DispatchOutcome {
        match table.get(self.current) {
            Some(transition) => self.run_cycle(transition.clone(), bindings, context),
            None => {
                tracing::trace!(
                    "[{}][IGNORING EVENT {} IN {}]",
                    bindings.name(),
                    table.name(),
                    bindings.stringify(self.current)
                );
                DispatchOutcome::Ignored
            }
        }
    }

    /// Runs the current state's activity handler. A transition it requests
    /// starts a regular cycle.
    pub fn run_activity<C>(&mut self, bindings: &Bindings<C>, context: &mut C) -> DispatchOutcome {
        let Some(activity) = bindings
            .handlers(self.current)
            .and_then(|h| h.activity.clone())
        else {
            return DispatchOutcome::Ignored;
        };

        tracing::trace!(
            "[{}][ACTIVITY {}]",
            bindings.name(),
            bindings.stringify(self.current)
        );
        let mut reactor = Reactor::new(self.current, bindings);
        activity(context, &mut reactor);

        let outcome = match reactor.pending {
            Some(transition) => self.run_cycle(transition, bindings, context),
            None => DispatchOutcome::Ignored,
        };
        abort_if_fatal(&outcome, bindings);
        outcome
    }

    /// Drains the pending slot, starting with `first`.
    fn run_cycle<C>(
        &mut self,
        first: Transition<C>,
        bindings: &Bindings<C>,
        context: &mut C,
    ) -> DispatchOutcome {
        let start = self.current;
        let mut transitioned = false;
        let mut last = DispatchOutcome::Ignored;
        let mut next = Some(first);

        while let Some(transition) = next.take() {
            let (outcome, pending) = self.step(transition, bindings, context);
            match outcome {
                DispatchOutcome::Fatal { .. } => return outcome,
                DispatchOutcome::Transitioned { .. } => transitioned = true,
                _ => {}
            }
            last = outcome;
            next = pending;
        }

        if transitioned {
            DispatchOutcome::Transitioned {
                from: start,
                to: self.current,
            }
        } else {
            last
        }
    }

    /// One iteration of the cycle. Returns the step outcome and whatever the
    /// handlers memorized.
    fn step<C>(
        &mut self,
        transition: Transition<C>,
        bindings: &Bindings<C>,
        context: &mut C,
    ) -> (DispatchOutcome, Option<Transition<C>>) {
        let from = self.current;
        let name = bindings.name();

        let to = match transition.destination {
            Destination::CannotHappen => {
                let reason = FatalReason::CannotHappen {
                    state: bindings.stringify(from).into_owned(),
                };
                return (DispatchOutcome::Fatal { reason }, None);
            }
            Destination::Ignore => {
                tracing::trace!("[{}][IGNORING EVENT IN {}]", name, bindings.stringify(from));
                return (DispatchOutcome::Ignored, None);
            }
            Destination::State(to) if to.index() >= bindings.state_count() => {
                let reason = FatalReason::UnknownState {
                    from: bindings.stringify(from).into_owned(),
                    to,
                };
                return (DispatchOutcome::Fatal { reason }, None);
            }
            Destination::State(to) => to,
        };

        // Handlers observe the machine as already transitioned.
        self.current = to;
        let mut reactor = Reactor::new(to, bindings);

        if let Some(guard) = &transition.guard {
            let accepted = guard(context);
            tracing::trace!(
                "[{}][GUARD {} --> {}] result: {}",
                name,
                bindings.stringify(from),
                bindings.stringify(to),
                accepted
            );
            if !accepted {
                self.current = from;
                return (DispatchOutcome::Rejected { from, to }, None);
            }
        }

        tracing::debug!(
            "[{}][TRANSITION {} --> {}]",
            name,
            bindings.stringify(from),
            bindings.stringify(to)
        );
        if let Some(action) = &transition.action {
            action(context, &mut reactor);
        }

        let handlers = bindings.handlers(from);
        if let Some(internal) = handlers.and_then(|h| h.internal.as_ref()) {
            tracing::debug!(
                "[{}][INTERNAL TRANSITION FROM STATE {}]",
                name,
                bindings.stringify(from)
            );
            internal(context, &mut reactor);
            if reactor.pending.is_some() {
                tracing::debug!(
                    "[{}][DROPPING REQUEST MADE BY INTERNAL HANDLER OF {}]",
                    name,
                    bindings.stringify(from)
                );
            }
            return (DispatchOutcome::Transitioned { from, to }, None);
        }

        if from != to {
            if let Some(exit) = handlers.and_then(|h| h.exit.as_ref()) {
                tracing::trace!("[{}][LEAVING STATE {}]", name, bindings.stringify(from));
                exit(context, &mut reactor);
            }
            if let Some(entry) = bindings.handlers(to).and_then(|h| h.entry.as_ref()) {
                tracing::trace!("[{}][ENTERING STATE {}]", name, bindings.stringify(to));
                entry(context, &mut reactor);
            }
        }

        if reactor.pending.is_some() {
            tracing::trace!(
                "[{}][MEMORIZED REQUEST FROM {}]",
                name,
                bindings.stringify(to)
            );
        }
        (DispatchOutcome::Transitioned { from, to }, reactor.pending)
    }
}

fn abort_if_fatal<C>(outcome: &DispatchOutcome, bindings: &Bindings<C>) {
    if let DispatchOutcome::Fatal { reason } = outcome {
        tracing::error!("[{}][FATAL] {}, aborting", bindings.name(), reason);
        std::process::abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::Bindings;

    #[derive(Default)]
    struct Ctx {
        log: Vec<String>,
        depth: usize,
        max_depth: usize,
        allow: bool,
    }

    fn record(tag: &'static str) -> impl Fn(&mut Ctx, &mut Reactor<'_, Ctx>) + Send + Sync {
        move |ctx, _| ctx.log.push(tag.to_string())
    }

    fn two_states() -> Bindings<Ctx> {
        let mut b = Bindings::new("Test", ["IDLE", "SCAN"]).unwrap();
        b.on_exit("IDLE", record("exit IDLE")).unwrap();
        b.on_entry("SCAN", record("entry SCAN")).unwrap();
        b
    }

    fn engine(bindings: &Bindings<Ctx>) -> DispatchEngine {
        DispatchEngine::new(bindings.initial(), bindings).unwrap()
    }

    #[test]
    fn test_construct_rejects_unknown_and_reserved() {
        let b = two_states();
        assert!(matches!(
            DispatchEngine::new(StateId(7), &b),
            Err(CoreError::UnknownState { .. })
        ));

        let reserved = Bindings::<Ctx>::new("Bad", ["CANNOT_HAPPEN", "A"]).unwrap();
        assert!(matches!(
            DispatchEngine::new(StateId(0), &reserved),
            Err(CoreError::ReservedState { .. })
        ));
        assert!(DispatchEngine::new(StateId(1), &reserved).is_ok());
    }

    #[test]
    fn test_ordered_effects() {
        let mut b = two_states();
        let table = TransitionTable::new("scan")
            .with_row(StateId(0), Transition::to(StateId(1)).with_action(record("act")));
        b.add_table(table);

        let mut e = engine(&b);
        let mut ctx = Ctx::default();
        let outcome = e.dispatch(b.table("scan").unwrap(), &b, &mut ctx);

        assert_eq!(
            outcome,
            DispatchOutcome::Transitioned {
                from: StateId(0),
                to: StateId(1)
            }
        );
        assert_eq!(ctx.log, vec!["act", "exit IDLE", "entry SCAN"]);
        assert_eq!(e.current_state(), StateId(1));
    }

    #[test]
    fn test_guard_false_is_a_noop() {
        let b = two_states();
        let table = TransitionTable::new("scan").with_row(
            StateId(0),
            Transition::to(StateId(1))
                .with_guard(|ctx: &Ctx| ctx.allow)
                .with_action(record("act")),
        );

        let mut e = engine(&b);
        let mut ctx = Ctx::default();
        let outcome = e.dispatch(&table, &b, &mut ctx);

        assert_eq!(
            outcome,
            DispatchOutcome::Rejected {
                from: StateId(0),
                to: StateId(1)
            }
        );
        assert!(ctx.log.is_empty());
        assert_eq!(e.current_state(), StateId(0));

        ctx.allow = true;
        assert!(e.dispatch(&table, &b, &mut ctx).is_transitioned());
    }

    #[test]
    fn test_action_sees_destination_state() {
        let b = two_states();
        let table = TransitionTable::new("scan").with_row(
            StateId(0),
            Transition::to(StateId(1)).with_action(|ctx: &mut Ctx, r: &mut Reactor<'_, Ctx>| {
                ctx.log.push(format!("in {}", r.current_state()));
            }),
        );
        let mut e = engine(&b);
        let mut ctx = Ctx::default();
        e.dispatch(&table, &b, &mut ctx);
        assert_eq!(ctx.log[0], "in #1");
    }

    #[test]
    fn test_missing_row_is_ignored() {
        let b = two_states();
        let table = TransitionTable::new("back").with_row(StateId(1), Transition::to(StateId(0)));
        let mut e = engine(&b);
        let mut ctx = Ctx::default();
        assert_eq!(e.dispatch(&table, &b, &mut ctx), DispatchOutcome::Ignored);
        assert!(ctx.log.is_empty());
    }

    #[test]
    fn test_explicit_ignore() {
        let b = two_states();
        let table = TransitionTable::new("noop")
            .with_row(StateId(0), Transition::new(Destination::Ignore).with_action(record("act")));
        let mut e = engine(&b);
        let mut ctx = Ctx::default();
        assert_eq!(e.dispatch(&table, &b, &mut ctx), DispatchOutcome::Ignored);
        assert!(ctx.log.is_empty());
        assert_eq!(e.current_state(), StateId(0));
    }

    #[test]
    fn test_fatal_outcomes() {
        let b = two_states();
        let mut e = engine(&b);
        let mut ctx = Ctx::default();

        let forbidden = TransitionTable::new("boom")
            .with_row(StateId(0), Transition::new(Destination::CannotHappen));
        let outcome = e.try_dispatch(&forbidden, &b, &mut ctx);
        assert!(matches!(
            outcome,
            DispatchOutcome::Fatal {
                reason: FatalReason::CannotHappen { ref state }
            } if state == "IDLE"
        ));

        let out_of_range =
            TransitionTable::new("far").with_row(StateId(0), Transition::to(StateId(99)));
        assert!(e.try_dispatch(&out_of_range, &b, &mut ctx).is_fatal());
        assert_eq!(e.current_state(), StateId(0));
    }

    #[test]
    fn test_self_transition_skips_handlers() {
        let mut b = two_states();
        b.on_exit("SCAN", record("exit SCAN")).unwrap();
        let table = TransitionTable::new("again")
            .with_row(StateId(1), Transition::to(StateId(1)).with_action(record("act")));
        let mut e = engine(&b);
        let mut ctx = Ctx::default();
        e.current = StateId(1);
        assert!(e.dispatch(&table, &b, &mut ctx).is_transitioned());
        assert_eq!(ctx.log, vec!["act"]);
    }

    #[test]
    fn test_internal_handler_replaces_exit_and_entry() {
        let mut b = two_states();
        b.on_internal("IDLE", record("internal IDLE")).unwrap();
        let table = TransitionTable::new("scan")
            .with_row(StateId(0), Transition::to(StateId(1)).with_action(record("act")));
        let mut e = engine(&b);
        let mut ctx = Ctx::default();

        assert!(e.dispatch(&table, &b, &mut ctx).is_transitioned());
        assert_eq!(ctx.log, vec!["act", "internal IDLE"]);
        assert_eq!(e.current_state(), StateId(1));
    }

    #[test]
    fn test_internal_handler_drops_requests() {
        let mut b = Bindings::new("Test", ["A", "B", "C"]).unwrap();
        b.add_table(TransitionTable::new("next").with_row(StateId(1), Transition::to(StateId(2))));
        b.on_internal("A", |_: &mut Ctx, r: &mut Reactor<'_, Ctx>| {
            assert!(r.fire("next"));
        })
        .unwrap();
        let table = TransitionTable::new("go").with_row(StateId(0), Transition::to(StateId(1)));

        let mut e = engine(&b);
        let mut ctx = Ctx::default();
        e.dispatch(&table, &b, &mut ctx);
        assert_eq!(e.current_state(), StateId(1));
    }

    #[test]
    fn test_reentrant_chain_runs_flat() {
        const N: u32 = 500;
        let names: Vec<String> = (0..=N).map(|i| format!("S{}", i)).collect();
        let mut b = Bindings::new("Chain", names.iter().map(String::as_str)).unwrap();

        let mut next = TransitionTable::new("next");
        for i in 0..N {
            next.insert(StateId(i), Transition::to(StateId(i + 1)));
        }
        b.add_table(next);

        for name in names.iter().skip(1) {
            b.on_entry(name, |ctx: &mut Ctx, r: &mut Reactor<'_, Ctx>| {
                ctx.depth += 1;
                ctx.max_depth = ctx.max_depth.max(ctx.depth);
                r.fire("next");
                ctx.depth -= 1;
            })
            .unwrap();
        }

        let mut e = engine(&b);
        let mut ctx = Ctx::default();
        let outcome = e.dispatch(b.table("next").unwrap(), &b, &mut ctx);

        assert_eq!(
            outcome,
            DispatchOutcome::Transitioned {
                from: StateId(0),
                to: StateId(N)
            }
        );
        assert_eq!(ctx.max_depth, 1);
    }

    #[test]
    fn test_reentrant_rejection_ends_cycle() {
        let mut b = Bindings::new("Test", ["A", "B", "C"]).unwrap();
        b.add_table(TransitionTable::new("next").with_row(
            StateId(1),
            Transition::to(StateId(2)).with_guard(|_: &Ctx| false),
        ));
        b.on_entry("B", |_: &mut Ctx, r: &mut Reactor<'_, Ctx>| {
            r.fire("next");
        })
        .unwrap();
        let go = TransitionTable::new("go").with_row(StateId(0), Transition::to(StateId(1)));

        let mut e = engine(&b);
        let mut ctx = Ctx::default();
        assert_eq!(
            e.dispatch(&go, &b, &mut ctx),
            DispatchOutcome::Transitioned {
                from: StateId(0),
                to: StateId(1)
            }
        );
        assert_eq!(e.current_state(), StateId(1));
    }

    #[test]
    fn test_unmatched_reentrant_request_leaves_slot() {
        let mut b = Bindings::new("Test", ["A", "B"]).unwrap();
        b.add_table(TransitionTable::new("other").with_row(StateId(0), Transition::to(StateId(1))));
        b.on_entry("B", |ctx: &mut Ctx, r: &mut Reactor<'_, Ctx>| {
            let matched = r.fire("other");
            ctx.log.push(format!("{} {}", matched, r.has_pending()));
        })
        .unwrap();
        let go = TransitionTable::new("go").with_row(StateId(0), Transition::to(StateId(1)));

        let mut e = engine(&b);
        let mut ctx = Ctx::default();
        e.dispatch(&go, &b, &mut ctx);
        assert_eq!(ctx.log, vec!["false false"]);
    }

    #[test]
    fn test_activity_can_request() {
        let mut b = two_states();
        b.add_table(TransitionTable::new("scan").with_row(StateId(0), Transition::to(StateId(1))));
        b.on_activity("IDLE", |_: &mut Ctx, r: &mut Reactor<'_, Ctx>| {
            r.fire("scan");
        })
        .unwrap();

        let mut e = engine(&b);
        let mut ctx = Ctx::default();
        assert!(e.run_activity(&b, &mut ctx).is_transitioned());
        assert_eq!(ctx.log, vec!["exit IDLE", "entry SCAN"]);
        assert_eq!(e.run_activity(&b, &mut ctx), DispatchOutcome::Ignored);
    }

    #[test]
    fn test_reset() {
        let b = two_states();
        let table = TransitionTable::new("scan").with_row(StateId(0), Transition::to(StateId(1)));
        let mut e = engine(&b);
        e.dispatch(&table, &b, &mut Ctx::default());
        assert_eq!(e.current_state(), StateId(1));
        e.reset();
        assert_eq!(e.current_state(), e.initial_state());
    }
}
