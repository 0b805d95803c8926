//! Running chart instances.

use crate::bindings::{Bindings, TransitionTable};
use crate::engine::{DispatchEngine, DispatchOutcome, StateId, Stringify};
use crate::error::CoreError;
use parking_lot::Mutex;
use std::sync::Arc;

/// A chart instance: engine, shared bindings and the host context.
pub struct Machine<C> {
    engine: DispatchEngine,
    bindings: Arc<Bindings<C>>,
    context: C,
}

impl<C> Machine<C> {
    /// Creates an instance positioned on the bindings' initial state.
    pub fn new(bindings: Arc<Bindings<C>>, context: C) -> Result<Self, CoreError> {
        let engine = DispatchEngine::new(bindings.initial(), &bindings)?;
        Ok(Self {
            engine,
            bindings,
            context,
        })
    }

    /// Dispatches the named event's table. Aborts the process on a fatal
    /// outcome.
    pub fn fire(&mut self, event: &str) -> Result<DispatchOutcome, CoreError> {
        let table = lookup(&self.bindings, event)?;
        Ok(self.engine.dispatch(table, &self.bindings, &mut self.context))
    }

    /// Like [`Machine::fire`], reporting fatal outcomes instead of aborting.
    pub fn try_fire(&mut self, event: &str) -> Result<DispatchOutcome, CoreError> {
        let table = lookup(&self.bindings, event)?;
        Ok(self
            .engine
            .try_dispatch(table, &self.bindings, &mut self.context))
    }

    pub fn dispatch(&mut self, table: &TransitionTable<C>) -> DispatchOutcome {
        self.engine
            .dispatch(table, &self.bindings, &mut self.context)
    }

    pub fn try_dispatch(&mut self, table: &TransitionTable<C>) -> DispatchOutcome {
        self.engine
            .try_dispatch(table, &self.bindings, &mut self.context)
    }

    /// Tries the current state's event-less transitions in declaration order
    /// and stops at the first one that is neither rejected nor ignored.
    pub fn complete(&mut self) -> DispatchOutcome {
        let state = self.engine.current_state();
        let mut outcome = DispatchOutcome::Ignored;
        for table in self.bindings.completions(state) {
            outcome = self
                .engine
                .dispatch(table, &self.bindings, &mut self.context);
            if !matches!(
                outcome,
                DispatchOutcome::Rejected { .. } | DispatchOutcome::Ignored
            ) {
                break;
            }
        }
        outcome
    }

    /// Runs the current state's `do` handler.
    pub fn do_activity(&mut self) -> DispatchOutcome {
        self.engine.run_activity(&self.bindings, &mut self.context)
    }

    pub fn reset(&mut self) {
        self.engine.reset();
    }

    pub fn current_state(&self) -> StateId {
        self.engine.current_state()
    }

    pub fn state_name(&self) -> String {
        self.bindings
            .stringify(self.engine.current_state())
            .into_owned()
    }

    /// Returns true if the current state has the given name.
    pub fn is_in(&self, state: &str) -> bool {
        self.bindings.state_name(self.engine.current_state()) == Some(state)
    }

    pub fn bindings(&self) -> &Arc<Bindings<C>> {
        &self.bindings
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    pub fn into_context(self) -> C {
        self.context
    }
}

fn lookup<'a, C>(
    bindings: &'a Bindings<C>,
    event: &str,
) -> Result<&'a TransitionTable<C>, CoreError> {
    bindings.table(event).ok_or_else(|| CoreError::UnknownEvent {
        event: event.to_string(),
    })
}

/// A machine shared between threads.
///
/// Outer calls take the lock. Reentrant requests made by handler code go
/// through the [`crate::Reactor`] and never touch it.
pub struct SharedMachine<C> {
    inner: Arc<Mutex<Machine<C>>>,
}

impl<C> Clone for SharedMachine<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> SharedMachine<C> {
    pub fn new(machine: Machine<C>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(machine)),
        }
    }

    /// Fires an event, waiting for the lock.
    pub fn fire(&self, event: &str) -> Result<DispatchOutcome, CoreError> {
        self.inner.lock().fire(event)
    }

    /// Fires an event if the lock is free. Returns `None` on contention.
    pub fn try_fire(&self, event: &str) -> Option<Result<DispatchOutcome, CoreError>> {
        let mut machine = self.inner.try_lock()?;
        Some(machine.fire(event))
    }

    pub fn dispatch(&self, table: &TransitionTable<C>) -> DispatchOutcome {
        self.inner.lock().dispatch(table)
    }

    pub fn current_state(&self) -> StateId {
        self.inner.lock().current_state()
    }

    pub fn reset(&self) {
        self.inner.lock().reset();
    }

    /// Runs `f` with exclusive access to the machine.
    pub fn with<R>(&self, f: impl FnOnce(&mut Machine<C>) -> R) -> R {
        f(&mut self.inner.lock())
    }
}
