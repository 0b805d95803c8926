//! Handler and transition bindings.
//!
//! The chart keeps guards and actions as opaque text. [`BindingsBuilder`]
//! maps that text to callables registered by the host and lays the chart out
//! the way the engine consumes it: one [`StateHandlers`] record per state and
//! one [`TransitionTable`] per event, each holding at most one row per source
//! state.

use crate::definition::{Action, Endpoint, Guard, Statechart};
use crate::engine::{Reactor, StateId, Stringify};
use crate::error::CoreError;
use crate::validate::ValidChart;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Name of the synthetic terminal state added when a chart targets `[*]`.
pub const FINAL_STATE_NAME: &str = "[*]";

/// Bound guard. Guards are pure: they only read the context.
pub type GuardFn<C> = Arc<dyn Fn(&C) -> bool + Send + Sync>;

/// Bound action or handler.
pub type ActionFn<C> = Arc<dyn Fn(&mut C, &mut Reactor<'_, C>) + Send + Sync>;

/// Where a transition row leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    State(StateId),
    /// Explicit "no reaction".
    Ignore,
    /// Forbidden state/event pair. Reaching it is fatal.
    CannotHappen,
}

/// One row of a transition table.
pub struct Transition<C> {
    pub destination: Destination,
    pub guard: Option<GuardFn<C>>,
    pub action: Option<ActionFn<C>>,
}

impl<C> Transition<C> {
    pub fn new(destination: Destination) -> Self {
        Self {
            destination,
            guard: None,
            action: None,
        }
    }

    pub fn to(state: StateId) -> Self {
        Self::new(Destination::State(state))
    }

    pub fn with_guard<F>(mut self, guard: F) -> Self
    where
        F: Fn(&C) -> bool + Send + Sync + 'static,
    {
        self.guard = Some(Arc::new(guard));
        self
    }

    pub fn with_action<F>(mut self, action: F) -> Self
    where
        F: Fn(&mut C, &mut Reactor<'_, C>) + Send + Sync + 'static,
    {
        self.action = Some(Arc::new(action));
        self
    }
}

impl<C> Clone for Transition<C> {
    fn clone(&self) -> Self {
        Self {
            destination: self.destination,
            guard: self.guard.clone(),
            action: self.action.clone(),
        }
    }
}

impl<C> fmt::Debug for Transition<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("destination", &self.destination)
            .field("guard", &self.guard.is_some())
            .field("action", &self.action.is_some())
            .finish()
    }
}

/// The transitions applicable to one event, keyed by source state.
pub struct TransitionTable<C> {
    name: String,
    rows: HashMap<StateId, Transition<C>>,
}

impl<C> TransitionTable<C> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: HashMap::new(),
        }
    }

    pub fn with_row(mut self, source: StateId, transition: Transition<C>) -> Self {
        self.insert(source, transition);
        self
    }

    /// Adds a row, returning the row it replaced.
    pub fn insert(&mut self, source: StateId, transition: Transition<C>) -> Option<Transition<C>> {
        self.rows.insert(source, transition)
    }

    pub fn get(&self, source: StateId) -> Option<&Transition<C>> {
        self.rows.get(&source)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows in no particular order.
    pub fn rows(&self) -> impl Iterator<Item = (StateId, &Transition<C>)> {
        self.rows.iter().map(|(source, t)| (*source, t))
    }
}

impl<C> Clone for TransitionTable<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            rows: self.rows.clone(),
        }
    }
}

impl<C> fmt::Debug for TransitionTable<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionTable")
            .field("name", &self.name)
            .field("rows", &self.rows)
            .finish()
    }
}

/// Up to four optional callables bound to one state.
pub struct StateHandlers<C> {
    pub entry: Option<ActionFn<C>>,
    pub exit: Option<ActionFn<C>>,
    pub activity: Option<ActionFn<C>>,
    pub internal: Option<ActionFn<C>>,
}

impl<C> Default for StateHandlers<C> {
    fn default() -> Self {
        Self {
            entry: None,
            exit: None,
            activity: None,
            internal: None,
        }
    }
}

impl<C> fmt::Debug for StateHandlers<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateHandlers")
            .field("entry", &self.entry.is_some())
            .field("exit", &self.exit.is_some())
            .field("activity", &self.activity.is_some())
            .field("internal", &self.internal.is_some())
            .finish()
    }
}

/// Everything the engine borrows while dispatching.
pub struct Bindings<C> {
    name: String,
    names: Vec<String>,
    ids: HashMap<String, StateId>,
    handlers: Vec<StateHandlers<C>>,
    tables: HashMap<String, TransitionTable<C>>,
    completions: Vec<Vec<TransitionTable<C>>>,
    initial: StateId,
}

impl<C> Bindings<C> {
    /// Creates empty bindings over the given states. The first state is the
    /// initial one.
    pub fn new<I, S>(name: impl Into<String>, states: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut bindings = Self {
            name: name.into(),
            names: Vec::new(),
            ids: HashMap::new(),
            handlers: Vec::new(),
            tables: HashMap::new(),
            completions: Vec::new(),
            initial: StateId(0),
        };
        for state in states {
            bindings.add_state(state.into())?;
        }
        if bindings.names.is_empty() {
            return Err(CoreError::InvalidDefinition {
                reason: format!("'{}' has no states", bindings.name),
            });
        }
        Ok(bindings)
    }

    fn add_state(&mut self, name: String) -> Result<StateId, CoreError> {
        if self.ids.contains_key(&name) {
            return Err(CoreError::InvalidDefinition {
                reason: format!("state '{}' is declared more than once", name),
            });
        }
        let id = StateId(self.names.len() as u32);
        self.ids.insert(name.clone(), id);
        self.names.push(name);
        self.handlers.push(StateHandlers::default());
        self.completions.push(Vec::new());
        Ok(id)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state_count(&self) -> usize {
        self.names.len()
    }

    pub fn state_id(&self, name: &str) -> Result<StateId, CoreError> {
        self.ids
            .get(name)
            .copied()
            .ok_or_else(|| CoreError::UnknownState {
                name: name.to_string(),
            })
    }

    pub fn state_name(&self, state: StateId) -> Option<&str> {
        self.names.get(state.index()).map(String::as_str)
    }

    pub fn states(&self) -> impl Iterator<Item = (StateId, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, name)| (StateId(i as u32), name.as_str()))
    }

    pub fn initial(&self) -> StateId {
        self.initial
    }

    pub fn set_initial(&mut self, state: &str) -> Result<(), CoreError> {
        self.initial = self.state_id(state)?;
        Ok(())
    }

    /// The synthetic terminal state, if the chart has one.
    pub fn final_state(&self) -> Option<StateId> {
        self.ids.get(FINAL_STATE_NAME).copied()
    }

    pub fn handlers(&self, state: StateId) -> Option<&StateHandlers<C>> {
        self.handlers.get(state.index())
    }

    fn handlers_mut(&mut self, state: &str) -> Result<&mut StateHandlers<C>, CoreError> {
        let id = self.state_id(state)?;
        Ok(&mut self.handlers[id.index()])
    }

    pub fn on_entry<F>(&mut self, state: &str, f: F) -> Result<(), CoreError>
    where
        F: Fn(&mut C, &mut Reactor<'_, C>) + Send + Sync + 'static,
    {
        self.handlers_mut(state)?.entry = Some(Arc::new(f));
        Ok(())
    }

    pub fn on_exit<F>(&mut self, state: &str, f: F) -> Result<(), CoreError>
    where
        F: Fn(&mut C, &mut Reactor<'_, C>) + Send + Sync + 'static,
    {
        self.handlers_mut(state)?.exit = Some(Arc::new(f));
        Ok(())
    }

    pub fn on_activity<F>(&mut self, state: &str, f: F) -> Result<(), CoreError>
    where
        F: Fn(&mut C, &mut Reactor<'_, C>) + Send + Sync + 'static,
    {
        self.handlers_mut(state)?.activity = Some(Arc::new(f));
        Ok(())
    }

    pub fn on_internal<F>(&mut self, state: &str, f: F) -> Result<(), CoreError>
    where
        F: Fn(&mut C, &mut Reactor<'_, C>) + Send + Sync + 'static,
    {
        self.handlers_mut(state)?.internal = Some(Arc::new(f));
        Ok(())
    }

    /// Registers an event table under its name, replacing any previous one.
    pub fn add_table(&mut self, table: TransitionTable<C>) {
        self.tables.insert(table.name().to_string(), table);
    }

    /// Adds a row to the named event's table, creating the table if needed.
    pub fn add_row(&mut self, event: &str, source: StateId, transition: Transition<C>) {
        self.tables
            .entry(event.to_string())
            .or_insert_with(|| TransitionTable::new(event))
            .insert(source, transition);
    }

    /// Adds a single-row completion table to `source`.
    pub fn add_completion(&mut self, source: StateId, transition: Transition<C>) {
        let Some(list) = self.completions.get_mut(source.index()) else {
            return;
        };
        let name = format!("{} completion #{}", self.names[source.index()], list.len() + 1);
        list.push(TransitionTable::new(name).with_row(source, transition));
    }

    pub fn table(&self, event: &str) -> Option<&TransitionTable<C>> {
        self.tables.get(event)
    }

    /// Event names, sorted.
    pub fn events(&self) -> Vec<&str> {
        let mut events: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        events.sort_unstable();
        events
    }

    /// Completion tables of a state, in declaration order.
    pub fn completions(&self, state: StateId) -> &[TransitionTable<C>] {
        self.completions
            .get(state.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

impl<C> Stringify for Bindings<C> {
    fn stringify(&self, state: StateId) -> Cow<'_, str> {
        match self.state_name(state) {
            Some(name) => Cow::Borrowed(name),
            None => Cow::Owned(state.to_string()),
        }
    }
}

impl<C> fmt::Debug for Bindings<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bindings")
            .field("name", &self.name)
            .field("states", &self.names)
            .field("events", &self.events())
            .field("initial", &self.initial)
            .finish()
    }
}

/// Maps opaque guard and action text to host callables.
pub struct BindingsBuilder<C> {
    actions: HashMap<String, ActionFn<C>>,
    guards: HashMap<String, GuardFn<C>>,
}

impl<C> Default for BindingsBuilder<C> {
    fn default() -> Self {
        Self {
            actions: HashMap::new(),
            guards: HashMap::new(),
        }
    }
}

impl<C: 'static> BindingsBuilder<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds action text (transition actions and state handlers).
    pub fn action<F>(mut self, text: &str, f: F) -> Self
    where
        F: Fn(&mut C, &mut Reactor<'_, C>) + Send + Sync + 'static,
    {
        self.actions.insert(text.trim().to_string(), Arc::new(f));
        self
    }

    /// Binds action text to a callable that only touches the context.
    pub fn effect<F>(self, text: &str, f: F) -> Self
    where
        F: Fn(&mut C) + Send + Sync + 'static,
    {
        self.action(text, move |ctx: &mut C, _: &mut Reactor<'_, C>| f(ctx))
    }

    /// Binds guard text.
    pub fn guard<F>(mut self, text: &str, f: F) -> Self
    where
        F: Fn(&C) -> bool + Send + Sync + 'static,
    {
        self.guards.insert(text.trim().to_string(), Arc::new(f));
        self
    }

    /// Lays out the root scope of a validated chart.
    ///
    /// Composite children and regions are not executed and are skipped.
    pub fn build(&self, chart: &ValidChart) -> Result<Bindings<C>, CoreError> {
        let chart: &Statechart = chart;
        let mut bindings = Bindings::new(
            chart.name.as_str(),
            chart.states.iter().map(|s| s.name.as_str()),
        )?;
        let final_state = if chart.has_final() {
            Some(bindings.add_state(FINAL_STATE_NAME.to_string())?)
        } else {
            None
        };

        let Some(initial) = &chart.initial else {
            return Err(CoreError::InvalidDefinition {
                reason: format!("'{}' has no initial state", chart.name),
            });
        };
        bindings.set_initial(initial.as_str())?;

        for state in &chart.states {
            let id = bindings.state_id(state.name.as_str())?;
            let handlers = StateHandlers {
                entry: self.bind_action(state.entry.as_ref())?,
                exit: self.bind_action(state.exit.as_ref())?,
                activity: self.bind_action(state.activity.as_ref())?,
                internal: match &state.internal {
                    Some(internal) => {
                        // An action-less `on` clause still replaces exit/entry.
                        let noop: ActionFn<C> = Arc::new(|_: &mut C, _: &mut Reactor<'_, C>| {});
                        Some(self.bind_action(internal.action.as_ref())?.unwrap_or(noop))
                    }
                    None => None,
                },
            };
            bindings.handlers[id.index()] = handlers;
        }

        for t in &chart.transitions {
            let source = match &t.source {
                Endpoint::State(name) => bindings.state_id(name.as_str())?,
                _ => continue,
            };
            let destination = match &t.destination {
                Endpoint::State(name) => bindings.state_id(name.as_str())?,
                Endpoint::Final => final_state.ok_or_else(|| CoreError::InvalidDefinition {
                    reason: "final state is missing".to_string(),
                })?,
                Endpoint::Initial => {
                    return Err(CoreError::InvalidDefinition {
                        reason: format!("transition into the initial marker: {}", t),
                    })
                }
            };

            let row = Transition {
                destination: Destination::State(destination),
                guard: self.bind_guard(t.guard.as_ref())?,
                action: self.bind_action(t.action.as_ref())?,
            };
            match &t.event {
                Some(event) => bindings.add_row(&event.key(), source, row),
                None => bindings.add_completion(source, row),
            }
        }

        tracing::debug!(
            "Bound chart '{}': {} states, {} events",
            bindings.name(),
            bindings.state_count(),
            bindings.tables.len()
        );
        Ok(bindings)
    }

    fn bind_action(&self, action: Option<&Action>) -> Result<Option<ActionFn<C>>, CoreError> {
        let Some(action) = action else {
            return Ok(None);
        };
        match self.actions.get(action.text.trim()) {
            Some(f) => Ok(Some(Arc::clone(f))),
            None => Err(CoreError::UnboundAction {
                text: action.text.clone(),
            }),
        }
    }

    fn bind_guard(&self, guard: Option<&Guard>) -> Result<Option<GuardFn<C>>, CoreError> {
        let Some(guard) = guard else {
            return Ok(None);
        };
        match self.guards.get(guard.as_str().trim()) {
            Some(f) => Ok(Some(Arc::clone(f))),
            None => Err(CoreError::UnboundGuard {
                text: guard.as_str().to_string(),
            }),
        }
    }
}
