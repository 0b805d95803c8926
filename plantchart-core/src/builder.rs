//! Parse tree to IR.
//!
//! A single walk over the document. States are declared by first reference;
//! the `[*] --> X` transition resolves the scope's initial state; pragmas
//! attach to the scope that declares them. Handler cardinality is enforced
//! here because the IR can only hold one handler of each kind.

use crate::config::BuildConfig;
use crate::definition::{
    Action, Endpoint, Event, Guard, InternalHandler, State, StateName, Statechart, Transition,
};
use crate::validate::{Diagnostic, DiagnosticCode};
use plantchart_syntax::{
    ActionSyntax, Body, Clause, Document, EventSyntax, Item, Span, StateRef, TransitionSyntax,
};

/// Chart name used when `@startuml` carries none.
pub const DEFAULT_CHART_NAME: &str = "Statechart";

/// Builds a [`Statechart`] from a parsed [`Document`].
#[derive(Debug, Clone, Default)]
pub struct IrBuilder {
    config: BuildConfig,
}

impl IrBuilder {
    pub fn new(config: BuildConfig) -> Self {
        Self { config }
    }

    /// Builds the model. The returned diagnostics must be handed to the
    /// validator together with the chart.
    pub fn build(&self, document: &Document) -> (Statechart, Vec<Diagnostic>) {
        let name = document.name.as_deref().unwrap_or(DEFAULT_CHART_NAME);
        let mut diagnostics = Vec::new();
        let chart = self.build_scope(name, &document.body, None, name, &mut diagnostics);
        (chart, diagnostics)
    }

    fn build_scope(
        &self,
        name: &str,
        body: &Body,
        span: Option<Span>,
        path: &str,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Statechart {
        if !body.is_concurrent() {
            let mut chart = Statechart::new(name);
            chart.span = span;
            if let Some(items) = body.regions.first() {
                self.build_items(&mut chart, items, path, diagnostics);
            }
            tracing::debug!(
                "Built scope '{}': {} states, {} transitions",
                path,
                chart.states.len(),
                chart.transitions.len()
            );
            return chart;
        }

        let mut chart = Statechart::new(name);
        chart.span = span;
        for (index, items) in body.regions.iter().enumerate() {
            let region_name = format!("{}#{}", name, index + 1);
            let region_path = format!("{}/{}", path, region_name);
            let mut region = Statechart::new(region_name);
            region.span = span;
            self.build_items(&mut region, items, &region_path, diagnostics);
            chart.regions.push(region);
        }
        tracing::debug!("Built scope '{}': {} regions", path, chart.regions.len());
        chart
    }

    fn build_items(
        &self,
        chart: &mut Statechart,
        items: &[Item],
        path: &str,
        diagnostics: &mut Vec<Diagnostic>,
    ) {
        for item in items {
            match item {
                Item::Comment { span, .. } => {
                    tracing::trace!("{}: skipping comment at line {}", path, span);
                }
                Item::Directive { text, span } => {
                    tracing::trace!("{}: skipping directive '{}' at line {}", path, text, span);
                }
                Item::Note { state, span, .. } => {
                    tracing::trace!("{}: skipping note on '{}' at line {}", path, state, span);
                }
                Item::Pragma { kind, text, .. } => {
                    chart.pragmas.push(*kind, text.clone());
                }
                Item::StateDecl { name, span } => {
                    chart.ensure_state(&self.normalize(name), Some(*span));
                }
                Item::StateBlock { name, body, span } => {
                    let name = self.normalize(name);
                    if chart.child(&name).is_some() {
                        // Keep both so the validator sees the duplicate.
                        let mut duplicate = State::new(name.as_str());
                        duplicate.span = Some(*span);
                        chart.states.push(duplicate);
                    } else {
                        chart.ensure_state(&name, Some(*span));
                    }
                    let child_path = format!("{}/{}", path, name);
                    let child = self.build_scope(&name, body, Some(*span), &child_path, diagnostics);
                    chart.children.push(child);
                }
                Item::Clause {
                    state,
                    clause,
                    span,
                } => {
                    let name = self.normalize(state);
                    self.add_clause(chart, &name, clause, *span, path, diagnostics);
                }
                Item::Transition(syntax) => {
                    self.add_transition(chart, syntax);
                }
            }
        }
    }

    fn add_clause(
        &self,
        chart: &mut Statechart,
        name: &str,
        clause: &Clause,
        span: Span,
        path: &str,
        diagnostics: &mut Vec<Diagnostic>,
    ) {
        let state = chart.ensure_state(name, Some(span));

        let taken = match clause {
            Clause::Entry(action) => set_once(&mut state.entry, to_action(action)),
            Clause::Exit(action) => set_once(&mut state.exit, to_action(action)),
            Clause::Activity(action) => set_once(&mut state.activity, to_action(action)),
            Clause::OnEvent {
                event,
                guard,
                action,
            } => {
                let handler = InternalHandler {
                    event: to_event(event),
                    guard: guard.as_deref().map(Guard::new),
                    action: action.as_ref().map(to_action),
                };
                let taken = set_once(&mut state.internal, handler);
                if taken {
                    let mut row = Transition::new(
                        Endpoint::State(name.into()),
                        Endpoint::State(name.into()),
                    )
                    .on(to_event(event));
                    row.guard = guard.as_deref().map(Guard::new);
                    row.span = Some(span);
                    chart.transitions.push(row);
                }
                taken
            }
            Clause::Comment(text) => {
                if let Some(text) = text {
                    match &mut state.comment {
                        Some(comment) => {
                            comment.push('\n');
                            comment.push_str(&text.text);
                        }
                        None => state.comment = Some(text.text.clone()),
                    }
                }
                true
            }
        };

        if !taken {
            diagnostics.push(Diagnostic::new(
                DiagnosticCode::DuplicateHandler,
                path,
                format!(
                    "state '{}' already has a '{}' handler, keeping the first one",
                    name,
                    clause.keyword()
                ),
                Some(span),
            ));
        }
    }

    fn add_transition(&self, chart: &mut Statechart, syntax: &TransitionSyntax) {
        let span = Some(syntax.span);
        let source = match syntax.source() {
            StateRef::Marker => Endpoint::Initial,
            StateRef::Named(name) => self.endpoint(chart, name, span),
        };
        let destination = match syntax.destination() {
            StateRef::Marker => Endpoint::Final,
            StateRef::Named(name) => self.endpoint(chart, name, span),
        };

        if source == Endpoint::Initial && chart.initial.is_none() {
            if let Endpoint::State(name) = &destination {
                chart.initial = Some(name.clone());
            }
        }

        let label = &syntax.label;
        chart.transitions.push(Transition {
            source,
            destination,
            event: label.event.as_ref().map(to_event),
            guard: label.guard.as_deref().map(Guard::new),
            action: label.action.as_ref().map(to_action),
            span,
        });
    }

    fn endpoint(&self, chart: &mut Statechart, name: &str, span: Option<Span>) -> Endpoint {
        let name = self.normalize(name);
        chart.ensure_state(&name, span);
        Endpoint::State(StateName(name))
    }

    fn normalize(&self, name: &str) -> String {
        if self.config.uppercase_names {
            name.to_uppercase()
        } else {
            name.to_string()
        }
    }
}

/// Stores `value` if the slot is empty. Returns false if it was taken.
fn set_once<T>(slot: &mut Option<T>, value: T) -> bool {
    if slot.is_some() {
        return false;
    }
    *slot = Some(value);
    true
}

fn to_action(syntax: &ActionSyntax) -> Action {
    Action {
        form: syntax.form,
        text: syntax.text.clone(),
    }
}

fn to_event(syntax: &EventSyntax) -> Event {
    Event {
        words: syntax.words.clone(),
        params: syntax.params.clone(),
    }
}
