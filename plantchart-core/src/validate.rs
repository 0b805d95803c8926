//! Semantic validation.
//!
//! Diagnostics are accumulated, never fail-fast, so a single run reports
//! every violation. Any error-severity diagnostic makes the chart unusable:
//! [`Validator::validate`] then returns the full list instead of a
//! [`ValidChart`], and only a `ValidChart` can be bound and executed.
//!
//! Warnings are escalated to errors unless `deny_warnings` is turned off,
//! so under the default configuration any finding at all is fatal.

use crate::config::ValidationConfig;
use crate::definition::{Endpoint, StateName, Statechart};
use plantchart_syntax::Span;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::Deref;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("error"),
            Severity::Warning => f.write_str("warning"),
        }
    }
}

/// What a diagnostic is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticCode {
    DuplicateState,
    ReservedState,
    MissingInitial,
    MultipleInitial,
    DanglingEndpoint,
    DuplicateHandler,
    DuplicateTransition,
    NoEvents,
    NoIncoming,
    Nondeterministic,
    EventlessLoop,
}

impl DiagnosticCode {
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticCode::DuplicateState => "DUPLICATE_STATE",
            DiagnosticCode::ReservedState => "RESERVED_STATE",
            DiagnosticCode::MissingInitial => "MISSING_INITIAL",
            DiagnosticCode::MultipleInitial => "MULTIPLE_INITIAL",
            DiagnosticCode::DanglingEndpoint => "DANGLING_ENDPOINT",
            DiagnosticCode::DuplicateHandler => "DUPLICATE_HANDLER",
            DiagnosticCode::DuplicateTransition => "DUPLICATE_TRANSITION",
            DiagnosticCode::NoEvents => "NO_EVENTS",
            DiagnosticCode::NoIncoming => "NO_INCOMING",
            DiagnosticCode::Nondeterministic => "NONDETERMINISTIC",
            DiagnosticCode::EventlessLoop => "EVENTLESS_LOOP",
        }
    }

    /// Severity before any `deny_warnings` escalation.
    pub fn default_severity(self) -> Severity {
        match self {
            DiagnosticCode::NoEvents
            | DiagnosticCode::NoIncoming
            | DiagnosticCode::Nondeterministic
            | DiagnosticCode::EventlessLoop => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One finding about a chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagnosticCode,
    /// Path of the scope, e.g. `Gumball/Active`.
    pub scope: String,
    pub message: String,
    pub span: Option<Span>,
}

impl Diagnostic {
    pub fn new(
        code: DiagnosticCode,
        scope: impl Into<String>,
        message: impl Into<String>,
        span: Option<Span>,
    ) -> Self {
        Self {
            severity: code.default_severity(),
            code,
            scope: scope.into(),
            message: message.into(),
            span,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}] {}", self.severity, self.code, self.scope)?;
        if let Some(span) = self.span {
            write!(f, " (line {})", span)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// An accumulated list of diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new(diagnostics: Vec<Diagnostic>) -> Self {
        Self(diagnostics)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(|d| d.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(|d| !d.is_error())
    }

    pub fn has_errors(&self) -> bool {
        self.0.iter().any(Diagnostic::is_error)
    }

    /// Returns true if any diagnostic carries the given code.
    pub fn contains(&self, code: DiagnosticCode) -> bool {
        self.0.iter().any(|d| d.code == code)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.0
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let errors = self.errors().count();
        write!(
            f,
            "{} error(s), {} warning(s)",
            errors,
            self.0.len() - errors
        )?;
        for diagnostic in &self.0 {
            write!(f, "\n  {}", diagnostic)?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostics {}

/// A chart that passed validation. Immutable from here on.
#[derive(Debug, Clone)]
pub struct ValidChart {
    chart: Statechart,
    warnings: Diagnostics,
}

impl ValidChart {
    pub fn chart(&self) -> &Statechart {
        &self.chart
    }

    /// Warnings that did not block validation. Always empty unless
    /// `deny_warnings` was turned off.
    pub fn warnings(&self) -> &Diagnostics {
        &self.warnings
    }

    pub fn into_inner(self) -> Statechart {
        self.chart
    }
}

impl Deref for ValidChart {
    type Target = Statechart;

    fn deref(&self) -> &Statechart {
        &self.chart
    }
}

/// Checks model invariants.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    config: ValidationConfig,
}

impl Validator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Validates a chart on its own.
    pub fn validate(&self, chart: Statechart) -> Result<ValidChart, Diagnostics> {
        self.validate_with(chart, Vec::new())
    }

    /// Validates a chart, merging diagnostics already found while building it.
    pub fn validate_with(
        &self,
        chart: Statechart,
        prior: Vec<Diagnostic>,
    ) -> Result<ValidChart, Diagnostics> {
        let mut diagnostics = prior;
        diagnostics.extend(self.check(&chart));

        if self.config.deny_warnings {
            for diagnostic in &mut diagnostics {
                diagnostic.severity = Severity::Error;
            }
        }

        for warning in diagnostics.iter().filter(|d| !d.is_error()) {
            tracing::warn!("{}", warning);
        }

        let diagnostics = Diagnostics(diagnostics);
        tracing::debug!(
            "Validated chart '{}': {}",
            chart.name,
            diagnostics.to_string().lines().next().unwrap_or_default()
        );

        if diagnostics.has_errors() {
            return Err(diagnostics);
        }

        Ok(ValidChart {
            chart,
            warnings: diagnostics,
        })
    }

    /// Runs every check over the chart and its nested scopes.
    pub fn check(&self, chart: &Statechart) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        self.check_scope(chart, &chart.name, &mut out);
        out
    }

    fn check_scope(&self, chart: &Statechart, path: &str, out: &mut Vec<Diagnostic>) {
        check_states(chart, path, out);
        check_initial(chart, path, out);
        check_endpoints(chart, path, out);
        check_duplicate_transitions(chart, path, out);

        if self.config.determinism_checks && !chart.states.is_empty() {
            check_events(chart, path, out);
            check_incoming(chart, path, out);
            check_nondeterminism(chart, path, out);
            check_eventless_loops(chart, path, out);
        }

        for child in &chart.children {
            self.check_scope(child, &format!("{}/{}", path, child.name), out);
        }
        for region in &chart.regions {
            self.check_scope(region, &format!("{}/{}", path, region.name), out);
        }
    }
}

fn check_states(chart: &Statechart, path: &str, out: &mut Vec<Diagnostic>) {
    let mut seen = HashSet::new();
    for state in &chart.states {
        if state.is_reserved() {
            out.push(Diagnostic::new(
                DiagnosticCode::ReservedState,
                path,
                format!("'{}' is a reserved identifier", state.name),
                state.span,
            ));
        }
        if !seen.insert(&state.name) {
            out.push(Diagnostic::new(
                DiagnosticCode::DuplicateState,
                path,
                format!("state '{}' is declared more than once", state.name),
                state.span,
            ));
        }
    }
}

fn check_initial(chart: &Statechart, path: &str, out: &mut Vec<Diagnostic>) {
    let markers: Vec<_> = chart.initial_transitions().collect();

    if markers.is_empty() {
        if !chart.states.is_empty() {
            out.push(Diagnostic::new(
                DiagnosticCode::MissingInitial,
                path,
                "missing initial state ([*] --> STATE)",
                chart.span,
            ));
        }
        return;
    }

    for extra in markers.iter().skip(1) {
        out.push(Diagnostic::new(
            DiagnosticCode::MultipleInitial,
            path,
            format!("initial marker already leads to another state ({})", extra),
            extra.span,
        ));
    }
}

fn check_endpoints(chart: &Statechart, path: &str, out: &mut Vec<Diagnostic>) {
    for transition in &chart.transitions {
        if transition.source == Endpoint::Initial && transition.destination == Endpoint::Final {
            out.push(Diagnostic::new(
                DiagnosticCode::DanglingEndpoint,
                path,
                "the initial marker must lead to a state",
                transition.span,
            ));
        }

        for endpoint in [&transition.source, &transition.destination] {
            if let Some(name) = endpoint.state() {
                if !chart.has_state(name.as_str()) {
                    out.push(Diagnostic::new(
                        DiagnosticCode::DanglingEndpoint,
                        path,
                        format!("'{}' is not a state of this scope ({})", name, transition),
                        transition.span,
                    ));
                }
            }
        }
    }
}

fn check_duplicate_transitions(chart: &Statechart, path: &str, out: &mut Vec<Diagnostic>) {
    let mut seen = HashSet::new();
    for transition in &chart.transitions {
        let (Some(source), Some(key)) = (transition.source.state(), transition.event_key()) else {
            continue;
        };
        if !seen.insert((source, key.clone())) {
            out.push(Diagnostic::new(
                DiagnosticCode::DuplicateTransition,
                path,
                format!(
                    "state '{}' already reacts to event '{}' ({})",
                    source, key, transition
                ),
                transition.span,
            ));
        }
    }
}

fn check_events(chart: &Statechart, path: &str, out: &mut Vec<Diagnostic>) {
    if chart.events().is_empty() {
        out.push(Diagnostic::new(
            DiagnosticCode::NoEvents,
            path,
            "the state machine shall have at least one event",
            chart.span,
        ));
    }
}

fn check_incoming(chart: &Statechart, path: &str, out: &mut Vec<Diagnostic>) {
    for state in &chart.states {
        if chart.initial.as_ref() == Some(&state.name) {
            continue;
        }
        let reached = chart
            .transitions
            .iter()
            .any(|t| t.destination.state() == Some(&state.name));
        if !reached {
            out.push(Diagnostic::new(
                DiagnosticCode::NoIncoming,
                path,
                format!("state '{}' has no incoming transition", state.name),
                state.span,
            ));
        }
    }
}

fn check_nondeterminism(chart: &Statechart, path: &str, out: &mut Vec<Diagnostic>) {
    for state in &chart.states {
        let outgoing: Vec<_> = chart.transitions_from(&state.name).collect();
        if outgoing.len() <= 1 {
            continue;
        }
        for t in outgoing
            .iter()
            .filter(|t| t.event.is_none() && t.guard.is_none())
        {
            out.push(Diagnostic::new(
                DiagnosticCode::Nondeterministic,
                path,
                format!(
                    "state '{}' has several ways out but '{}' is always taken",
                    state.name, t
                ),
                t.span,
            ));
        }
    }
}

fn check_eventless_loops(chart: &Statechart, path: &str, out: &mut Vec<Diagnostic>) {
    let mut edges: HashMap<&StateName, Vec<&StateName>> = HashMap::new();
    for t in chart.transitions.iter().filter(|t| t.event.is_none()) {
        if let (Some(from), Some(to)) = (t.source.state(), t.destination.state()) {
            if from != to {
                edges.entry(from).or_default().push(to);
            }
        }
    }

    if let Some(cycle) = find_cycle(&chart.states.iter().map(|s| &s.name).collect::<Vec<_>>(), &edges) {
        let names: Vec<_> = cycle.iter().map(|s| s.as_str()).collect();
        out.push(Diagnostic::new(
            DiagnosticCode::EventlessLoop,
            path,
            format!("infinite loop without events: {}", names.join(" -> ")),
            chart.span,
        ));
    }
}

/// Iterative three-color DFS. Returns the first cycle found, closed on its
/// first state.
fn find_cycle<'a>(
    nodes: &[&'a StateName],
    edges: &HashMap<&'a StateName, Vec<&'a StateName>>,
) -> Option<Vec<&'a StateName>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let mut color: HashMap<&StateName, Color> = nodes.iter().map(|n| (*n, Color::White)).collect();

    for &start in nodes {
        if color.get(start) != Some(&Color::White) {
            continue;
        }
        let mut path: Vec<&StateName> = vec![start];
        let mut cursors: Vec<usize> = vec![0];
        color.insert(start, Color::Gray);

        while let Some(&node) = path.last() {
            let top = cursors.len() - 1;
            let next = edges.get(node).and_then(|out| out.get(cursors[top])).copied();
            cursors[top] += 1;
            match next {
                Some(next) => match color.get(next).copied().unwrap_or(Color::Black) {
                    Color::White => {
                        color.insert(next, Color::Gray);
                        path.push(next);
                        cursors.push(0);
                    }
                    Color::Gray => {
                        let from = path.iter().position(|n| *n == next).unwrap_or(0);
                        let mut cycle = path[from..].to_vec();
                        cycle.push(next);
                        return Some(cycle);
                    }
                    Color::Black => {}
                },
                None => {
                    color.insert(node, Color::Black);
                    path.pop();
                    cursors.pop();
                }
            }
        }
    }
    None
}
