//! Statechart model.
//!
//! The IR built from a parsed chart. Guard and action payloads stay opaque
//! text; interpreting them is the job of whoever binds callables to them (see
//! [`crate::bindings`]) or of an external emission backend, which reads the
//! model through [`Statechart::to_json`].
//!
//! ```json
//! {
//!   "name": "Gumball",
//!   "states": [{"name": "NoQuarter"}, {"name": "HasQuarter"}],
//!   "initial": "NoQuarter",
//!   "transitions": [
//!     {"source": {"kind": "state", "state": "NoQuarter"},
//!      "destination": {"kind": "state", "state": "HasQuarter"},
//!      "event": {"words": ["insert", "quarter"]}}
//!   ]
//! }
//! ```

use crate::error::CoreError;
use plantchart_syntax::{ActionForm, PragmaKind, Span};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// "No reaction" sentinel of sparse transition tables.
pub const IGNORING_EVENT: &str = "IGNORING_EVENT";
/// Forbidden state/event pair sentinel.
pub const CANNOT_HAPPEN: &str = "CANNOT_HAPPEN";
/// Implicit state-count bound.
pub const MAX_STATES: &str = "MAX_STATES";

/// Identifiers a chart may never declare.
pub const RESERVED_STATE_IDS: [&str; 3] = [IGNORING_EVENT, CANNOT_HAPPEN, MAX_STATES];

/// Returns true if `name` collides with a reserved identifier.
pub fn is_reserved(name: &str) -> bool {
    RESERVED_STATE_IDS.contains(&name)
}

/// A state identifier, unique within its scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateName(pub String);

impl StateName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StateName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for StateName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for StateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An event: one or more words plus optional verbatim parameter text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Event {
    pub words: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<String>,
}

impl Event {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            words: words.into_iter().map(Into::into).collect(),
            params: None,
        }
    }

    pub fn with_params(mut self, params: impl Into<String>) -> Self {
        self.params = Some(params.into());
        self
    }

    /// Dispatch lookup key: the words joined by single spaces.
    pub fn key(&self) -> String {
        self.words.join(" ")
    }

    /// Method-style name for emission backends.
    ///
    /// A single word followed by parameters is kept as written. Otherwise the
    /// first word is lower-cased and every following word is capitalized:
    /// `insert quarter` becomes `insertQuarter`, `setSpeed(x)` stays `setSpeed`.
    pub fn camel_case(&self) -> String {
        let mut name = String::new();
        for (i, word) in self.words.iter().enumerate() {
            if i == 0 {
                if self.words.len() == 1 && self.params.is_some() {
                    name.push_str(word);
                } else {
                    name.push_str(&word.to_lowercase());
                }
            } else {
                name.push_str(&capitalize(word));
            }
        }
        name
    }

    /// Parameter names split on commas.
    pub fn param_names(&self) -> Vec<&str> {
        match &self.params {
            Some(params) => params
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .collect(),
            None => Vec::new(),
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())?;
        if let Some(params) = &self.params {
            write!(f, "({})", params)?;
        }
        Ok(())
    }
}

/// Opaque guard expression text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Guard(pub String);

impl Guard {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0)
    }
}

/// Opaque action statement text and the form it was written in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Action {
    pub form: ActionForm,
    pub text: String,
}

impl Action {
    pub fn inline(text: impl Into<String>) -> Self {
        Self {
            form: ActionForm::Inline,
            text: text.into(),
        }
    }

    pub fn block(text: impl Into<String>) -> Self {
        Self {
            form: ActionForm::Block,
            text: text.into(),
        }
    }
}

/// A state's internal-event reaction (`STATE : on EVENT [guard] / action`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalHandler {
    pub event: Event,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<Guard>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
}

/// A state and its handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    pub name: StateName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit: Option<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity: Option<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal: Option<InternalHandler>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Where the state was first mentioned.
    #[serde(skip)]
    pub span: Option<Span>,
}

impl State {
    pub fn new(name: impl Into<StateName>) -> Self {
        Self {
            name: name.into(),
            entry: None,
            exit: None,
            activity: None,
            internal: None,
            comment: None,
            span: None,
        }
    }

    pub fn is_reserved(&self) -> bool {
        is_reserved(self.name.as_str())
    }
}

/// A transition endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "state", rename_all = "lowercase")]
pub enum Endpoint {
    /// `[*]` as a source.
    Initial,
    /// `[*]` as a destination.
    Final,
    State(StateName),
}

impl Endpoint {
    pub fn state(&self) -> Option<&StateName> {
        match self {
            Endpoint::State(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Initial | Endpoint::Final => f.write_str("[*]"),
            Endpoint::State(name) => f.write_str(name.as_str()),
        }
    }
}

/// A (source, destination, event?, guard?, action?) tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub source: Endpoint,
    pub destination: Endpoint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<Event>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<Guard>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(skip)]
    pub span: Option<Span>,
}

impl Transition {
    pub fn new(source: Endpoint, destination: Endpoint) -> Self {
        Self {
            source,
            destination,
            event: None,
            guard: None,
            action: None,
            span: None,
        }
    }

    pub fn on(mut self, event: Event) -> Self {
        self.event = Some(event);
        self
    }

    pub fn guarded(mut self, guard: Guard) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }

    /// Event key, or `None` for completion (event-less) transitions.
    pub fn event_key(&self) -> Option<String> {
        self.event.as_ref().map(Event::key)
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} --> {}", self.source, self.destination)?;
        if let Some(event) = &self.event {
            write!(f, " : {}", event)?;
        }
        if let Some(guard) = &self.guard {
            write!(f, " {}", guard)?;
        }
        if let Some(action) = &self.action {
            write!(f, " / {}", action.text)?;
        }
        Ok(())
    }
}

/// A verbatim fragment tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pragma {
    pub kind: PragmaKind,
    pub text: String,
}

/// Pragmas of one scope in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pragmas(pub Vec<Pragma>);

impl Pragmas {
    pub fn push(&mut self, kind: PragmaKind, text: impl Into<String>) {
        self.0.push(Pragma {
            kind,
            text: text.into(),
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pragma> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Texts of one kind, in declaration order.
    pub fn of_kind(&self, kind: PragmaKind) -> impl Iterator<Item = &str> {
        self.0
            .iter()
            .filter(move |p| p.kind == kind)
            .map(|p| p.text.as_str())
    }

    /// Texts grouped by kind, each group in declaration order.
    pub fn grouped(&self) -> BTreeMap<PragmaKind, Vec<&str>> {
        let mut groups: BTreeMap<PragmaKind, Vec<&str>> = BTreeMap::new();
        for pragma in &self.0 {
            groups.entry(pragma.kind).or_default().push(&pragma.text);
        }
        groups
    }
}

/// A statechart scope: the root chart, a composite state body or a region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statechart {
    pub name: String,

    /// States in insertion order. A duplicate declaration shows up twice so
    /// the validator can report it.
    pub states: Vec<State>,

    pub transitions: Vec<Transition>,

    /// Target of the `[*] -> X` transition, resolved by the builder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<StateName>,

    #[serde(default, skip_serializing_if = "Pragmas::is_empty")]
    pub pragmas: Pragmas,

    /// Composite states, each named after the state of this scope it refines.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Statechart>,

    /// Concurrent regions. Structural only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub regions: Vec<Statechart>,

    #[serde(skip)]
    pub span: Option<Span>,
}

impl Statechart {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            states: Vec::new(),
            transitions: Vec::new(),
            initial: None,
            pragmas: Pragmas::default(),
            children: Vec::new(),
            regions: Vec::new(),
            span: None,
        }
    }

    /// Parses a model previously produced by [`Statechart::to_json`].
    pub fn from_json(json: &serde_json::Value) -> Result<Self, CoreError> {
        Ok(serde_json::from_value(json.clone())?)
    }

    pub fn to_json(&self) -> Result<serde_json::Value, CoreError> {
        Ok(serde_json::to_value(self)?)
    }

    /// CRC-32C of the JSON encoding. Spans are not part of it.
    pub fn checksum(&self) -> Result<String, CoreError> {
        let json = serde_json::to_vec(self)?;
        Ok(format!("{:08x}", crc32c::crc32c(&json)))
    }

    pub fn state(&self, name: &str) -> Option<&State> {
        self.states.iter().find(|s| s.name.as_str() == name)
    }

    pub fn state_mut(&mut self, name: &str) -> Option<&mut State> {
        self.states.iter_mut().find(|s| s.name.as_str() == name)
    }

    pub fn has_state(&self, name: &str) -> bool {
        self.state(name).is_some()
    }

    /// Returns the named state, declaring it first if needed.
    pub fn ensure_state(&mut self, name: &str, span: Option<Span>) -> &mut State {
        let index = match self.states.iter().position(|s| s.name.as_str() == name) {
            Some(index) => index,
            None => {
                let mut state = State::new(name);
                state.span = span;
                self.states.push(state);
                self.states.len() - 1
            }
        };
        &mut self.states[index]
    }

    pub fn child(&self, name: &str) -> Option<&Statechart> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn is_composite(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn is_concurrent(&self) -> bool {
        !self.regions.is_empty()
    }

    /// Transitions leaving a state, in declaration order.
    pub fn transitions_from<'a>(
        &'a self,
        state: &'a StateName,
    ) -> impl Iterator<Item = &'a Transition> + 'a {
        self.transitions
            .iter()
            .filter(move |t| t.source.state() == Some(state))
    }

    /// Transitions triggered by an event key, in declaration order.
    pub fn transitions_on<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a Transition> + 'a {
        self.transitions
            .iter()
            .filter(move |t| t.event.as_ref().is_some_and(|e| e.key() == key))
    }

    /// Distinct events of this scope by key, in first-appearance order.
    pub fn events(&self) -> Vec<&Event> {
        let mut seen = Vec::new();
        let mut events = Vec::new();
        let internal = self.states.iter().filter_map(|s| s.internal.as_ref());
        let all = self
            .transitions
            .iter()
            .filter_map(|t| t.event.as_ref())
            .chain(internal.map(|h| &h.event));
        for event in all {
            let key = event.key();
            if !seen.contains(&key) {
                seen.push(key);
                events.push(event);
            }
        }
        events
    }

    /// Transitions sourced from the initial marker.
    pub fn initial_transitions(&self) -> impl Iterator<Item = &Transition> {
        self.transitions
            .iter()
            .filter(|t| t.source == Endpoint::Initial)
    }

    /// True if some transition targets the final pseudo-state.
    pub fn has_final(&self) -> bool {
        self.transitions
            .iter()
            .any(|t| t.destination == Endpoint::Final)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Statechart {
        let mut chart = Statechart::new("Gumball");
        chart.ensure_state("NoQuarter", None);
        chart.ensure_state("HasQuarter", None);
        chart.initial = Some("NoQuarter".into());
        chart
            .transitions
            .push(Transition::new(Endpoint::Initial, Endpoint::State("NoQuarter".into())));
        chart.transitions.push(
            Transition::new(
                Endpoint::State("NoQuarter".into()),
                Endpoint::State("HasQuarter".into()),
            )
            .on(Event::new(["insert", "quarter"])),
        );
        chart.transitions.push(
            Transition::new(
                Endpoint::State("HasQuarter".into()),
                Endpoint::State("NoQuarter".into()),
            )
            .on(Event::new(["eject", "quarter"]))
            .with_action(Action::inline("refund()")),
        );
        chart
    }

    #[test]
    fn test_reserved_ids() {
        assert!(is_reserved("IGNORING_EVENT"));
        assert!(is_reserved("CANNOT_HAPPEN"));
        assert!(is_reserved("MAX_STATES"));
        assert!(!is_reserved("Idle"));
    }

    #[test]
    fn test_event_key_and_display() {
        let event = Event::new(["set", "speed"]).with_params("x, y");
        assert_eq!(event.key(), "set speed");
        assert_eq!(event.to_string(), "set speed(x, y)");
        assert_eq!(event.param_names(), vec!["x", "y"]);
    }

    #[test]
    fn test_event_camel_case() {
        assert_eq!(Event::new(["insert", "quarter"]).camel_case(), "insertQuarter");
        assert_eq!(Event::new(["Turn", "CRANK"]).camel_case(), "turnCrank");
        assert_eq!(Event::new(["Halt"]).camel_case(), "halt");
        assert_eq!(
            Event::new(["setSpeed"]).with_params("x").camel_case(),
            "setSpeed"
        );
        assert_eq!(Event::new(["foo", "bar"]).with_params("x").camel_case(), "fooBar");
    }

    #[test]
    fn test_ensure_state_keeps_insertion_order() {
        let mut chart = Statechart::new("c");
        chart.ensure_state("B", None);
        chart.ensure_state("A", None);
        chart.ensure_state("B", None).comment = Some("twice".into());
        let names: Vec<_> = chart.states.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["B", "A"]);
        assert_eq!(chart.state("B").unwrap().comment.as_deref(), Some("twice"));
    }

    #[test]
    fn test_transition_queries() {
        let chart = sample();
        let has = StateName::from("HasQuarter");
        assert_eq!(chart.transitions_from(&has).count(), 1);
        assert_eq!(chart.transitions_on("insert quarter").count(), 1);
        assert_eq!(chart.transitions_on("insert").count(), 0);
        assert_eq!(chart.events().len(), 2);
        assert_eq!(chart.initial_transitions().count(), 1);
        assert!(!chart.has_final());
    }

    #[test]
    fn test_pragmas_grouped_in_order() {
        let mut pragmas = Pragmas::default();
        pragmas.push(PragmaKind::Header, "first");
        pragmas.push(PragmaKind::Code, "int x;");
        pragmas.push(PragmaKind::Header, "second");
        assert_eq!(
            pragmas.of_kind(PragmaKind::Header).collect::<Vec<_>>(),
            vec!["first", "second"]
        );
        let grouped = pragmas.grouped();
        assert_eq!(grouped[&PragmaKind::Code], vec!["int x;"]);
        assert!(!grouped.contains_key(&PragmaKind::Footer));
    }

    #[test]
    fn test_json_roundtrip() {
        let chart = sample();
        let json = chart.to_json().unwrap();
        assert_eq!(json["transitions"][0]["source"]["kind"], "initial");
        assert_eq!(json["transitions"][1]["event"]["words"][1], "quarter");
        assert_eq!(Statechart::from_json(&json).unwrap(), chart);
    }

    #[test]
    fn test_checksum_ignores_spans() {
        let chart = sample();
        let mut moved = chart.clone();
        moved.span = Some(Span::new(3, 1));
        moved.states[0].span = Some(Span::new(7, 2));

        let checksum = chart.checksum().unwrap();
        assert_eq!(checksum.len(), 8);
        assert_eq!(checksum, moved.checksum().unwrap());

        moved.ensure_state("Extra", None);
        assert_ne!(checksum, moved.checksum().unwrap());
    }

    #[test]
    fn test_transition_display() {
        let chart = sample();
        assert_eq!(
            chart.transitions[2].to_string(),
            "HasQuarter --> NoQuarter : eject quarter / refund()"
        );
        assert_eq!(chart.transitions[0].to_string(), "[*] --> NoQuarter");
    }
}
