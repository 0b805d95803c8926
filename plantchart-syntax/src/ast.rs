//! Concrete parse tree.
//!
//! The tree mirrors the source closely: nothing is resolved or deduplicated
//! here. Guard and action payloads are kept as the exact text the author
//! wrote.

use crate::error::Span;
use crate::lexer::Arrow;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A whole chart: the text between `@startuml` and `@enduml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Optional name written after `@startuml`.
    pub name: Option<String>,
    pub body: Body,
}

/// A sequence of statements, possibly split into concurrent regions.
///
/// A body without separators has exactly one region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Body {
    pub regions: Vec<Vec<Item>>,
}

impl Body {
    /// Returns true if region separators split this body.
    pub fn is_concurrent(&self) -> bool {
        self.regions.len() > 1
    }

    /// Iterates over every item of every region.
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.regions.iter().flatten()
    }
}

/// One statement of the notation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Comment {
        text: String,
        span: Span,
    },
    /// `skinparam`, `skin` or `hide` line.
    Directive {
        text: String,
        span: Span,
    },
    Pragma {
        kind: PragmaKind,
        text: String,
        span: Span,
    },
    /// `state NAME { ... }`
    StateBlock {
        name: String,
        body: Body,
        span: Span,
    },
    /// `state NAME`
    StateDecl {
        name: String,
        span: Span,
    },
    Clause {
        state: String,
        clause: Clause,
        span: Span,
    },
    Transition(TransitionSyntax),
    Note {
        side: NoteSide,
        state: String,
        text: String,
        span: Span,
    },
}

/// Kind tag of a pragma comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PragmaKind {
    Header,
    Footer,
    Param,
    Cons,
    Init,
    Code,
    Test,
    Brief,
}

impl PragmaKind {
    pub const ALL: [PragmaKind; 8] = [
        PragmaKind::Header,
        PragmaKind::Footer,
        PragmaKind::Param,
        PragmaKind::Cons,
        PragmaKind::Init,
        PragmaKind::Code,
        PragmaKind::Test,
        PragmaKind::Brief,
    ];

    pub fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "header" => Some(PragmaKind::Header),
            "footer" => Some(PragmaKind::Footer),
            "param" => Some(PragmaKind::Param),
            "cons" => Some(PragmaKind::Cons),
            "init" => Some(PragmaKind::Init),
            "code" => Some(PragmaKind::Code),
            "test" => Some(PragmaKind::Test),
            "brief" => Some(PragmaKind::Brief),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            PragmaKind::Header => "header",
            PragmaKind::Footer => "footer",
            PragmaKind::Param => "param",
            PragmaKind::Cons => "cons",
            PragmaKind::Init => "init",
            PragmaKind::Code => "code",
            PragmaKind::Test => "test",
            PragmaKind::Brief => "brief",
        }
    }
}

impl fmt::Display for PragmaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Per-state clause after `STATE :`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    /// `entry` / `entering`
    Entry(ActionSyntax),
    /// `exit` / `leaving`
    Exit(ActionSyntax),
    /// `on` / `event`
    OnEvent {
        event: EventSyntax,
        guard: Option<String>,
        action: Option<ActionSyntax>,
    },
    /// `do` / `activity`
    Activity(ActionSyntax),
    Comment(Option<ActionSyntax>),
}

impl Clause {
    pub fn keyword(&self) -> &'static str {
        match self {
            Clause::Entry(_) => "entry",
            Clause::Exit(_) => "exit",
            Clause::OnEvent { .. } => "on",
            Clause::Activity(_) => "do",
            Clause::Comment(_) => "comment",
        }
    }
}

/// An endpoint as written: a named state or the `[*]` marker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StateRef {
    Marker,
    Named(String),
}

impl fmt::Display for StateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateRef::Marker => f.write_str("[*]"),
            StateRef::Named(name) => f.write_str(name),
        }
    }
}

/// `LEFT ARROW RIGHT (":" label)?`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionSyntax {
    pub left: StateRef,
    pub arrow: Arrow,
    pub right: StateRef,
    pub label: Label,
    pub span: Span,
}

impl TransitionSyntax {
    /// Source endpoint once the arrow direction is applied.
    pub fn source(&self) -> &StateRef {
        if self.arrow.is_reversed() {
            &self.right
        } else {
            &self.left
        }
    }

    /// Destination endpoint once the arrow direction is applied.
    pub fn destination(&self) -> &StateRef {
        if self.arrow.is_reversed() {
            &self.left
        } else {
            &self.right
        }
    }
}

/// `event? guard? action?`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Label {
    pub event: Option<EventSyntax>,
    pub guard: Option<String>,
    pub action: Option<ActionSyntax>,
}

impl Label {
    pub fn is_empty(&self) -> bool {
        self.event.is_none() && self.guard.is_none() && self.action.is_none()
    }
}

/// `WORD+ ( "(" ... ")" )?`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSyntax {
    pub words: Vec<String>,
    /// Verbatim text between the parentheses, if any.
    pub params: Option<String>,
}

/// Which of the two textual action forms was used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionForm {
    /// `/ text`
    Inline,
    /// `\n--\n text`
    Block,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSyntax {
    pub form: ActionForm,
    pub text: String,
}

/// Side a note is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteSide {
    Left,
    Right,
    Top,
    Bottom,
}

impl NoteSide {
    pub fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "left" => Some(NoteSide::Left),
            "right" => Some(NoteSide::Right),
            "top" => Some(NoteSide::Top),
            "bottom" => Some(NoteSide::Bottom),
            _ => None,
        }
    }
}
