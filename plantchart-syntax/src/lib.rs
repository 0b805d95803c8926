//! # plantchart-syntax
//!
//! Lexer and parser for the plantchart statechart notation, a subset of
//! PlantUML state diagrams extended with pragma comments.
//!
//! This crate provides:
//! - Line-oriented tokenization
//! - The grammar parser producing a concrete parse tree
//! - Label parsing (event, guard, action) with opaque guard/action text
//! - Positioned parse errors

pub mod ast;
pub mod error;
pub mod label;
pub mod lexer;
pub mod parser;

pub use ast::{
    ActionForm, ActionSyntax, Body, Clause, Document, EventSyntax, Item, Label, NoteSide,
    PragmaKind, StateRef, TransitionSyntax,
};
pub use error::{ParseError, Span};
pub use lexer::{is_identifier, Arrow};
pub use parser::{parse, Parser};
