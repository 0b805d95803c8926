//! Sub-parser for the free-text tail after a colon.
//!
//! Grammar:
//!
//! ```text
//! label   ::= event? guard? action?
//! event   ::= WORD+ ( "(" ... ")" )?
//! guard   ::= "[" ... "]"
//! action  ::= "/" TEXT | "\n--\n" TEXT
//! ```
//!
//! The block delimiter is the literal six characters `\n--\n` as PlantUML
//! writes them inside a one-line label. Guard and action text is captured
//! verbatim (trimmed) and never interpreted.

use crate::ast::{ActionForm, ActionSyntax, EventSyntax, Label};
use crate::error::{describe, ParseError, Span};
use crate::lexer::is_ident_char;

/// Literal delimiter introducing the block action form.
pub const BLOCK_DELIMITER: &str = "\\n--\\n";

/// Parses `event? guard? action?`.
pub fn parse_label(input: &str, span: Span) -> Result<Label, ParseError> {
    let mut parser = LabelParser::new(input, span);
    let label = parser.parse_label()?;
    parser.expect_end()?;
    Ok(label)
}

/// Parses `event guard? action?` where the event is mandatory.
pub fn parse_event_label(input: &str, span: Span) -> Result<Label, ParseError> {
    let label = parse_label(input, span)?;
    if label.event.is_none() {
        return Err(ParseError::new(span, "an event name", describe(input)));
    }
    Ok(label)
}

/// Parses a lone action (`/ text` or `\n--\n text`).
pub fn parse_action(input: &str, span: Span) -> Result<ActionSyntax, ParseError> {
    let mut parser = LabelParser::new(input, span);
    parser.skip_whitespace();
    match parser.parse_action()? {
        Some(action) => Ok(action),
        None => Err(ParseError::new(
            span,
            "an action ('/ ...' or '\\n--\\n ...')",
            describe(input),
        )),
    }
}

/// Like [`parse_action`], but an empty input yields `None`.
pub fn parse_optional_action(
    input: &str,
    span: Span,
) -> Result<Option<ActionSyntax>, ParseError> {
    if input.trim().is_empty() {
        return Ok(None);
    }
    parse_action(input, span).map(Some)
}

struct LabelParser<'a> {
    input: &'a str,
    pos: usize,
    span: Span,
}

impl<'a> LabelParser<'a> {
    fn new(input: &'a str, span: Span) -> Self {
        Self {
            input,
            pos: 0,
            span,
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn here(&self) -> Span {
        self.span.shifted(self.input[..self.pos].chars().count())
    }

    fn error(&self, expected: &str) -> ParseError {
        ParseError::new(self.here(), expected, describe(self.rest()))
    }

    fn parse_label(&mut self) -> Result<Label, ParseError> {
        self.skip_whitespace();
        let event = match self.peek_char() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => Some(self.parse_event()?),
            _ => None,
        };

        self.skip_whitespace();
        let guard = if self.peek_char() == Some('[') {
            Some(self.parse_guard()?)
        } else {
            None
        };

        self.skip_whitespace();
        let action = self.parse_action()?;

        Ok(Label {
            event,
            guard,
            action,
        })
    }

    fn parse_word(&mut self) -> &'a str {
        let rest = self.rest();
        let len = rest.find(|c: char| !is_ident_char(c)).unwrap_or(rest.len());
        self.pos += len;
        &rest[..len]
    }

    fn parse_event(&mut self) -> Result<EventSyntax, ParseError> {
        let mut words = Vec::new();
        let mut params = None;

        loop {
            words.push(self.parse_word().to_string());
            self.skip_whitespace();

            match self.peek_char() {
                Some('(') => {
                    let inner = self.parse_delimited('(', ')', "')' closing the event parameters")?;
                    params = Some(inner.trim().to_string());
                    break;
                }
                Some(c) if c.is_ascii_alphabetic() || c == '_' => continue,
                Some('[') | Some('/') | None => break,
                Some(_) if self.rest().starts_with(BLOCK_DELIMITER) => break,
                Some(_) => {
                    return Err(self.error("an event word, '(', '[' or an action"));
                }
            }
        }

        Ok(EventSyntax { words, params })
    }

    fn parse_guard(&mut self) -> Result<String, ParseError> {
        let start = self.here();
        let inner = self.parse_delimited('[', ']', "']' closing the guard")?;
        let guard = inner.trim();
        if guard.is_empty() {
            return Err(ParseError::new(start, "a guard expression", "'[]'"));
        }
        Ok(guard.to_string())
    }

    /// Consumes `open ... close`, honoring nesting, and returns the inner text.
    fn parse_delimited(
        &mut self,
        open: char,
        close: char,
        missing: &str,
    ) -> Result<&'a str, ParseError> {
        let start_span = self.here();
        self.pos += open.len_utf8();
        let start = self.pos;
        let mut depth = 1usize;

        for (offset, c) in self.rest().char_indices() {
            if c == open {
                depth += 1;
            } else if c == close {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset;
                    self.pos = end + close.len_utf8();
                    return Ok(&self.input[start..end]);
                }
            }
        }

        Err(ParseError::new(start_span, missing, "end of line"))
    }

    fn parse_action(&mut self) -> Result<Option<ActionSyntax>, ParseError> {
        let form = if self.peek_char() == Some('/') {
            self.pos += 1;
            ActionForm::Inline
        } else if self.rest().starts_with(BLOCK_DELIMITER) {
            self.pos += BLOCK_DELIMITER.len();
            ActionForm::Block
        } else {
            return Ok(None);
        };

        self.skip_whitespace();
        let text = self.rest().trim_end();
        if text.is_empty() {
            return Err(self.error("action text"));
        }
        self.pos = self.input.len();

        Ok(Some(ActionSyntax {
            form,
            text: text.to_string(),
        }))
    }

    fn expect_end(&mut self) -> Result<(), ParseError> {
        self.skip_whitespace();
        if self.pos < self.input.len() {
            return Err(self.error("'/' or '\\n--\\n' introducing an action"));
        }
        Ok(())
    }
}
