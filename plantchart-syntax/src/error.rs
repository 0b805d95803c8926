//! Parse error types.

use std::fmt;
use thiserror::Error;

/// A position in the chart source (1-based line and column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub line: usize,
    pub col: usize,
}

impl Span {
    pub fn new(line: usize, col: usize) -> Self {
        Self { line, col }
    }

    /// Returns a span on the same line shifted right by `cols` columns.
    pub fn shifted(self, cols: usize) -> Self {
        Self {
            line: self.line,
            col: self.col + cols,
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// A grammar violation. Parsing stops at the first one and no parse tree is produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {span}: expected {expected}, found {found}")]
pub struct ParseError {
    /// Where the offending construct starts.
    pub span: Span,
    /// Description of the construct the grammar expected at that point.
    pub expected: String,
    /// What was actually there.
    pub found: String,
}

impl ParseError {
    pub fn new(span: Span, expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self {
            span,
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Renders the error with the offending source line and a caret under the column.
    ///
    /// One line of context is printed above and below when available.
    pub fn render(&self, source: &str) -> String {
        let lines: Vec<&str> = source.lines().collect();
        let line_idx = self.span.line.saturating_sub(1);

        if line_idx >= lines.len() {
            return format!("{} at end of input", self);
        }

        let width = (self.span.line + 1).to_string().len();
        let mut output = format!("error: expected {}, found {}\n", self.expected, self.found);
        output.push_str(&format!("{:>width$}--> line {}\n", "", self.span));
        output.push_str(&format!("{:>width$} |\n", ""));

        if line_idx > 0 {
            output.push_str(&format!(
                "{:>width$} | {}\n",
                self.span.line - 1,
                lines[line_idx - 1]
            ));
        }
        output.push_str(&format!("{:>width$} | {}\n", self.span.line, lines[line_idx]));
        output.push_str(&format!(
            "{:>width$} | {}^\n",
            "",
            " ".repeat(self.span.col.saturating_sub(1))
        ));
        if line_idx + 1 < lines.len() {
            output.push_str(&format!(
                "{:>width$} | {}\n",
                self.span.line + 1,
                lines[line_idx + 1]
            ));
        }

        output
    }
}

/// Describes a piece of source text for the `found` part of an error.
pub(crate) fn describe(text: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        "end of line".to_string()
    } else {
        let short: String = text.chars().take(24).collect();
        if short.len() < text.len() {
            format!("'{}...'", short)
        } else {
            format!("'{}'", short)
        }
    }
}
