//! Line-oriented tokenizer.
//!
//! The notation is line based: every construct fits on one source line except
//! state blocks and multi-line notes, whose boundaries are themselves lines.
//! [`Lexer`] splits the source into [`Line`]s and a [`Cursor`] tokenizes the
//! head of a line on demand. Free-text tails (labels, pragma text, note text)
//! are taken verbatim with [`Cursor::rest`].

use crate::error::Span;
use std::fmt;

/// The four accepted arrow spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arrow {
    /// `->`
    Short,
    /// `-->`
    Long,
    /// `<-`
    ShortReversed,
    /// `<--`
    LongReversed,
}

impl Arrow {
    /// Reversed arrows point from the right-hand state to the left-hand one.
    pub fn is_reversed(self) -> bool {
        matches!(self, Arrow::ShortReversed | Arrow::LongReversed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Arrow::Short => "->",
            Arrow::Long => "-->",
            Arrow::ShortReversed => "<-",
            Arrow::LongReversed => "<--",
        }
    }
}

impl fmt::Display for Arrow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A token at the head of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    Ident(&'a str),
    /// `[*]`
    Marker,
    Arrow(Arrow),
    Colon,
    LeftBrace,
    RightBrace,
    /// Any character that starts no other token.
    Other(char),
    /// Nothing but whitespace remains on the line.
    End,
}

impl Token<'_> {
    pub fn display_name(&self) -> String {
        match self {
            Token::Ident(s) => format!("'{}'", s),
            Token::Marker => "'[*]'".to_string(),
            Token::Arrow(a) => format!("'{}'", a),
            Token::Colon => "':'".to_string(),
            Token::LeftBrace => "'{'".to_string(),
            Token::RightBrace => "'}'".to_string(),
            Token::Other(c) => format!("'{}'", c),
            Token::End => "end of line".to_string(),
        }
    }
}

/// A token together with where it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpannedToken<'a> {
    pub token: Token<'a>,
    pub span: Span,
}

/// One physical source line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line<'a> {
    /// 1-based line number.
    pub number: usize,
    /// Line text without the line terminator.
    pub text: &'a str,
}

impl<'a> Line<'a> {
    /// The line without surrounding whitespace.
    pub fn trimmed(&self) -> &'a str {
        self.text.trim()
    }

    pub fn is_blank(&self) -> bool {
        self.trimmed().is_empty()
    }

    /// Span of the first non-whitespace character.
    pub fn start(&self) -> Span {
        let indent = self.text.len() - self.text.trim_start().len();
        Span::new(self.number, self.text[..indent].chars().count() + 1)
    }

    pub fn cursor(&self) -> Cursor<'a> {
        Cursor::new(*self)
    }
}

/// Splits chart source into lines, with one line of lookahead.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    lines: Vec<Line<'a>>,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        let lines = source
            .lines()
            .enumerate()
            .map(|(i, text)| Line {
                number: i + 1,
                text,
            })
            .collect();
        Self { lines, pos: 0 }
    }

    pub fn peek(&self) -> Option<Line<'a>> {
        self.lines.get(self.pos).copied()
    }

    pub fn next_line(&mut self) -> Option<Line<'a>> {
        let line = self.peek()?;
        self.pos += 1;
        Some(line)
    }

    /// Span just past the last line, used for end-of-input errors.
    pub fn end_span(&self) -> Span {
        Span::new(self.lines.len() + 1, 1)
    }
}

/// Returns true for characters allowed inside identifiers.
pub fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Returns true if the whole string is a valid identifier.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => chars.all(is_ident_char),
        _ => false,
    }
}

/// Tokenizer over a single line.
#[derive(Debug, Clone, Copy)]
pub struct Cursor<'a> {
    line: Line<'a>,
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(line: Line<'a>) -> Self {
        Self { line, pos: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.line.text[self.pos..]
    }

    fn skip_whitespace(&mut self) {
        let rest = self.remaining();
        self.pos += rest.len() - rest.trim_start().len();
    }

    /// Span of the current position (after skipping whitespace).
    pub fn span(&self) -> Span {
        let mut probe = *self;
        probe.skip_whitespace();
        Span::new(
            self.line.number,
            self.line.text[..probe.pos].chars().count() + 1,
        )
    }

    /// Returns the next token without consuming it.
    pub fn peek(&self) -> SpannedToken<'a> {
        let mut probe = *self;
        probe.next_token()
    }

    /// Consumes and returns the next token.
    pub fn next_token(&mut self) -> SpannedToken<'a> {
        self.skip_whitespace();
        let span = self.span();
        let rest = self.remaining();

        let Some(c) = rest.chars().next() else {
            return SpannedToken {
                token: Token::End,
                span,
            };
        };

        let (token, len) = if c.is_ascii_alphabetic() || c == '_' {
            let len = rest.find(|c: char| !is_ident_char(c)).unwrap_or(rest.len());
            (Token::Ident(&rest[..len]), len)
        } else if rest.starts_with("[*]") {
            (Token::Marker, 3)
        } else if rest.starts_with("-->") {
            (Token::Arrow(Arrow::Long), 3)
        } else if rest.starts_with("->") {
            (Token::Arrow(Arrow::Short), 2)
        } else if rest.starts_with("<--") {
            (Token::Arrow(Arrow::LongReversed), 3)
        } else if rest.starts_with("<-") {
            (Token::Arrow(Arrow::ShortReversed), 2)
        } else {
            match c {
                ':' => (Token::Colon, 1),
                '{' => (Token::LeftBrace, 1),
                '}' => (Token::RightBrace, 1),
                other => (Token::Other(other), other.len_utf8()),
            }
        };

        self.pos += len;
        SpannedToken { token, span }
    }

    /// Consumes the rest of the line and returns it trimmed.
    pub fn rest(&mut self) -> &'a str {
        let rest = self.remaining();
        self.pos = self.line.text.len();
        rest.trim()
    }

    /// Returns true when nothing but whitespace remains.
    pub fn at_end(&self) -> bool {
        self.remaining().trim().is_empty()
    }
}
