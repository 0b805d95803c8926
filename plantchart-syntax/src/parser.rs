//! Recursive-descent parser for the statechart notation.
//!
//! ```text
//! chart        ::= "@startuml" body "@enduml"
//! body         ::= ( comment | pragma | skin_directive | state_block
//!                   | state_clause | transition | note | region_sep )*
//! state_block  ::= "state" STATE "{" body "}"
//! region_sep   ::= "--" | "||"
//! state_clause ::= STATE ":" ( "entry" | "entering" ) action
//!                | STATE ":" ( "exit" | "leaving" ) action
//!                | STATE ":" ( "on" | "event" ) event guard? action?
//!                | STATE ":" ( "do" | "activity" ) action
//!                | STATE ":" "comment" action?
//! transition   ::= STATE ARROW STATE ( ":" event? guard? action? )?
//! pragma       ::= "'" KIND WS+ TEXT | "'[" KIND "]" TEXT
//! ```
//!
//! Each statement occupies one line; blocks and multi-line notes are
//! delimited by lines of their own.

use crate::ast::{
    Body, Clause, Document, Item, Label, NoteSide, PragmaKind, StateRef, TransitionSyntax,
};
use crate::error::{describe, ParseError, Span};
use crate::label::{parse_action, parse_event_label, parse_label, parse_optional_action};
use crate::lexer::{Cursor, Lexer, Line, Token};

const START_MARKER: &str = "@startuml";
const END_MARKER: &str = "@enduml";

/// Parses a whole chart.
pub fn parse(source: &str) -> Result<Document, ParseError> {
    Parser::new(source).parse_document()
}

/// Where a body is nested.
#[derive(Debug, Clone)]
enum Scope {
    Chart,
    Block { name: String, span: Span },
}

impl Scope {
    fn closing(&self) -> String {
        match self {
            Scope::Chart => format!("'{}'", END_MARKER),
            Scope::Block { name, span } => {
                format!("'}}' closing state '{}' opened at line {}", name, span.line)
            }
        }
    }
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            lexer: Lexer::new(source),
        }
    }

    pub fn parse_document(&mut self) -> Result<Document, ParseError> {
        let start = loop {
            match self.lexer.next_line() {
                Some(line) if is_ignorable(&line) => continue,
                Some(line) => break line,
                None => {
                    return Err(ParseError::new(
                        self.lexer.end_span(),
                        format!("'{}'", START_MARKER),
                        "end of input",
                    ))
                }
            }
        };

        let Some(name) = start.trimmed().strip_prefix(START_MARKER) else {
            return Err(ParseError::new(
                start.start(),
                format!("'{}'", START_MARKER),
                describe(start.text),
            ));
        };
        let name = name.trim();
        let name = (!name.is_empty()).then(|| name.to_string());

        let body = self.parse_body(&Scope::Chart)?;

        while let Some(line) = self.lexer.next_line() {
            if !is_ignorable(&line) {
                return Err(ParseError::new(
                    line.start(),
                    format!("nothing after '{}'", END_MARKER),
                    describe(line.text),
                ));
            }
        }

        Ok(Document { name, body })
    }

    /// Parses statements until the scope's closing line, which is consumed.
    fn parse_body(&mut self, scope: &Scope) -> Result<Body, ParseError> {
        let mut regions = Vec::new();
        let mut current = Vec::new();

        loop {
            let Some(line) = self.lexer.next_line() else {
                return Err(ParseError::new(
                    self.lexer.end_span(),
                    scope.closing(),
                    "end of input",
                ));
            };
            let text = line.trimmed();

            if text.is_empty() {
                continue;
            }

            match (text, scope) {
                (END_MARKER, Scope::Chart) | ("}", Scope::Block { .. }) => {
                    regions.push(current);
                    return Ok(Body { regions });
                }
                (END_MARKER, Scope::Block { .. }) | ("}", Scope::Chart) => {
                    return Err(ParseError::new(
                        line.start(),
                        scope.closing(),
                        describe(text),
                    ));
                }
                ("--", _) | ("||", _) => {
                    regions.push(std::mem::take(&mut current));
                    continue;
                }
                _ => {}
            }

            if text.starts_with(START_MARKER) {
                return Err(ParseError::new(
                    line.start(),
                    "a statement",
                    describe(text),
                ));
            }

            if text.starts_with('\'') {
                current.push(parse_quote_line(&line));
                continue;
            }

            let mut cursor = line.cursor();
            let head = cursor.next_token();
            let second = cursor.peek().token;

            let item = match (head.token, second) {
                (Token::Ident("skinparam" | "skin" | "hide"), _) => {
                    self.parse_directive(text, head.span)?
                }
                (Token::Ident("state"), Token::Ident(_)) => self.parse_state(cursor, head.span)?,
                (Token::Ident("note"), Token::Ident(side)) if NoteSide::from_keyword(side).is_some() => {
                    self.parse_note(cursor, head.span)?
                }
                _ => parse_statement(line.cursor())?,
            };
            current.push(item);
        }
    }

    /// `state NAME`, `state NAME {` or `state NAME {}`; the cursor is past `state`.
    fn parse_state(&mut self, mut cursor: Cursor<'a>, span: Span) -> Result<Item, ParseError> {
        let name = match cursor.next_token().token {
            Token::Ident(name) => name.to_string(),
            other => return Err(ParseError::new(span, "a state name", other.display_name())),
        };

        let next = cursor.next_token();
        match next.token {
            Token::End => Ok(Item::StateDecl { name, span }),
            Token::LeftBrace => {
                let after = cursor.next_token();
                match after.token {
                    Token::RightBrace if cursor.at_end() => Ok(Item::StateBlock {
                        name,
                        body: Body {
                            regions: vec![Vec::new()],
                        },
                        span,
                    }),
                    Token::End => {
                        let scope = Scope::Block {
                            name: name.clone(),
                            span,
                        };
                        let body = self.parse_body(&scope)?;
                        Ok(Item::StateBlock { name, body, span })
                    }
                    other => Err(ParseError::new(
                        after.span,
                        "end of line after '{'",
                        other.display_name(),
                    )),
                }
            }
            other => Err(ParseError::new(
                next.span,
                "'{' or end of line",
                other.display_name(),
            )),
        }
    }

    /// A directive line, or a `skinparam NAME {` block running to its
    /// matching `}`. Either way the whole text is kept as one item.
    fn parse_directive(&mut self, text: &str, span: Span) -> Result<Item, ParseError> {
        let mut depth = brace_balance(text);
        if depth <= 0 {
            return Ok(Item::Directive {
                text: text.to_string(),
                span,
            });
        }

        let mut lines = vec![text.to_string()];
        while depth > 0 {
            let Some(line) = self.lexer.next_line() else {
                return Err(ParseError::new(
                    self.lexer.end_span(),
                    format!("'}}' closing the directive opened at line {}", span.line),
                    "end of input",
                ));
            };
            depth += brace_balance(line.trimmed());
            lines.push(line.trimmed().to_string());
        }
        Ok(Item::Directive {
            text: lines.join("\n"),
            span,
        })
    }

    /// `note SIDE of STATE : text` or a multi-line note closed by `end note`.
    fn parse_note(&mut self, mut cursor: Cursor<'a>, span: Span) -> Result<Item, ParseError> {
        let side = match cursor.next_token().token {
            Token::Ident(side) => NoteSide::from_keyword(side),
            _ => None,
        };
        let Some(side) = side else {
            return Err(ParseError::new(span, "a note side", describe(cursor.rest())));
        };

        let of = cursor.next_token();
        if of.token != Token::Ident("of") {
            return Err(ParseError::new(of.span, "'of'", of.token.display_name()));
        }

        let target = cursor.next_token();
        let state = match target.token {
            Token::Ident(name) => name.to_string(),
            other => {
                return Err(ParseError::new(
                    target.span,
                    "a state name",
                    other.display_name(),
                ))
            }
        };

        let next = cursor.next_token();
        match next.token {
            Token::Colon => Ok(Item::Note {
                side,
                state,
                text: cursor.rest().to_string(),
                span,
            }),
            Token::End => {
                let mut lines = Vec::new();
                loop {
                    let Some(line) = self.lexer.next_line() else {
                        return Err(ParseError::new(
                            self.lexer.end_span(),
                            format!("'end note' closing the note opened at line {}", span.line),
                            "end of input",
                        ));
                    };
                    if line.trimmed() == "end note" {
                        break;
                    }
                    lines.push(line.trimmed());
                }
                Ok(Item::Note {
                    side,
                    state,
                    text: lines.join("\n"),
                    span,
                })
            }
            other => Err(ParseError::new(
                next.span,
                "':' or end of line",
                other.display_name(),
            )),
        }
    }
}

/// Opening minus closing braces on a line.
fn brace_balance(text: &str) -> i32 {
    text.chars().fold(0, |depth, c| match c {
        '{' => depth + 1,
        '}' => depth - 1,
        _ => depth,
    })
}

/// Blank lines and plain comments may surround the chart markers.
fn is_ignorable(line: &Line<'_>) -> bool {
    line.is_blank() || line.trimmed().starts_with('\'')
}

/// A line starting with `'` is a pragma when a kind follows the quote directly.
fn parse_quote_line(line: &Line<'_>) -> Item {
    let text = line.trimmed();
    let span = line.start();
    let body = &text[1..];

    let pragma = if let Some(bracketed) = body.strip_prefix('[') {
        bracketed.split_once(']').and_then(|(keyword, rest)| {
            PragmaKind::from_keyword(keyword.trim()).map(|kind| (kind, rest.trim()))
        })
    } else {
        body.split_once(char::is_whitespace).and_then(|(keyword, rest)| {
            let rest = rest.trim();
            PragmaKind::from_keyword(keyword)
                .filter(|_| !rest.is_empty())
                .map(|kind| (kind, rest))
        })
    };

    match pragma {
        Some((kind, text)) => Item::Pragma {
            kind,
            text: text.to_string(),
            span,
        },
        None => Item::Comment {
            text: body.trim().to_string(),
            span,
        },
    }
}

/// A transition or a per-state clause.
fn parse_statement(mut cursor: Cursor<'_>) -> Result<Item, ParseError> {
    let head = cursor.next_token();
    let left = match head.token {
        Token::Ident(name) => StateRef::Named(name.to_string()),
        Token::Marker => StateRef::Marker,
        other => {
            return Err(ParseError::new(
                head.span,
                "a state name, '[*]', 'state', 'note', a directive or a comment",
                other.display_name(),
            ))
        }
    };

    let next = cursor.next_token();
    match next.token {
        Token::Arrow(arrow) => {
            let target = cursor.next_token();
            let right = match target.token {
                Token::Ident(name) => StateRef::Named(name.to_string()),
                Token::Marker => StateRef::Marker,
                other => {
                    return Err(ParseError::new(
                        target.span,
                        "a state name or '[*]'",
                        other.display_name(),
                    ))
                }
            };

            let after = cursor.next_token();
            let label = match after.token {
                Token::End => Label::default(),
                Token::Colon => {
                    let span = cursor.span();
                    parse_label(cursor.rest(), span)?
                }
                other => {
                    return Err(ParseError::new(
                        after.span,
                        "':' or end of line",
                        other.display_name(),
                    ))
                }
            };

            Ok(Item::Transition(TransitionSyntax {
                left,
                arrow,
                right,
                label,
                span: head.span,
            }))
        }
        Token::Colon => {
            let StateRef::Named(state) = left else {
                return Err(ParseError::new(head.span, "a state name", "'[*]'"));
            };
            let clause = parse_clause(&mut cursor)?;
            Ok(Item::Clause {
                state,
                clause,
                span: head.span,
            })
        }
        other => Err(ParseError::new(
            next.span,
            "an arrow ('->', '-->', '<-', '<--') or ':'",
            other.display_name(),
        )),
    }
}

/// The part of a clause after `STATE :`.
fn parse_clause(cursor: &mut Cursor<'_>) -> Result<Clause, ParseError> {
    let keyword = cursor.next_token();
    let span = cursor.span();

    match keyword.token {
        Token::Ident("entry" | "entering") => Ok(Clause::Entry(parse_action(cursor.rest(), span)?)),
        Token::Ident("exit" | "leaving") => Ok(Clause::Exit(parse_action(cursor.rest(), span)?)),
        Token::Ident("do" | "activity") => {
            Ok(Clause::Activity(parse_action(cursor.rest(), span)?))
        }
        Token::Ident("comment") => Ok(Clause::Comment(parse_optional_action(
            cursor.rest(),
            span,
        )?)),
        Token::Ident("on" | "event") => {
            let label = parse_event_label(cursor.rest(), span)?;
            let Label {
                event,
                guard,
                action,
            } = label;
            match event {
                Some(event) => Ok(Clause::OnEvent {
                    event,
                    guard,
                    action,
                }),
                None => Err(ParseError::new(span, "an event name", "nothing")),
            }
        }
        other => Err(ParseError::new(
            keyword.span,
            "one of 'entry', 'exit', 'on', 'do', 'comment'",
            other.display_name(),
        )),
    }
}
