//! Structured match failures.
//!
//! A [`ParseError`] is always a returned value. Combinators compose the
//! errors of their operands with [`ParseError::merge`]: the failure that got
//! furthest into the input wins, and failures at the same position pool
//! their expected items.

use std::collections::BTreeSet;

use facet::Facet;
use thiserror::Error;

use crate::ast::AstNode;
use crate::state::Position;

/// Outcome of running a parser: a tree on success, an error on failure.
pub type ParseResult = Result<AstNode, ParseError>;

/// A failed match.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{position}: error: {}", summarize(.expected, .found, .failure))]
pub struct ParseError {
    position: Position,
    expected: BTreeSet<String>,
    found: Option<char>,
    failure: Option<String>,
}

/// Serialisable view of a [`ParseError`].
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct ErrorReport {
    /// Byte offset of the failure.
    pub offset: usize,
    /// Line of the failure.
    pub line: usize,
    /// Column of the failure.
    pub column: usize,
    /// Expected items, sorted.
    pub expected: Vec<String>,
    /// The character found, absent at end of input.
    pub found: Option<String>,
    /// Full human-readable message.
    pub message: String,
}

impl ParseError {
    /// A failure at `position` expecting a single item.
    #[must_use]
    pub fn expected(position: Position, item: impl Into<String>, found: Option<char>) -> Self {
        ParseError {
            position,
            expected: BTreeSet::from([item.into()]),
            found,
            failure: None,
        }
    }

    /// A failure at `position` that expects nothing in particular.
    #[must_use]
    pub fn unexpected(position: Position, found: Option<char>) -> Self {
        ParseError {
            position,
            expected: BTreeSet::new(),
            found,
            failure: None,
        }
    }

    /// A failure carrying an explicit message instead of expected items.
    #[must_use]
    pub fn failure(position: Position, message: impl Into<String>, found: Option<char>) -> Self {
        ParseError {
            position,
            expected: BTreeSet::new(),
            found,
            failure: Some(message.into()),
        }
    }

    /// Where the failure happened.
    #[must_use]
    pub fn position(&self) -> Position {
        self.position
    }

    /// The expected items, sorted.
    pub fn expected_items(&self) -> impl Iterator<Item = &str> {
        self.expected.iter().map(String::as_str)
    }

    /// Returns `true` if `item` is among the expected items.
    #[must_use]
    pub fn expects(&self, item: &str) -> bool {
        self.expected.contains(item)
    }

    /// The character at the failure position, `None` at end of input.
    #[must_use]
    pub fn found(&self) -> Option<char> {
        self.found
    }

    /// Explicit failure message, if any.
    #[must_use]
    pub fn failure_message(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Combines the failures of two alternatives.
    ///
    /// The error from the furthest position is kept. At equal positions the
    /// expected sets are unioned and the first failure message is kept.
    #[must_use]
    pub fn merge(self, other: ParseError) -> ParseError {
        match self.position.offset.cmp(&other.position.offset) {
            std::cmp::Ordering::Greater => self,
            std::cmp::Ordering::Less => other,
            std::cmp::Ordering::Equal => {
                let mut merged = self;
                merged.expected.extend(other.expected);
                if merged.failure.is_none() {
                    merged.failure = other.failure;
                }
                merged
            }
        }
    }

    /// Serialisable view of this error.
    #[must_use]
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            offset: self.position.offset,
            line: self.position.line,
            column: self.position.column,
            expected: self.expected.iter().cloned().collect(),
            found: self.found.map(String::from),
            message: self.to_string(),
        }
    }

    /// Serialises [`ParseError::report`] as JSON.
    #[must_use]
    pub fn to_json(&self) -> String {
        facet_json::to_string(&self.report())
    }
}

#[allow(clippy::ref_option)]
fn summarize(
    expected: &BTreeSet<String>,
    found: &Option<char>,
    failure: &Option<String>,
) -> String {
    let found = match found {
        Some(c) => format!("'{}'", c.escape_debug()),
        None => "end of input".to_string(),
    };
    if let Some(message) = failure {
        return message.clone();
    }
    let items: Vec<&str> = expected.iter().map(String::as_str).collect();
    match items.as_slice() {
        [] => format!("unexpected {found}"),
        [only] => format!("expected {only} at {found}"),
        [init @ .., last] => format!("expected {} or {last} at {found}", init.join(", ")),
    }
}
