//! Input cursor used while a parser graph runs.
//!
//! A [`Position`] is a cheap `Copy` snapshot. Every parser records the
//! position it started at and restores it when it fails, which is all the
//! backtracking the engine needs.

use std::fmt;

/// A location in the input.
///
/// `offset` is a byte offset into the input string. `line` and `column` are
/// 1-based and count characters, so they can be printed directly in
/// diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    /// Byte offset from the start of the input.
    pub offset: usize,
    /// Line number, starting at 1.
    pub line: usize,
    /// Column number in characters, starting at 1.
    pub column: usize,
}

impl Position {
    /// The position of the first character of any input.
    pub const START: Position = Position {
        offset: 0,
        line: 1,
        column: 1,
    };

    /// Returns the position just after `c`.
    #[must_use]
    pub fn advance(self, c: char) -> Position {
        if c == '\n' {
            Position {
                offset: self.offset + c.len_utf8(),
                line: self.line + 1,
                column: 1,
            }
        } else {
            Position {
                offset: self.offset + c.len_utf8(),
                line: self.line,
                column: self.column + 1,
            }
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Position::START
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Cursor over the input of a single run.
#[derive(Debug, Clone)]
pub(crate) struct ParseState<'i> {
    input: &'i str,
    position: Position,
}

impl<'i> ParseState<'i> {
    pub(crate) fn new(input: &'i str) -> Self {
        ParseState {
            input,
            position: Position::START,
        }
    }

    pub(crate) fn input(&self) -> &'i str {
        self.input
    }

    pub(crate) fn position(&self) -> Position {
        self.position
    }

    pub(crate) fn restore(&mut self, position: Position) {
        self.position = position;
    }

    /// Unconsumed remainder of the input.
    pub(crate) fn rest(&self) -> &'i str {
        &self.input[self.position.offset..]
    }

    pub(crate) fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    pub(crate) fn at_start(&self) -> bool {
        self.position.offset == 0
    }

    pub(crate) fn at_end(&self) -> bool {
        self.position.offset >= self.input.len()
    }

    /// Consumes `len` bytes and returns the consumed slice.
    ///
    /// `len` must end on a character boundary.
    pub(crate) fn consume(&mut self, len: usize) -> &'i str {
        let start = self.position.offset;
        let taken = &self.input[start..start + len];
        self.position = taken.chars().fold(self.position, Position::advance);
        taken
    }

    /// Input consumed since `start`.
    pub(crate) fn since(&self, start: Position) -> &'i str {
        &self.input[start.offset..self.position.offset]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_tracks_lines_and_columns() {
        let pos = "ab\ncd"
            .chars()
            .fold(Position::START, Position::advance);
        assert_eq!(pos.offset, 5);
        assert_eq!(pos.line, 2);
        assert_eq!(pos.column, 3);
    }

    #[test]
    fn test_offsets_are_bytes_and_columns_are_chars() {
        let mut state = ParseState::new("é!");
        let taken = state.consume('é'.len_utf8());
        assert_eq!(taken, "é");
        assert_eq!(state.position().offset, 2);
        assert_eq!(state.position().column, 2);
        assert_eq!(state.peek(), Some('!'));
    }

    #[test]
    fn test_restore_rewinds_cursor() {
        let mut state = ParseState::new("hello");
        let mark = state.position();
        state.consume(3);
        assert_eq!(state.since(mark), "hel");
        state.restore(mark);
        assert!(state.at_start());
        assert_eq!(state.rest(), "hello");
    }
}
