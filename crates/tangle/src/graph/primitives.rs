//! Constructors for the atomic matchers.
//!
//! Each primitive either consumes a slice of input and yields a leaf holding
//! it, or fails at the cursor naming itself as the expected item.

use super::{Graph, ParserId, ParserKind, Pattern, PatternError, Predicate};

impl Graph {
    /// Matches any single character.
    pub fn any(&mut self) -> ParserId {
        self.insert(ParserKind::Any)
    }

    /// Matches exactly `c`.
    pub fn char(&mut self, c: char) -> ParserId {
        self.insert(ParserKind::Char(c))
    }

    /// Matches a character between `lo` and `hi`, inclusive.
    pub fn range(&mut self, lo: char, hi: char) -> ParserId {
        self.insert(ParserKind::Range(lo, hi))
    }

    /// Matches any character contained in `set`.
    pub fn one_of(&mut self, set: impl Into<String>) -> ParserId {
        self.insert(ParserKind::OneOf(set.into()))
    }

    /// Matches any character not contained in `set`.
    pub fn none_of(&mut self, set: impl Into<String>) -> ParserId {
        self.insert(ParserKind::NoneOf(set.into()))
    }

    /// Matches the string `text`.
    pub fn literal(&mut self, text: impl Into<String>) -> ParserId {
        self.insert(ParserKind::Literal(text.into()))
    }

    /// Matches a character accepted by `predicate`.
    ///
    /// `description` is what a failure reports as expected.
    pub fn satisfy(
        &mut self,
        description: impl Into<String>,
        predicate: impl Fn(char) -> bool + Send + Sync + 'static,
    ) -> ParserId {
        self.insert(ParserKind::Satisfy {
            description: description.into(),
            predicate: Predicate::new(predicate),
        })
    }

    /// Matches the regular expression `source` anchored at the cursor.
    ///
    /// # Errors
    ///
    /// Returns a [`PatternError`] if `source` does not compile.
    pub fn pattern(&mut self, source: &str) -> Result<ParserId, PatternError> {
        let pattern = Pattern::new(source)?;
        Ok(self.insert(ParserKind::Pattern(pattern)))
    }

    /// Matches an already compiled [`Pattern`].
    pub fn compiled_pattern(&mut self, pattern: Pattern) -> ParserId {
        self.insert(ParserKind::Pattern(pattern))
    }

    /// Matches at offset 0 without consuming.
    pub fn start_of_input(&mut self) -> ParserId {
        self.insert(ParserKind::StartOfInput)
    }

    /// Matches at the end of the input without consuming.
    pub fn end_of_input(&mut self) -> ParserId {
        self.insert(ParserKind::EndOfInput)
    }

    /// Always succeeds with the empty node.
    pub fn pass(&mut self) -> ParserId {
        self.insert(ParserKind::Pass)
    }

    /// Always fails with `message`.
    pub fn fail(&mut self, message: impl Into<String>) -> ParserId {
        self.insert(ParserKind::Fail(message.into()))
    }

    /// Matches one ASCII or Unicode whitespace character.
    pub fn whitespace(&mut self) -> ParserId {
        self.satisfy("whitespace", char::is_whitespace)
    }

    /// Matches one decimal digit.
    pub fn digit(&mut self) -> ParserId {
        self.satisfy("digit", |c| c.is_ascii_digit())
    }

    /// Matches one alphabetic character.
    pub fn alpha(&mut self) -> ParserId {
        self.satisfy("letter", char::is_alphabetic)
    }
}
