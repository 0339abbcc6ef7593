//! Running a parser graph against input.
//!
//! Matching is a plain recursive descent over the graph. Every parser
//! records its start position and restores it on failure, so the combinators
//! only have to decide how to compose their operands' results.
//!
//! Repetition and optional parsers succeed by giving up on a failed attempt.
//! When such an attempt had already consumed input its error is kept aside,
//! and a run that fails reports whichever got further: that error or the
//! final one.
//!
//! Nesting is bounded by [`Graph::max_depth`]. Passing it fails the whole
//! run, whatever alternatives or repetitions would otherwise recover.

use crate::ast::AstNode;
use crate::error::{ParseError, ParseResult};
use crate::graph::{Graph, Mapping, Node, ParserId, ParserKind};
use crate::state::{ParseState, Position};

impl Graph {
    /// Runs `parser` against `input`.
    ///
    /// The parser does not have to consume the whole input; put an
    /// [end-of-input](Graph::end_of_input) parser at the end of the grammar
    /// when it should. Input nested deeper than [`Graph::max_depth`] parser
    /// calls fails with a failure message.
    ///
    /// # Panics
    ///
    /// Panics if `parser`, or a parser reachable from it, has been released.
    pub fn run(&self, parser: ParserId, input: &str) -> ParseResult {
        log::trace!("running {} over {} bytes", self.describe(parser), input.len());
        let mut state = ParseState::new(input);
        let mut runner = Runner {
            graph: self,
            abandoned: None,
            depth: 0,
            too_deep: None,
        };
        let result = runner.parse(parser, &mut state);
        if let Some(err) = runner.too_deep {
            return Err(err);
        }
        match result {
            Ok(ast) => Ok(ast),
            Err(err) => Err(match runner.abandoned {
                Some(abandoned) => err.merge(abandoned),
                None => err,
            }),
        }
    }
}

struct Runner<'g> {
    graph: &'g Graph,
    /// Furthest error of an attempt given up on after partial progress.
    abandoned: Option<ParseError>,
    depth: usize,
    /// Set once nesting passes the limit; every later call fails with it.
    too_deep: Option<ParseError>,
}

impl Runner<'_> {
    fn abandon(&mut self, attempt: Position, err: ParseError) {
        if err.position().offset <= attempt.offset {
            return;
        }
        self.abandoned = Some(match self.abandoned.take() {
            Some(previous) => previous.merge(err),
            None => err,
        });
    }

    /// Runs `id` with abandoned errors scoped to it, then forgets them.
    fn isolated(&mut self, id: ParserId, state: &mut ParseState<'_>) -> ParseResult {
        let outer = self.abandoned.take();
        let result = self.parse(id, state);
        self.abandoned = outer;
        result
    }

    fn parse(&mut self, id: ParserId, state: &mut ParseState<'_>) -> ParseResult {
        if let Some(err) = &self.too_deep {
            return Err(err.clone());
        }
        if self.depth >= self.graph.max_depth() {
            return Err(self.stop(state));
        }
        self.depth += 1;
        let result = self.enter(id, state);
        self.depth -= 1;
        result
    }

    #[cold]
    #[inline(never)]
    fn stop(&mut self, state: &ParseState<'_>) -> ParseError {
        log::debug!("run stopped at nesting depth {}", self.depth);
        let err = ParseError::failure(
            state.position(),
            format!("input nests deeper than {} parsers", self.graph.max_depth()),
            state.peek(),
        );
        self.too_deep = Some(err.clone());
        err
    }

    fn enter(&mut self, id: ParserId, state: &mut ParseState<'_>) -> ParseResult {
        let node = self.graph.live_node(id);
        let start = state.position();
        match self.parse_node(node, state) {
            Ok(ast) => Ok(match node.name() {
                Some(name) => ast.tagged(name),
                None => ast,
            }),
            Err(err) => {
                state.restore(start);
                Err(err)
            }
        }
    }

    fn parse_node(&mut self, node: &Node, state: &mut ParseState<'_>) -> ParseResult {
        match node.kind() {
            ParserKind::Sequence(parsers) => self.sequence(parsers, state),
            ParserKind::Alternation(parsers) => self.alternation(parsers, state),
            ParserKind::Repetition { parser, min, max } => {
                self.repeat(*parser, *min, *max, state)
            }
            ParserKind::Optional(parser) => self.optional(*parser, state),
            ParserKind::Lookahead { parser, negate } => self.lookahead(*parser, *negate, state),
            ParserKind::Transform { parser, mapping } => self.transform(*parser, mapping, state),
            ParserKind::Token(parser) => self.token(*parser, state),
            ParserKind::Expect { parser, label } => self.expect(*parser, label, state),
            ParserKind::Rule(Some(body)) => self.parse(*body, state),
            ParserKind::Rule(None) => Err(undefined(node, state)),
            kind => terminal(kind, state),
        }
    }

    fn sequence(&mut self, parsers: &[ParserId], state: &mut ParseState<'_>) -> ParseResult {
        let start = state.position();
        let mut children = Vec::with_capacity(parsers.len());
        for &parser in parsers {
            children.push(self.parse(parser, state)?);
        }
        Ok(AstNode::branch(children, start))
    }

    fn alternation(&mut self, parsers: &[ParserId], state: &mut ParseState<'_>) -> ParseResult {
        let mut error: Option<ParseError> = None;
        for &parser in parsers {
            match self.parse(parser, state) {
                Ok(ast) => return Ok(ast),
                Err(err) => {
                    error = Some(match error {
                        Some(previous) => previous.merge(err),
                        None => err,
                    });
                }
            }
        }
        Err(error.unwrap_or_else(|| ParseError::unexpected(state.position(), state.peek())))
    }

    fn optional(&mut self, parser: ParserId, state: &mut ParseState<'_>) -> ParseResult {
        let start = state.position();
        match self.parse(parser, state) {
            Ok(ast) => Ok(ast),
            Err(err) => {
                self.abandon(start, err);
                Ok(AstNode::empty(start))
            }
        }
    }

    fn lookahead(
        &mut self,
        parser: ParserId,
        negate: bool,
        state: &mut ParseState<'_>,
    ) -> ParseResult {
        let start = state.position();
        let outcome = self.isolated(parser, state);
        state.restore(start);
        match (outcome, negate) {
            (Ok(_), false) | (Err(_), true) => Ok(AstNode::empty(start)),
            (Err(err), false) => Err(err),
            (Ok(_), true) => Err(ParseError::expected(
                start,
                format!("not {}", self.graph.describe(parser)),
                state.peek(),
            )),
        }
    }

    fn transform(
        &mut self,
        parser: ParserId,
        mapping: &Mapping,
        state: &mut ParseState<'_>,
    ) -> ParseResult {
        self.parse(parser, state).map(|ast| mapping.apply(ast))
    }

    fn token(&mut self, parser: ParserId, state: &mut ParseState<'_>) -> ParseResult {
        let start = state.position();
        self.parse(parser, state)?;
        Ok(AstNode::leaf(state.since(start), start))
    }

    fn expect(&mut self, parser: ParserId, label: &str, state: &mut ParseState<'_>) -> ParseResult {
        let start = state.position();
        let found = state.peek();
        self.isolated(parser, state)
            .map_err(|_| ParseError::expected(start, label, found))
    }

    fn repeat(
        &mut self,
        parser: ParserId,
        min: usize,
        max: Option<usize>,
        state: &mut ParseState<'_>,
    ) -> ParseResult {
        let start = state.position();
        let mut children = Vec::new();
        let mut stalled = false;
        let mut last_error = None;

        while max.is_none_or(|max| children.len() < max) {
            let before = state.position();
            match self.parse(parser, state) {
                Ok(ast) => {
                    let empty = state.position() == before;
                    children.push(ast);
                    if max.is_none() && empty {
                        // Every further iteration would match the same empty span
                        stalled = true;
                        break;
                    }
                }
                Err(err) => {
                    last_error = Some((before, err));
                    break;
                }
            }
        }

        if stalled {
            if let Some(again) = children.last().cloned() {
                children.resize(min.max(children.len()), again);
            }
        }
        if children.len() >= min {
            if let Some((attempt, err)) = last_error {
                self.abandon(attempt, err);
            }
            Ok(AstNode::branch(children, start))
        } else {
            Err(last_error.map_or_else(
                || ParseError::unexpected(start, state.peek()),
                |(_, err)| err,
            ))
        }
    }
}

/// Matches a parser that has no operands.
fn terminal(kind: &ParserKind, state: &mut ParseState<'_>) -> ParseResult {
    let start = state.position();
    let found = state.peek();
    let expected = || ParseError::expected(start, kind.expectation().unwrap_or_default(), found);

    match kind {
        ParserKind::Any => match found {
            Some(c) => Ok(consume_char(state, c)),
            None => Err(expected()),
        },
        ParserKind::Char(want) => match_char(state, |c| c == *want).ok_or_else(expected),
        ParserKind::Range(lo, hi) => {
            match_char(state, |c| (*lo..=*hi).contains(&c)).ok_or_else(expected)
        }
        ParserKind::OneOf(set) => match_char(state, |c| set.contains(c)).ok_or_else(expected),
        ParserKind::NoneOf(set) => match_char(state, |c| !set.contains(c)).ok_or_else(expected),
        ParserKind::Satisfy { predicate, .. } => {
            match_char(state, |c| predicate.test(c)).ok_or_else(expected)
        }
        ParserKind::Literal(text) => {
            if state.rest().starts_with(text.as_str()) {
                Ok(AstNode::leaf(state.consume(text.len()), start))
            } else {
                Err(expected())
            }
        }
        ParserKind::Pattern(pattern) => match pattern.match_at(state.input(), start.offset) {
            Some(end) => Ok(AstNode::leaf(state.consume(end - start.offset), start)),
            None => Err(expected()),
        },
        ParserKind::StartOfInput => {
            if state.at_start() {
                Ok(AstNode::leaf("", start))
            } else {
                Err(expected())
            }
        }
        ParserKind::EndOfInput => {
            if state.at_end() {
                Ok(AstNode::leaf("", start))
            } else {
                Err(expected())
            }
        }
        ParserKind::Pass => Ok(AstNode::empty(start)),
        ParserKind::Fail(message) => Err(ParseError::failure(start, message, found)),
        _ => unreachable!("{} has operands", kind.kind_name()),
    }
}

fn undefined(node: &Node, state: &ParseState<'_>) -> ParseError {
    ParseError::failure(
        state.position(),
        format!("rule <{}> is undefined", node.name().unwrap_or_default()),
        state.peek(),
    )
}

fn match_char(state: &mut ParseState<'_>, accept: impl FnOnce(char) -> bool) -> Option<AstNode> {
    let c = state.peek().filter(|&c| accept(c))?;
    Some(consume_char(state, c))
}

fn consume_char(state: &mut ParseState<'_>, c: char) -> AstNode {
    let start = state.position();
    AstNode::leaf(state.consume(c.len_utf8()), start)
}
