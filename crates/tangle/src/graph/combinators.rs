//! Constructors that compose parsers into larger ones.

use super::{Graph, Mapping, ParserId, ParserKind};
use crate::ast::AstNode;

impl Graph {
    /// Runs `parsers` one after another; the result's children are their
    /// results in order.
    pub fn sequence(&mut self, parsers: &[ParserId]) -> ParserId {
        self.insert(ParserKind::Sequence(parsers.to_vec()))
    }

    /// Tries `parsers` in order at the same position and returns the first
    /// success.
    ///
    /// When every branch fails, the branch errors are merged. A failed run
    /// can still report a position past all of them: an optional or
    /// repetition inside a branch that consumed input before giving up is
    /// reported if it got further.
    pub fn alternation(&mut self, parsers: &[ParserId]) -> ParserId {
        self.insert(ParserKind::Alternation(parsers.to_vec()))
    }

    /// Applies `parser` greedily between `min` and `max` times.
    ///
    /// Without `max`, repetition stops once `parser` matches without
    /// consuming input; that empty match counts as often as needed to
    /// reach `min`.
    ///
    /// # Panics
    ///
    /// Panics if `max` is below `min`.
    pub fn repetition(&mut self, parser: ParserId, min: usize, max: Option<usize>) -> ParserId {
        if let Some(max) = max {
            assert!(min <= max, "repetition bounds {min}..{max} are inverted");
        }
        self.insert(ParserKind::Repetition { parser, min, max })
    }

    /// Zero or more matches.
    pub fn many(&mut self, parser: ParserId) -> ParserId {
        self.repetition(parser, 0, None)
    }

    /// One or more matches.
    pub fn many1(&mut self, parser: ParserId) -> ParserId {
        self.repetition(parser, 1, None)
    }

    /// Exactly `n` matches.
    pub fn count(&mut self, parser: ParserId, n: usize) -> ParserId {
        self.repetition(parser, n, Some(n))
    }

    /// Matches `parser` or nothing; never fails.
    pub fn optional(&mut self, parser: ParserId) -> ParserId {
        self.insert(ParserKind::Optional(parser))
    }

    /// Succeeds where `parser` would, without consuming input.
    pub fn lookahead(&mut self, parser: ParserId) -> ParserId {
        self.insert(ParserKind::Lookahead {
            parser,
            negate: false,
        })
    }

    /// Succeeds where `parser` would fail, without consuming input.
    pub fn not(&mut self, parser: ParserId) -> ParserId {
        self.insert(ParserKind::Lookahead {
            parser,
            negate: true,
        })
    }

    /// Rewrites the tree produced by `parser` with `mapping`.
    pub fn transform(
        &mut self,
        parser: ParserId,
        mapping: impl Fn(AstNode) -> AstNode + Send + Sync + 'static,
    ) -> ParserId {
        self.insert(ParserKind::Transform {
            parser,
            mapping: Mapping::new(mapping),
        })
    }

    /// Replaces the tree produced by `parser` with one leaf holding the text
    /// it consumed.
    pub fn token(&mut self, parser: ParserId) -> ParserId {
        self.insert(ParserKind::Token(parser))
    }

    /// Reports failures of `parser` as expecting `label`.
    pub fn expect(&mut self, parser: ParserId, label: impl Into<String>) -> ParserId {
        self.insert(ParserKind::Expect {
            parser,
            label: label.into(),
        })
    }

    /// Runs `parser` and discards its tree.
    pub fn skip(&mut self, parser: ParserId) -> ParserId {
        self.transform(parser, |node| AstNode::empty(node.position()))
    }

    /// Runs `parser` followed by any amount of whitespace, keeping only
    /// `parser`'s tree.
    pub fn lexeme(&mut self, parser: ParserId) -> ParserId {
        let space = self.whitespace();
        let spaces = self.many(space);
        let both = self.sequence(&[parser, spaces]);
        self.transform(both, AstNode::into_first)
    }
}

#[cfg(test)]
mod tests {
    use crate::graph::Graph;

    #[test]
    fn test_sequence_collects_children_in_order() {
        let mut graph = Graph::new();
        let a = graph.char('a');
        let b = graph.char('b');
        let ab = graph.sequence(&[a, b]);
        let node = graph.run(ab, "ab").unwrap();
        assert_eq!(node.children_num(), 2);
        assert_eq!(node.child(0).contents(), "a");
        assert_eq!(node.child(1).contents(), "b");
        assert_eq!(node.contents(), "");
    }

    #[test]
    fn test_sequence_propagates_first_failure() {
        let mut graph = Graph::new();
        let a = graph.char('a');
        let b = graph.char('b');
        let ab = graph.sequence(&[a, b]);
        let err = graph.run(ab, "ax").unwrap_err();
        assert_eq!(err.position().offset, 1);
        assert!(err.expects("'b'"));
    }

    #[test]
    fn test_alternation_returns_first_success() {
        let mut graph = Graph::new();
        let a = graph.literal("ab");
        let b = graph.literal("a");
        let either = graph.alternation(&[a, b]);
        assert_eq!(graph.run(either, "ab").unwrap().contents(), "ab");
        assert_eq!(graph.run(either, "ac").unwrap().contents(), "a");
    }

    #[test]
    fn test_alternation_reports_furthest_failure() {
        let mut graph = Graph::new();
        let a = graph.char('a');
        let b = graph.char('b');
        let ab = graph.sequence(&[a, b]);
        let c = graph.char('c');
        let either = graph.alternation(&[ab, c]);
        let err = graph.run(either, "ax").unwrap_err();
        assert_eq!(err.position().offset, 1);
        assert_eq!(err.expected_items().collect::<Vec<_>>(), vec!["'b'"]);
    }

    #[test]
    fn test_empty_alternation_fails() {
        let mut graph = Graph::new();
        let none = graph.alternation(&[]);
        let err = graph.run(none, "x").unwrap_err();
        assert_eq!(err.expected_items().count(), 0);
    }

    #[test]
    fn test_repetition_bounds() {
        let mut graph = Graph::new();
        let x = graph.char('x');
        let two_to_four = graph.repetition(x, 2, Some(4));
        assert!(graph.run(two_to_four, "x").is_err());
        assert_eq!(graph.run(two_to_four, "xx").unwrap().children_num(), 2);
        assert_eq!(graph.run(two_to_four, "xxxxxx").unwrap().children_num(), 4);
    }

    #[test]
    #[should_panic(expected = "inverted")]
    fn test_inverted_repetition_bounds_panic() {
        let mut graph = Graph::new();
        let x = graph.char('x');
        let _ = graph.repetition(x, 3, Some(1));
    }

    #[test]
    fn test_count_requires_exact_matches() {
        let mut graph = Graph::new();
        let digit = graph.digit();
        let three = graph.count(digit, 3);
        assert!(graph.run(three, "12").is_err());
        assert_eq!(graph.run(three, "1234").unwrap().children_num(), 3);
    }

    #[test]
    fn test_optional_yields_empty_node() {
        let mut graph = Graph::new();
        let sign = graph.char('-');
        let maybe = graph.optional(sign);
        assert_eq!(graph.run(maybe, "-1").unwrap().contents(), "-");
        assert!(graph.run(maybe, "1").unwrap().is_empty());
    }

    #[test]
    fn test_lookahead_does_not_consume() {
        let mut graph = Graph::new();
        let a = graph.char('a');
        let peek = graph.lookahead(a);
        let both = graph.sequence(&[peek, a]);
        let node = graph.run(both, "a").unwrap();
        assert!(node.child(0).is_empty());
        assert_eq!(node.child(1).contents(), "a");
    }

    #[test]
    fn test_not_inverts_outcome() {
        let mut graph = Graph::new();
        let a = graph.char('a');
        let not_a = graph.not(a);
        assert!(graph.run(not_a, "b").unwrap().is_empty());
        let err = graph.run(not_a, "a").unwrap_err();
        assert_eq!(err.position().offset, 0);
        assert!(err.expects("not 'a'"));
    }

    #[test]
    fn test_transform_reshapes_tree() {
        let mut graph = Graph::new();
        let open = graph.char('(');
        let x = graph.char('x');
        let close = graph.char(')');
        let group = graph.sequence(&[open, x, close]);
        let inner = graph.transform(group, |node| node.into_children().swap_remove(1));
        let node = graph.run(inner, "(x)").unwrap();
        assert_eq!(node.contents(), "x");
    }

    #[test]
    fn test_token_returns_consumed_text() {
        let mut graph = Graph::new();
        let digit = graph.digit();
        let digits = graph.many1(digit);
        let number = graph.token(digits);
        let node = graph.run(number, "123+").unwrap();
        assert!(node.is_leaf());
        assert_eq!(node.contents(), "123");
    }

    #[test]
    fn test_expect_relabels_failure() {
        let mut graph = Graph::new();
        let digit = graph.digit();
        let digits = graph.many1(digit);
        let number = graph.expect(digits, "number");
        let err = graph.run(number, "x").unwrap_err();
        assert_eq!(err.expected_items().collect::<Vec<_>>(), vec!["number"]);
    }

    #[test]
    fn test_lexeme_skips_trailing_whitespace() {
        let mut graph = Graph::new();
        let a = graph.char('a');
        let b = graph.char('b');
        let a = graph.lexeme(a);
        let ab = graph.sequence(&[a, b]);
        let node = graph.run(ab, "a  \n b").unwrap();
        assert_eq!(node.child(0).contents(), "a");
        assert_eq!(node.child(1).contents(), "b");
    }

    #[test]
    fn test_named_parser_tags_its_result() {
        let mut graph = Graph::new();
        let digit = graph.digit();
        let digits = graph.many1(digit);
        let token = graph.token(digits);
        let number = graph.named(token, "number");
        let node = graph.run(number, "42").unwrap();
        assert_eq!(node.tag(), "number");
        assert_eq!(node.contents(), "42");
    }
}
