//! The parser graph.
//!
//! Parsers live in a [`Graph`] arena and refer to each other through
//! copyable [`ParserId`] handles. A parser may be shared by any number of
//! parents and may reach itself through a [rule](Graph::rule) placeholder,
//! so the graph is a general directed graph. Nobody owns a node except the
//! arena; nodes leave it only through [`Graph::cleanup`].
//!
//! Ids carry a generation. Once a node has been released its id goes stale,
//! and any later use of it is reported as a contract violation instead of
//! silently reaching whatever node reused the slot.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use regex_automata::{meta, Anchored, Input};
use thiserror::Error;

use crate::ast::AstNode;

mod combinators;
mod lifecycle;
mod primitives;

/// Handle to a parser node inside a [`Graph`].
///
/// Ids carry a generation, so one kept past [`Graph::cleanup`] is caught
/// rather than read through. They do not record which graph issued them:
/// an id used with another graph refers to whatever that graph holds in
/// the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParserId {
    index: usize,
    generation: u32,
}

impl fmt::Display for ParserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

/// Character predicate used by [`ParserKind::Satisfy`].
#[derive(Clone)]
pub struct Predicate(Arc<dyn Fn(char) -> bool + Send + Sync>);

impl Predicate {
    /// Wraps a predicate function.
    pub fn new(f: impl Fn(char) -> bool + Send + Sync + 'static) -> Self {
        Predicate(Arc::new(f))
    }

    /// Applies the predicate.
    #[must_use]
    pub fn test(&self, c: char) -> bool {
        (self.0)(c)
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Predicate(..)")
    }
}

/// Tree rewrite used by [`ParserKind::Transform`].
#[derive(Clone)]
pub struct Mapping(Arc<dyn Fn(AstNode) -> AstNode + Send + Sync>);

impl Mapping {
    /// Wraps a mapping function.
    pub fn new(f: impl Fn(AstNode) -> AstNode + Send + Sync + 'static) -> Self {
        Mapping(Arc::new(f))
    }

    /// Applies the mapping.
    #[must_use]
    pub fn apply(&self, node: AstNode) -> AstNode {
        (self.0)(node)
    }
}

impl fmt::Debug for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Mapping(..)")
    }
}

/// A regular expression matched anchored at the cursor.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: meta::Regex,
    min_len: Option<usize>,
}

/// A regular expression that could not be compiled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid pattern /{pattern}/: {message}")]
pub struct PatternError {
    /// The offending pattern source.
    pub pattern: String,
    /// Why it was rejected.
    pub message: String,
}

impl Pattern {
    /// Compiles `source`.
    ///
    /// # Errors
    ///
    /// Returns a [`PatternError`] if `source` is not a valid regular
    /// expression.
    pub fn new(source: &str) -> Result<Self, PatternError> {
        let invalid = |message: String| PatternError {
            pattern: source.to_string(),
            message,
        };
        let hir = regex_syntax::parse(source).map_err(|e| invalid(e.to_string()))?;
        let regex = meta::Regex::new(source).map_err(|e| invalid(e.to_string()))?;
        Ok(Pattern {
            source: source.to_string(),
            regex,
            min_len: hir.properties().minimum_len(),
        })
    }

    /// The pattern source, without delimiters.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns `true` if the pattern can match without consuming input.
    #[must_use]
    pub fn is_nullable(&self) -> bool {
        self.min_len == Some(0)
    }

    /// End offset of a match starting exactly at `offset`.
    ///
    /// Look-around assertions such as `^` and `$` see the whole of `input`.
    pub(crate) fn match_at(&self, input: &str, offset: usize) -> Option<usize> {
        let search = Input::new(input).range(offset..).anchored(Anchored::Yes);
        self.regex.search(&search).map(|m| m.end())
    }
}

/// What a parser node does, with its operands.
#[derive(Debug, Clone)]
pub enum ParserKind {
    /// Any single character.
    Any,
    /// Exactly this character.
    Char(char),
    /// A character in the inclusive range.
    Range(char, char),
    /// Any character of the set.
    OneOf(String),
    /// Any character outside the set.
    NoneOf(String),
    /// Exactly this string.
    Literal(String),
    /// A character accepted by the predicate.
    Satisfy {
        /// Description used as the expected item.
        description: String,
        /// The predicate.
        predicate: Predicate,
    },
    /// A regular expression anchored at the cursor.
    Pattern(Pattern),
    /// Zero-width match at the very start of the input.
    StartOfInput,
    /// Zero-width match at the end of the input.
    EndOfInput,
    /// Always succeeds without consuming.
    Pass,
    /// Always fails with this message.
    Fail(String),
    /// Operands in order, all of which must match.
    Sequence(Vec<ParserId>),
    /// Operands tried in order until one matches.
    Alternation(Vec<ParserId>),
    /// Greedy repetition.
    Repetition {
        /// The repeated parser.
        parser: ParserId,
        /// Minimum number of matches.
        min: usize,
        /// Maximum number of matches, unbounded when `None`.
        max: Option<usize>,
    },
    /// Zero or one match, never failing.
    Optional(ParserId),
    /// Zero-width test of the operand.
    Lookahead {
        /// The tested parser.
        parser: ParserId,
        /// Succeed when the operand fails instead.
        negate: bool,
    },
    /// The operand's tree rewritten by a mapping.
    Transform {
        /// The wrapped parser.
        parser: ParserId,
        /// The rewrite.
        mapping: Mapping,
    },
    /// The operand's consumed text as a single leaf.
    Token(ParserId),
    /// The operand with its failures reported as `label`.
    Expect {
        /// The wrapped parser.
        parser: ParserId,
        /// Replacement expected item.
        label: String,
    },
    /// A named placeholder, patched by [`Graph::define`].
    Rule(Option<ParserId>),
}

impl ParserKind {
    /// Parsers this one refers to directly.
    #[must_use]
    pub fn operands(&self) -> Vec<ParserId> {
        match self {
            ParserKind::Sequence(parsers) | ParserKind::Alternation(parsers) => parsers.clone(),
            ParserKind::Repetition { parser, .. }
            | ParserKind::Lookahead { parser, .. }
            | ParserKind::Transform { parser, .. }
            | ParserKind::Expect { parser, .. }
            | ParserKind::Optional(parser)
            | ParserKind::Token(parser)
            | ParserKind::Rule(Some(parser)) => vec![*parser],
            ParserKind::Any
            | ParserKind::Char(_)
            | ParserKind::Range(..)
            | ParserKind::OneOf(_)
            | ParserKind::NoneOf(_)
            | ParserKind::Literal(_)
            | ParserKind::Satisfy { .. }
            | ParserKind::Pattern(_)
            | ParserKind::StartOfInput
            | ParserKind::EndOfInput
            | ParserKind::Pass
            | ParserKind::Fail(_)
            | ParserKind::Rule(None) => Vec::new(),
        }
    }

    /// Canonical name of this kind.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            ParserKind::Any => "any",
            ParserKind::Char(_) => "char",
            ParserKind::Range(..) => "range",
            ParserKind::OneOf(_) => "one_of",
            ParserKind::NoneOf(_) => "none_of",
            ParserKind::Literal(_) => "literal",
            ParserKind::Satisfy { .. } => "satisfy",
            ParserKind::Pattern(_) => "pattern",
            ParserKind::StartOfInput => "start_of_input",
            ParserKind::EndOfInput => "end_of_input",
            ParserKind::Pass => "pass",
            ParserKind::Fail(_) => "fail",
            ParserKind::Sequence(_) => "sequence",
            ParserKind::Alternation(_) => "alternation",
            ParserKind::Repetition { .. } => "repetition",
            ParserKind::Optional(_) => "optional",
            ParserKind::Lookahead { .. } => "lookahead",
            ParserKind::Transform { .. } => "transform",
            ParserKind::Token(_) => "token",
            ParserKind::Expect { .. } => "expect",
            ParserKind::Rule(_) => "rule",
        }
    }

    /// Returns `true` for kinds without parser operands.
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            ParserKind::Any
                | ParserKind::Char(_)
                | ParserKind::Range(..)
                | ParserKind::OneOf(_)
                | ParserKind::NoneOf(_)
                | ParserKind::Literal(_)
                | ParserKind::Satisfy { .. }
                | ParserKind::Pattern(_)
                | ParserKind::StartOfInput
                | ParserKind::EndOfInput
                | ParserKind::Pass
                | ParserKind::Fail(_)
        )
    }

    /// The expected item a primitive reports when it fails.
    pub(crate) fn expectation(&self) -> Option<String> {
        let text = match self {
            ParserKind::Any => "any character".to_string(),
            ParserKind::Char(c) => format!("'{}'", c.escape_debug()),
            ParserKind::Range(lo, hi) => format!(
                "character between '{}' and '{}'",
                lo.escape_debug(),
                hi.escape_debug()
            ),
            ParserKind::OneOf(set) => format!("one of \"{}\"", set.escape_debug()),
            ParserKind::NoneOf(set) => format!("none of \"{}\"", set.escape_debug()),
            ParserKind::Literal(text) => format!("\"{}\"", text.escape_debug()),
            ParserKind::Satisfy { description, .. } => description.clone(),
            ParserKind::Pattern(pattern) => format!("/{}/", pattern.source),
            ParserKind::StartOfInput => "start of input".to_string(),
            ParserKind::EndOfInput => "end of input".to_string(),
            _ => return None,
        };
        Some(text)
    }
}

/// A parser node: its kind and an optional name.
#[derive(Debug, Clone)]
pub struct Node {
    name: Option<String>,
    kind: ParserKind,
}

impl Node {
    /// The node's name, used to tag its results.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The node's kind and operands.
    #[must_use]
    pub fn kind(&self) -> &ParserKind {
        &self.kind
    }
}

/// Misuse of the graph-mutating API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The id does not refer to a live node of this graph.
    #[error("parser {0} has been released")]
    Released(ParserId),

    /// `define` was called on something other than a rule placeholder.
    #[error("parser {0} is not a rule placeholder")]
    NotARule(ParserId),

    /// `define` was called on a rule that already has a body.
    #[error("rule <{0}> is already defined")]
    AlreadyDefined(String),
}

#[derive(Debug)]
enum Slot {
    Live { generation: u32, node: Node },
    Released { generation: u32 },
}

/// Arena holding parser nodes.
///
/// Building and patching take `&mut Graph`; running takes `&Graph`. A graph
/// is therefore read-only for as long as any run borrows it, and can be
/// shared across threads once built.
#[derive(Debug)]
pub struct Graph {
    slots: Vec<Slot>,
    free: Vec<usize>,
    live: usize,
    max_depth: usize,
}

/// Default limit on how many parsers a run may nest.
pub const DEFAULT_MAX_DEPTH: usize = 256;

impl Default for Graph {
    fn default() -> Self {
        Graph {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl Graph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Graph::default()
    }

    /// Limit on nested parser calls during a run.
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Sets the limit on nested parser calls during a run.
    ///
    /// A run that nests deeper fails with a failure message instead of
    /// exhausting the thread's stack. Each level of input nesting usually
    /// costs several parser calls, so the limit bounds input nesting well
    /// below `depth`. Raise it only for threads with a larger stack.
    pub fn set_max_depth(&mut self, depth: usize) {
        self.max_depth = depth;
    }

    /// Number of live nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    /// Returns `true` if no node is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Returns `true` if `id` refers to a live node.
    #[must_use]
    pub fn contains(&self, id: ParserId) -> bool {
        self.node(id).is_some()
    }

    /// The node behind `id`, if it is still live.
    #[must_use]
    pub fn node(&self, id: ParserId) -> Option<&Node> {
        match self.slots.get(id.index) {
            Some(Slot::Live { generation, node }) if *generation == id.generation => Some(node),
            _ => None,
        }
    }

    /// Name of the node behind `id`.
    #[must_use]
    pub fn name(&self, id: ParserId) -> Option<&str> {
        self.node(id).and_then(Node::name)
    }

    /// Kind of the node behind `id`.
    #[must_use]
    pub fn kind(&self, id: ParserId) -> Option<&ParserKind> {
        self.node(id).map(Node::kind)
    }

    /// Like [`Graph::node`] for ids the caller promised are live.
    pub(crate) fn live_node(&self, id: ParserId) -> &Node {
        match self.node(id) {
            Some(node) => node,
            None => panic!("parser {id} used after cleanup"),
        }
    }

    fn node_mut(&mut self, id: ParserId) -> Result<&mut Node, GraphError> {
        match self.slots.get_mut(id.index) {
            Some(Slot::Live { generation, node }) if *generation == id.generation => Ok(node),
            _ => Err(GraphError::Released(id)),
        }
    }

    pub(crate) fn insert(&mut self, kind: ParserKind) -> ParserId {
        for operand in kind.operands() {
            let _ = self.live_node(operand);
        }
        let node = Node { name: None, kind };
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let generation = match self.slots[index] {
                Slot::Released { generation } | Slot::Live { generation, .. } => generation,
            };
            self.slots[index] = Slot::Live { generation, node };
            ParserId { index, generation }
        } else {
            self.slots.push(Slot::Live {
                generation: 0,
                node,
            });
            ParserId {
                index: self.slots.len() - 1,
                generation: 0,
            }
        }
    }

    /// Takes a single node out of the arena without touching its operands.
    pub(crate) fn release(&mut self, id: ParserId) -> Option<Node> {
        let slot = self.slots.get_mut(id.index)?;
        let generation = match slot {
            Slot::Live { generation, .. } if *generation == id.generation => *generation,
            _ => return None,
        };
        let released = Slot::Released {
            generation: generation.wrapping_add(1),
        };
        let Slot::Live { node, .. } = std::mem::replace(slot, released) else {
            return None;
        };
        self.free.push(id.index);
        self.live -= 1;
        Some(node)
    }

    /// Gives `id` a name and returns it.
    ///
    /// Results of named parsers are tagged with the name.
    ///
    /// # Panics
    ///
    /// Panics if `id` has been released.
    pub fn named(&mut self, id: ParserId, name: impl Into<String>) -> ParserId {
        match self.node_mut(id) {
            Ok(node) => node.name = Some(name.into()),
            Err(err) => panic!("{err}"),
        }
        id
    }

    /// Creates an undefined rule placeholder called `name`.
    ///
    /// The placeholder can be referenced before its body exists, which is
    /// how recursive grammars are built. Patch it with [`Graph::define`].
    pub fn rule(&mut self, name: impl Into<String>) -> ParserId {
        let id = self.insert(ParserKind::Rule(None));
        self.named(id, name)
    }

    /// Patches the placeholder `rule` with `body`.
    ///
    /// # Errors
    ///
    /// Fails if either id is stale, if `rule` is not a placeholder, or if it
    /// already has a body.
    pub fn define(&mut self, rule: ParserId, body: ParserId) -> Result<(), GraphError> {
        if !self.contains(body) {
            return Err(GraphError::Released(body));
        }
        let node = self.node_mut(rule)?;
        match node.kind {
            ParserKind::Rule(None) => {
                node.kind = ParserKind::Rule(Some(body));
                Ok(())
            }
            ParserKind::Rule(Some(_)) => Err(GraphError::AlreadyDefined(
                node.name.clone().unwrap_or_default(),
            )),
            _ => Err(GraphError::NotARule(rule)),
        }
    }

    /// Resets a placeholder to undefined.
    pub(crate) fn undefine(&mut self, rule: ParserId) {
        if let Ok(node) = self.node_mut(rule) {
            if matches!(node.kind, ParserKind::Rule(_)) {
                node.kind = ParserKind::Rule(None);
            }
        }
    }

    /// Returns `true` if `id` is a rule placeholder without a body.
    #[must_use]
    pub fn is_undefined_rule(&self, id: ParserId) -> bool {
        matches!(self.kind(id), Some(ParserKind::Rule(None)))
    }

    /// Short human-readable description of a parser.
    ///
    /// Rules print as `<name>`, other named parsers as their name, and
    /// anonymous primitives as the item they expect.
    #[must_use]
    pub fn describe(&self, id: ParserId) -> String {
        let Some(node) = self.node(id) else {
            return format!("<released {id}>");
        };
        match (&node.kind, node.name()) {
            (ParserKind::Rule(_), Some(name)) => format!("<{name}>"),
            (_, Some(name)) => name.to_string(),
            (kind, None) => kind
                .expectation()
                .unwrap_or_else(|| kind.kind_name().to_string()),
        }
    }

    /// Every live node reachable from `roots`, each listed once.
    #[must_use]
    pub fn reachable(&self, roots: &[ParserId]) -> Vec<ParserId> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut to_visit: Vec<ParserId> = roots.iter().rev().copied().collect();

        while let Some(id) = to_visit.pop() {
            let Some(node) = self.node(id) else {
                continue;
            };
            if !seen.insert(id) {
                continue; // Already visited
            }
            order.push(id);
            to_visit.extend(node.kind.operands().into_iter().rev());
        }

        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_placeholder_can_be_defined_once() {
        let mut graph = Graph::new();
        let rule = graph.rule("digit");
        assert!(graph.is_undefined_rule(rule));

        let body = graph.range('0', '9');
        graph.define(rule, body).unwrap();
        assert!(!graph.is_undefined_rule(rule));
        assert_eq!(
            graph.define(rule, body),
            Err(GraphError::AlreadyDefined("digit".to_string()))
        );
    }

    #[test]
    fn test_define_rejects_non_rules() {
        let mut graph = Graph::new();
        let a = graph.char('a');
        let b = graph.char('b');
        assert_eq!(graph.define(a, b), Err(GraphError::NotARule(a)));
    }

    #[test]
    fn test_reachable_visits_cycles_once() {
        let mut graph = Graph::new();
        let rule = graph.rule("list");
        let item = graph.char('x');
        let body = graph.sequence(&[item, rule]);
        let alt = graph.alternation(&[body, item]);
        graph.define(rule, alt).unwrap();

        let reached = graph.reachable(&[rule, rule]);
        assert_eq!(reached.len(), 4);
        assert_eq!(reached[0], rule);
    }

    #[test]
    fn test_describe_prefers_names() {
        let mut graph = Graph::new();
        let rule = graph.rule("expr");
        let c = graph.char('(');
        let seq = graph.sequence(&[c]);
        let digits = graph.range('0', '9');
        let number = graph.named(digits, "number");
        assert_eq!(graph.describe(rule), "<expr>");
        assert_eq!(graph.describe(c), "'('");
        assert_eq!(graph.describe(seq), "sequence");
        assert_eq!(graph.describe(number), "number");
    }

    #[test]
    fn test_pattern_reports_nullability() {
        assert!(Pattern::new("^").unwrap().is_nullable());
        assert!(Pattern::new("a*").unwrap().is_nullable());
        assert!(!Pattern::new("-?[0-9]+").unwrap().is_nullable());
        assert!(Pattern::new("(").is_err());
    }

    #[test]
    fn test_pattern_is_anchored_at_offset() {
        let pattern = Pattern::new("[0-9]+").unwrap();
        assert_eq!(pattern.match_at("ab12", 2), Some(4));
        assert_eq!(pattern.match_at("ab12", 0), None);

        let start = Pattern::new("^").unwrap();
        assert_eq!(start.match_at("ab", 0), Some(0));
        assert_eq!(start.match_at("ab", 1), None);
    }

    #[test]
    fn test_graph_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Graph>();
    }
}
