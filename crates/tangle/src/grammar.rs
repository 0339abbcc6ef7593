//! Compiling grammar descriptions into parser graphs.
//!
//! A grammar is a list of statements, one rule each:
//!
//! ```text
//! number "number" : /-?[0-9]+/ ;
//! operator        : '+' | '-' | '*' | '/' ;
//! expr            : <number> | '(' <operator> <expr>+ ')' ;
//! lispy           : /^/ <operator> <expr>+ /$/ ;
//! ```
//!
//! Rules are referenced as `<name>` or by their bare name. Terminals are
//! `'…'` or `"…"` literals and `/…/` regular expressions. Factors may be
//! followed by `*`, `+`, `?`, `!` (negative lookahead) or a count `{n}`,
//! `{n,}`, `{n,m}`, and parentheses group alternatives. A string after the
//! rule name becomes the expected item reported when the rule fails.
//!
//! Unless [`CompileOptions::whitespace_sensitive`] is set, every terminal
//! skips the whitespace that follows it.
//!
//! Compilation is all or nothing. The text is parsed and every name and
//! reference is checked before any node is created; if the resulting graph
//! then fails [validation](crate::validate::validate), every node the
//! compilation created is released again and bound placeholders are reset.

use std::collections::{BTreeMap, HashSet};
use std::ops::Index;

use thiserror::Error;

use crate::ast::AstNode;
use crate::error::ParseError;
use crate::graph::{Graph, GraphError, ParserId, PatternError};
use crate::state::Position;
use crate::validate::{validate_open, ValidationError};

mod bootstrap;
mod syntax;

use syntax::{Expr, RuleDef};

/// Settings for [`compile_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileOptions {
    /// Do not skip whitespace after terminals.
    pub whitespace_sensitive: bool,
}

/// The rules of a compiled grammar, by name.
///
/// The table holds the rules the grammar defined as well as every bound
/// placeholder passed to the compiler. It only holds ids; the nodes stay in
/// the graph and are released with [`Graph::cleanup`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrammarTable {
    rules: BTreeMap<String, ParserId>,
}

impl GrammarTable {
    /// The rule called `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ParserId> {
        self.rules.get(name).copied()
    }

    /// Returns `true` if the table has a rule called `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns `true` if the table has no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rule names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    /// Every rule id, suitable as the roots of a [`Graph::cleanup`].
    #[must_use]
    pub fn roots(&self) -> Vec<ParserId> {
        self.rules.values().copied().collect()
    }

    /// `(name, id)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, ParserId)> {
        self.rules.iter().map(|(name, &id)| (name.as_str(), id))
    }
}

impl Index<&str> for GrammarTable {
    type Output = ParserId;

    /// # Panics
    ///
    /// Panics if there is no rule called `name`.
    fn index(&self, name: &str) -> &ParserId {
        match self.rules.get(name) {
            Some(id) => id,
            None => panic!("grammar has no rule <{name}>"),
        }
    }
}

/// Reasons a grammar is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrammarError {
    /// The text does not follow the grammar language.
    #[error("invalid grammar: {0}")]
    Syntax(ParseError),

    /// A rule refers to a name that is neither defined nor bound.
    #[error("{position}: undefined rule <{name}>")]
    UndefinedRule {
        /// The missing name.
        name: String,
        /// Where it is referenced.
        position: Position,
    },

    /// A rule is defined twice, or defines a bound rule that already has a
    /// body.
    #[error("{position}: duplicate rule <{name}>")]
    DuplicateRule {
        /// The rule name.
        name: String,
        /// The second definition.
        position: Position,
    },

    /// Two different bound placeholders share a name.
    #[error("more than one binding is called <{0}>")]
    DuplicateBinding(String),

    /// A bound parser has no name to be referenced by.
    #[error("bound parser {0} has no name")]
    UnnamedBinding(ParserId),

    /// A regular expression terminal does not compile.
    #[error("{position}: {error}")]
    InvalidPattern {
        /// Where the terminal starts.
        position: Position,
        /// The regex error.
        #[source]
        error: PatternError,
    },

    /// A `{n,m}` count cannot be used.
    #[error("{position}: invalid repetition: {message}")]
    InvalidRepetition {
        /// Where the count starts.
        position: Position,
        /// What is wrong with it.
        message: String,
    },

    /// The compiled graph would not terminate or is incomplete.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A bound parser is stale.
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Compiles `text` into `graph` with default options.
///
/// `bindings` are named parsers the grammar can refer to. A bound rule
/// placeholder that is still undefined may be given its body by the
/// grammar; any other bound parser is used as it is. A placeholder the
/// grammar only refers to can be defined after compiling; until then,
/// running a rule that reaches it fails.
///
/// # Errors
///
/// Returns a [`GrammarError`] and leaves the graph as it was if the text is
/// malformed, a name is missing or duplicated, or the resulting graph fails
/// validation.
pub fn compile(
    graph: &mut Graph,
    text: &str,
    bindings: &[ParserId],
) -> Result<GrammarTable, GrammarError> {
    compile_with(graph, text, bindings, &CompileOptions::default())
}

/// [`compile`] with explicit [`CompileOptions`].
///
/// # Errors
///
/// See [`compile`].
pub fn compile_with(
    graph: &mut Graph,
    text: &str,
    bindings: &[ParserId],
    options: &CompileOptions,
) -> Result<GrammarTable, GrammarError> {
    let defs = syntax::parse_grammar(text)?;
    let bound = collect_bindings(graph, bindings)?;
    check_definitions(graph, &defs, &bound)?;
    check_references(&defs, &bound)?;

    let mut rules = bound.clone();
    let mut builder = Builder {
        graph,
        options,
        spaces: None,
        created: Vec::new(),
        patched: Vec::new(),
    };
    for def in &defs {
        if !rules.contains_key(&def.name) {
            let id = builder.graph.rule(def.name.clone());
            builder.created.push(id);
            rules.insert(def.name.clone(), id);
        }
    }

    let defined: Vec<ParserId> = defs.iter().map(|def| rules[&def.name]).collect();
    let outcome = builder.define_all(&defs, &rules).and_then(|()| {
        let open: HashSet<ParserId> = bound
            .values()
            .copied()
            .filter(|&id| builder.graph.is_undefined_rule(id))
            .collect();
        validate_open(builder.graph, &defined, &open).map_err(GrammarError::from)
    });
    if let Err(err) = outcome {
        log::debug!("grammar rejected, rolling back: {err}");
        builder.rollback();
        return Err(err);
    }

    for (name, &id) in &bound {
        if builder.graph.is_undefined_rule(id) {
            log::warn!("bound rule <{name}> is still undefined; define it before running");
        }
    }
    log::debug!(
        "compiled {} rules into {} new parsers",
        defs.len(),
        builder.created.len()
    );
    Ok(GrammarTable { rules })
}

impl Graph {
    /// Compiles grammar text into this graph; see [`compile`].
    ///
    /// # Errors
    ///
    /// See [`compile`].
    pub fn compile_grammar(
        &mut self,
        text: &str,
        bindings: &[ParserId],
    ) -> Result<GrammarTable, GrammarError> {
        compile(self, text, bindings)
    }
}

fn collect_bindings(
    graph: &Graph,
    bindings: &[ParserId],
) -> Result<BTreeMap<String, ParserId>, GrammarError> {
    let mut bound = BTreeMap::new();
    for &id in bindings {
        let node = graph.node(id).ok_or(GraphError::Released(id))?;
        let name = node.name().ok_or(GrammarError::UnnamedBinding(id))?;
        if bound
            .insert(name.to_string(), id)
            .is_some_and(|previous| previous != id)
        {
            return Err(GrammarError::DuplicateBinding(name.to_string()));
        }
    }
    Ok(bound)
}

fn check_definitions(
    graph: &Graph,
    defs: &[RuleDef],
    bound: &BTreeMap<String, ParserId>,
) -> Result<(), GrammarError> {
    let mut seen = HashSet::new();
    for def in defs {
        let redefines_bound = bound
            .get(&def.name)
            .is_some_and(|&id| !graph.is_undefined_rule(id));
        if !seen.insert(def.name.as_str()) || redefines_bound {
            return Err(GrammarError::DuplicateRule {
                name: def.name.clone(),
                position: def.position,
            });
        }
    }
    Ok(())
}

fn check_references(
    defs: &[RuleDef],
    bound: &BTreeMap<String, ParserId>,
) -> Result<(), GrammarError> {
    let defined: HashSet<&str> = defs.iter().map(|def| def.name.as_str()).collect();
    for def in defs {
        for (name, position) in def.body.references() {
            if !defined.contains(name) && !bound.contains_key(name) {
                return Err(GrammarError::UndefinedRule {
                    name: name.to_string(),
                    position,
                });
            }
        }
    }
    Ok(())
}

/// Emits nodes for rule bodies and remembers what it touched.
struct Builder<'g> {
    graph: &'g mut Graph,
    options: &'g CompileOptions,
    /// Whitespace skipper shared by every terminal of this grammar.
    spaces: Option<ParserId>,
    created: Vec<ParserId>,
    patched: Vec<ParserId>,
}

impl Builder<'_> {
    fn define_all(
        &mut self,
        defs: &[RuleDef],
        rules: &BTreeMap<String, ParserId>,
    ) -> Result<(), GrammarError> {
        for def in defs {
            let mut body = self.lower(&def.body, rules);
            if let Some(label) = &def.label {
                let expect = self.graph.expect(body, label.clone());
                body = self.track(expect);
            }
            let rule = rules[&def.name];
            self.graph.define(rule, body)?;
            self.patched.push(rule);
        }
        Ok(())
    }

    fn track(&mut self, id: ParserId) -> ParserId {
        self.created.push(id);
        id
    }

    fn lower(&mut self, expr: &Expr, rules: &BTreeMap<String, ParserId>) -> ParserId {
        match expr {
            Expr::Char(c) => {
                let id = self.graph.char(*c);
                self.terminal(id)
            }
            Expr::Literal(text) => {
                let id = self.graph.literal(text.clone());
                self.terminal(id)
            }
            Expr::Pattern(pattern) => {
                let id = self.graph.compiled_pattern(pattern.clone());
                self.terminal(id)
            }
            // Checked to resolve before anything was built
            Expr::Ref { name, .. } => rules[name],
            Expr::Sequence(items) => {
                let ids = self.lower_all(items, rules);
                let seq = self.graph.sequence(&ids);
                let seq = self.track(seq);
                let folded = self.graph.transform(seq, AstNode::fold);
                self.track(folded)
            }
            Expr::Alternation(items) => {
                let ids = self.lower_all(items, rules);
                let alt = self.graph.alternation(&ids);
                self.track(alt)
            }
            Expr::Repetition { expr, min, max } => {
                let inner = self.lower(expr, rules);
                let rep = self.graph.repetition(inner, *min, *max);
                let rep = self.track(rep);
                let folded = self.graph.transform(rep, AstNode::fold);
                self.track(folded)
            }
            Expr::Optional(expr) => {
                let inner = self.lower(expr, rules);
                let opt = self.graph.optional(inner);
                self.track(opt)
            }
            Expr::Not(expr) => {
                let inner = self.lower(expr, rules);
                let not = self.graph.not(inner);
                self.track(not)
            }
        }
    }

    fn lower_all(&mut self, items: &[Expr], rules: &BTreeMap<String, ParserId>) -> Vec<ParserId> {
        items.iter().map(|item| self.lower(item, rules)).collect()
    }

    /// Tracks a terminal and, unless whitespace matters, skips what follows
    /// it.
    fn terminal(&mut self, id: ParserId) -> ParserId {
        let id = self.track(id);
        if self.options.whitespace_sensitive {
            return id;
        }
        let spaces = self.spaces();
        let both = self.graph.sequence(&[id, spaces]);
        let both = self.track(both);
        let first = self.graph.transform(both, AstNode::into_first);
        self.track(first)
    }

    fn spaces(&mut self) -> ParserId {
        if let Some(spaces) = self.spaces {
            return spaces;
        }
        let space = self.graph.whitespace();
        let space = self.track(space);
        let many = self.graph.many(space);
        let many = self.track(many);
        let skipped = self.graph.skip(many);
        let skipped = self.track(skipped);
        self.spaces = Some(skipped);
        skipped
    }

    /// Resets patched placeholders and releases every created node.
    fn rollback(&mut self) {
        for &rule in &self.patched {
            self.graph.undefine(rule);
        }
        self.graph.discard(&self.created);
        log::trace!(
            "rolled back {} definitions and {} parsers",
            self.patched.len(),
            self.created.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compiles_and_runs_simple_grammar() {
        let mut graph = Graph::new();
        let table = compile(&mut graph, "num : '0' | '1' ;", &[]).unwrap();
        let num = table["num"];
        let node = graph.run(num, "1").unwrap();
        assert_eq!(node.tag(), "num");
        assert_eq!(node.contents(), "1");

        let err = graph.run(num, "2").unwrap_err();
        assert_eq!(err.position().offset, 0);
        assert!(err.expects("'0'"));
        assert!(err.expects("'1'"));
    }

    #[test]
    fn test_undefined_reference_leaves_graph_untouched() {
        let mut graph = Graph::new();
        let err = compile(&mut graph, "A : B ;", &[]).unwrap_err();
        assert!(matches!(err, GrammarError::UndefinedRule { ref name, .. } if name == "B"));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_duplicate_rule() {
        let mut graph = Graph::new();
        let err = compile(&mut graph, "a : 'x' ;\na : 'y' ;", &[]).unwrap_err();
        let GrammarError::DuplicateRule { name, position } = err else {
            panic!("expected a duplicate rule, got {err:?}");
        };
        assert_eq!(name, "a");
        assert_eq!(position.line, 2);
    }

    #[test]
    fn test_syntax_error() {
        let mut graph = Graph::new();
        let err = compile(&mut graph, "a 'x' ;", &[]).unwrap_err();
        assert!(matches!(err, GrammarError::Syntax(_)));
        assert!(err.to_string().starts_with("invalid grammar: 1:"));
    }

    #[test]
    fn test_validation_failure_rolls_back() {
        let mut graph = Graph::new();
        let digit = graph.digit();
        let before = graph.len();

        let err = compile(&mut graph, "a : ('x'*)* ;", &[]).unwrap_err();
        assert!(matches!(
            err,
            GrammarError::Validation(ValidationError::NullableRepetition { .. })
        ));
        assert_eq!(graph.len(), before);

        let err = compile(&mut graph, "a : a 'x' ;", &[]).unwrap_err();
        assert!(matches!(
            err,
            GrammarError::Validation(ValidationError::LeftRecursion { .. })
        ));
        assert_eq!(graph.len(), before);
        assert!(graph.contains(digit));
    }

    #[test]
    fn test_failed_compile_resets_bound_placeholders() {
        let mut graph = Graph::new();
        let expr = graph.rule("expr");
        let err = compile(&mut graph, "expr : expr '+' ;", &[expr]).unwrap_err();
        assert!(matches!(err, GrammarError::Validation(_)));
        assert!(graph.is_undefined_rule(expr));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_bound_placeholder_is_defined_in_place() {
        let mut graph = Graph::new();
        let value = graph.rule("value");
        let table = compile(&mut graph, "value : /[0-9]+/ ;", &[value]).unwrap();
        assert_eq!(table["value"], value);
        assert_eq!(graph.run(value, "42").unwrap().contents(), "42");
    }

    #[test]
    fn test_bound_parser_is_referenced() {
        let mut graph = Graph::new();
        let digit = graph.digit();
        let digit = graph.named(digit, "digit");
        let table = compile(&mut graph, "pair : <digit> digit ;", &[digit]).unwrap();
        let node = graph.run(table["pair"], "12").unwrap();
        assert_eq!(node.children_num(), 2);
        assert_eq!(node.child(1).tag(), "digit");
        assert_eq!(node.child(1).contents(), "2");
    }

    #[test]
    fn test_redefining_bound_rule_is_duplicate() {
        let mut graph = Graph::new();
        let digit = graph.digit();
        let digit = graph.named(digit, "digit");
        let err = compile(&mut graph, "digit : 'x' ;", &[digit]).unwrap_err();
        assert!(matches!(err, GrammarError::DuplicateRule { .. }));
    }

    #[test]
    fn test_bindings_need_names() {
        let mut graph = Graph::new();
        let digit = graph.digit();
        assert_eq!(
            compile(&mut graph, "a : 'x' ;", &[digit]),
            Err(GrammarError::UnnamedBinding(digit))
        );
    }

    #[test]
    fn test_whitespace_sensitive_terminals() {
        let mut graph = Graph::new();
        let loose = compile(&mut graph, "ab : 'a' 'b' ;", &[]).unwrap();
        assert!(graph.run(loose["ab"], "a  b").is_ok());

        let options = CompileOptions {
            whitespace_sensitive: true,
        };
        let strict = compile_with(&mut graph, "ab : 'a' 'b' ;", &[], &options).unwrap();
        assert!(graph.run(strict["ab"], "ab").is_ok());
        assert!(graph.run(strict["ab"], "a b").is_err());
    }

    #[test]
    fn test_label_replaces_expected_items() {
        let mut graph = Graph::new();
        let table = compile(&mut graph, r#"num "number" : /[0-9]+/ ;"#, &[]).unwrap();
        let err = graph.run(table["num"], "x").unwrap_err();
        assert_eq!(err.expected_items().collect::<Vec<_>>(), vec!["number"]);
    }

    #[test]
    fn test_counted_repetition() {
        let mut graph = Graph::new();
        let table = compile(&mut graph, "xs : 'x'{2,4} ;", &[]).unwrap();
        assert!(graph.run(table["xs"], "x").is_err());
        assert_eq!(graph.run(table["xs"], "xxx").unwrap().children_num(), 3);
    }

    #[test]
    fn test_cleanup_releases_compiled_grammar() {
        let mut graph = Graph::new();
        let table = compile(&mut graph, "a : 'x' a | 'y' ;", &[]).unwrap();
        let created = graph.len();
        assert_eq!(graph.cleanup(&table.roots()), created);
        assert!(graph.is_empty());
    }

    #[test]
    fn test_bound_placeholder_can_be_defined_after_compiling() {
        let mut graph = Graph::new();
        let ident = graph.rule("ident");
        let table = compile(&mut graph, "pair : <ident> ',' <ident> ;", &[ident]).unwrap();
        let pair = table["pair"];

        let err = graph.run(pair, "ab,cd").unwrap_err();
        assert_eq!(err.failure_message(), Some("rule <ident> is undefined"));

        let word = graph.pattern("[a-z]+").unwrap();
        graph.define(ident, word).unwrap();
        let node = graph.run(pair, "ab,cd").unwrap();
        assert_eq!(node.children_num(), 3);
        assert_eq!(node.child(0).tag(), "ident");
        assert_eq!(node.child(2).tag(), "ident");
        assert_eq!(node.child(2).contents(), "cd");
    }

    #[test]
    fn test_deeply_nested_grammar_text_is_rejected() {
        let mut graph = Graph::new();
        let depth = 5_000;
        let text = format!("a : {}'x'{} ;", "(".repeat(depth), ")".repeat(depth));
        let err = compile(&mut graph, &text, &[]).unwrap_err();
        let GrammarError::Syntax(err) = err else {
            panic!("expected a syntax error, got {err:?}");
        };
        assert!(err.failure_message().is_some());
        assert!(graph.is_empty());

        let table = compile(&mut graph, "a : ((('x'))) ;", &[]).unwrap();
        assert!(graph.run(table["a"], "x").is_ok());
    }
}
