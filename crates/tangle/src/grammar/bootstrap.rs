//! The grammar-description language, written with the engine's own
//! combinators.
//!
//! The graph is built once per process and only ever read afterwards. Its
//! output is a tagged [`AstNode`] tree (`grammar`, `stmt`, `ident`, `label`,
//! `alt`, `seq`, `factor`, `suffix`, `digits`, `string`, `char`, `regex`,
//! `ref`, `group`) that [`super::syntax`] lowers into rule definitions.

use std::sync::LazyLock;

use crate::ast::AstNode;
use crate::error::ParseResult;
use crate::graph::{Graph, ParserId};

static BOOTSTRAP: LazyLock<Bootstrap> = LazyLock::new(Bootstrap::build);

/// Parses grammar text into its syntax tree.
pub(crate) fn parse(text: &str) -> ParseResult {
    BOOTSTRAP.graph.run(BOOTSTRAP.root, text)
}

struct Bootstrap {
    graph: Graph,
    root: ParserId,
}

/// Builder state: the graph plus the shared whitespace skipper.
struct Lexer {
    graph: Graph,
    spaces: ParserId,
}

impl Lexer {
    fn new() -> Self {
        let mut graph = Graph::new();
        let space = graph.one_of(" \t\r\n\u{b}\u{c}");
        let spaces = graph.many(space);
        let spaces = graph.skip(spaces);
        Lexer { graph, spaces }
    }

    /// `parser` followed by skipped whitespace.
    fn lexeme(&mut self, parser: ParserId) -> ParserId {
        let both = self.graph.sequence(&[parser, self.spaces]);
        self.graph.transform(both, AstNode::into_first)
    }

    fn symbol(&mut self, c: char) -> ParserId {
        let parser = self.graph.char(c);
        self.lexeme(parser)
    }

    /// A lexeme whose tree is the consumed text, tagged `name`.
    fn token(&mut self, parser: ParserId, name: &str) -> ParserId {
        let text = self.graph.token(parser);
        let lexeme = self.lexeme(text);
        self.graph.named(lexeme, name)
    }

    /// Text between `delim`s, with backslash escapes.
    fn quoted(&mut self, delim: char, name: &str) -> ParserId {
        let g = &mut self.graph;
        let open = g.char(delim);
        let backslash = g.char('\\');
        let any = g.any();
        let escape = g.sequence(&[backslash, any]);
        let plain = g.none_of(format!("{delim}\\"));
        let piece = g.alternation(&[escape, plain]);
        let body = g.many(piece);
        let close = g.char(delim);
        let whole = g.sequence(&[open, body, close]);
        self.token(whole, name)
    }

    fn flat(&mut self, parsers: &[ParserId]) -> ParserId {
        let seq = self.graph.sequence(parsers);
        self.graph.transform(seq, AstNode::flatten)
    }
}

impl Bootstrap {
    fn build() -> Self {
        let mut lx = Lexer::new();

        let ident_start = lx
            .graph
            .satisfy("identifier", |c| c.is_ascii_alphabetic() || c == '_');
        let ident_rest = lx.graph.satisfy("identifier character", |c| {
            c.is_ascii_alphanumeric() || c == '_'
        });
        let ident_tail = lx.graph.many(ident_rest);
        let ident = lx.graph.sequence(&[ident_start, ident_tail]);
        let ident = lx.token(ident, "ident");

        let digit = lx.graph.digit();
        let digits = lx.graph.many1(digit);
        let digits = lx.token(digits, "digits");

        let string = lx.quoted('"', "string");
        let char_lit = lx.quoted('\'', "char");
        let regex = lx.quoted('/', "regex");

        // <name> or a bare name
        let open_angle = lx.symbol('<');
        let close_angle = lx.symbol('>');
        let angled = lx.flat(&[open_angle, ident, close_angle]);
        let reference = lx.graph.alternation(&[angled, ident]);
        let reference = lx.graph.named(reference, "ref");

        let alt = lx.graph.rule("alt");

        let open = lx.symbol('(');
        let close = lx.symbol(')');
        let group = lx.flat(&[open, alt, close]);
        let group = lx.graph.named(group, "group");

        let base = lx
            .graph
            .alternation(&[string, char_lit, regex, reference, group]);

        // *, +, ?, ! or {n}, {n,}, {n,m}
        let ops = lx.graph.one_of("*+?!");
        let op = lx.lexeme(ops);
        let open_brace = lx.symbol('{');
        let comma = lx.symbol(',');
        let close_brace = lx.symbol('}');
        let upper = lx.graph.optional(digits);
        let bounds_tail = lx.graph.sequence(&[comma, upper]);
        let bounds_tail = lx.graph.optional(bounds_tail);
        let bounds = lx.flat(&[open_brace, digits, bounds_tail, close_brace]);
        let suffix = lx.graph.alternation(&[op, bounds]);
        let suffix = lx.graph.named(suffix, "suffix");
        let suffix = lx.graph.optional(suffix);

        let factor = lx.flat(&[base, suffix]);
        let factor = lx.graph.named(factor, "factor");

        let factors = lx.graph.many(factor);
        let seq = lx.graph.transform(factors, AstNode::flatten);
        let seq = lx.graph.named(seq, "seq");

        let bar = lx.symbol('|');
        let more = lx.graph.sequence(&[bar, seq]);
        let more = lx.graph.many(more);
        let alt_body = lx.flat(&[seq, more]);
        if let Err(err) = lx.graph.define(alt, alt_body) {
            unreachable!("bootstrap rule <alt> is defined once: {err}");
        }

        // A statement that stops early reports why the next factor failed
        let semicolon = lx.symbol(';');
        let terminator = lx.graph.alternation(&[semicolon, factor]);

        let label = lx.graph.transform(string, |node| node);
        let label = lx.graph.named(label, "label");
        let label = lx.graph.optional(label);
        let colon = lx.symbol(':');
        let stmt = lx.flat(&[ident, label, colon, alt, terminator]);
        let stmt = lx.graph.named(stmt, "stmt");

        // Likewise, trailing input reports the failed statement
        let soi = lx.graph.start_of_input();
        let eoi = lx.graph.end_of_input();
        let stmts = lx.graph.many(stmt);
        let end = lx.graph.alternation(&[eoi, stmt]);
        let grammar = lx.flat(&[soi, lx.spaces, stmts, end]);
        let root = lx.graph.named(grammar, "grammar");

        log::debug!("built grammar bootstrap with {} parsers", lx.graph.len());
        Bootstrap {
            graph: lx.graph,
            root,
        }
    }
}
