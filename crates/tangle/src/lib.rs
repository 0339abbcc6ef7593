//! Composable parser combinators with a self-hosted grammar compiler.
#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(clippy::multiple_crate_versions)]

/// The uniform parse tree.
///
/// Every parser, primitive or composite, produces an [`AstNode`]. Named
/// parsers tag their results, so a tree built from a compiled grammar
/// mirrors the grammar's rules.
pub mod ast;

/// Parse failures and how they are merged and reported.
pub mod error;

/// The parser graph: an arena of primitive and combinator nodes.
///
/// Construction, rule patching and cleanup all live here. Graphs may be
/// cyclic through rule placeholders, which is what lets grammars recurse.
pub mod graph;

/// Grammar-description compiler.
///
/// Turns textual rule definitions into parser graphs, using a grammar
/// parser that is itself built from this crate's combinators.
pub mod grammar;

/// Input positions.
pub mod state;

/// Graph validation and termination checks.
///
/// Validation exists to catch graphs that would loop forever or fail at
/// run time because a rule was never defined. The grammar compiler runs it
/// on everything it builds.
pub mod validate;

mod run;

pub use ast::{AstLine, AstNode};
pub use error::{ErrorReport, ParseError, ParseResult};
pub use grammar::{compile, compile_with, CompileOptions, GrammarError, GrammarTable};
pub use graph::{
    Graph, GraphError, Mapping, Node, ParserId, ParserKind, Pattern, PatternError, Predicate,
    DEFAULT_MAX_DEPTH,
};
pub use state::Position;
pub use validate::{validate, ValidationError};
