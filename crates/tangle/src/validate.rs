//! Validation routines for parser graphs.
//!
//! This module performs structural checks over the part of a [`Graph`]
//! reachable from a set of roots: every rule must be defined, no unbounded
//! repetition may loop over a parser that can match without consuming input,
//! and no rule may call itself without consuming input first (left
//! recursion). Graphs that pass never loop forever when run. The grammar
//! compiler runs these checks before handing a table back.

use std::collections::{HashMap, HashSet, VecDeque};

use thiserror::Error;

use crate::graph::{Graph, ParserId, ParserKind};

/// Represents a validation failure encountered when checking a graph.
///
/// `context` fields name the nearest named parser above the offending node.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A reachable rule placeholder was never defined.
    #[error("rule <{name}> is referenced but never defined")]
    UndefinedRule {
        /// Name of the placeholder.
        name: String,
    },

    /// An unbounded repetition over a parser that can match the empty
    /// string.
    #[error("unbounded repetition in <{context}> can match without consuming input")]
    NullableRepetition {
        /// Nearest named parser.
        context: String,
    },

    /// A rule that can reach itself without consuming input.
    #[error("rule <{context}> is left-recursive")]
    LeftRecursion {
        /// Nearest named parser on the cycle.
        context: String,
    },
}

/// Performs semantic validation of the graph reachable from `roots`.
///
/// This function runs several consistency passes:
///
/// - Checks that all reachable rules are defined.
/// - Rejects unbounded repetitions of nullable parsers.
/// - Rejects left recursion.
///
/// # Errors
///
/// Returns a [`ValidationError`] for the first violation found.
pub fn validate(graph: &Graph, roots: &[ParserId]) -> Result<(), ValidationError> {
    validate_open(graph, roots, &HashSet::new())
}

/// [`validate`] allowing the rule placeholders in `open` to stay undefined.
pub(crate) fn validate_open(
    graph: &Graph,
    roots: &[ParserId],
    open: &HashSet<ParserId>,
) -> Result<(), ValidationError> {
    let reachable = graph.reachable(roots);

    // Check for undefined rule references
    check_undefined_rules(graph, &reachable, open)?;

    let owners = owners(graph, &reachable);
    let nullable = nullable_set(graph, &reachable);

    // Check for repetitions that never advance
    check_nullable_repetition(graph, &reachable, &nullable, &owners)?;

    // Detect left recursion
    check_left_recursion(graph, &reachable, &nullable, &owners)?;

    Ok(())
}

/// Returns the parsers reachable from `roots` that can succeed without
/// consuming input.
#[must_use]
pub fn nullable(graph: &Graph, roots: &[ParserId]) -> HashSet<ParserId> {
    nullable_set(graph, &graph.reachable(roots))
}

fn check_undefined_rules(
    graph: &Graph,
    reachable: &[ParserId],
    open: &HashSet<ParserId>,
) -> Result<(), ValidationError> {
    for &id in reachable {
        if graph.is_undefined_rule(id) && !open.contains(&id) {
            return Err(ValidationError::UndefinedRule {
                name: graph.name(id).unwrap_or_default().to_string(),
            });
        }
    }
    Ok(())
}

/// Maps every reachable node to the name of its nearest named ancestor.
fn owners(graph: &Graph, reachable: &[ParserId]) -> HashMap<ParserId, String> {
    let mut owners = HashMap::new();
    let mut queue = VecDeque::new();

    for &id in reachable {
        if let Some(name) = graph.name(id) {
            owners.insert(id, name.to_string());
            queue.push_back(id);
        }
    }

    while let Some(id) = queue.pop_front() {
        let owner = owners[&id].clone();
        for operand in operands(graph, id) {
            if !owners.contains_key(&operand) {
                owners.insert(operand, owner.clone());
                queue.push_back(operand);
            }
        }
    }

    owners
}

fn context(graph: &Graph, owners: &HashMap<ParserId, String>, id: ParserId) -> String {
    owners
        .get(&id)
        .cloned()
        .unwrap_or_else(|| graph.describe(id))
}

fn operands(graph: &Graph, id: ParserId) -> Vec<ParserId> {
    graph.kind(id).map(ParserKind::operands).unwrap_or_default()
}

fn nullable_set(graph: &Graph, reachable: &[ParserId]) -> HashSet<ParserId> {
    let mut nullable = HashSet::new();
    loop {
        let mut changed = false;
        for &id in reachable {
            if nullable.contains(&id) {
                continue;
            }
            if graph
                .kind(id)
                .is_some_and(|kind| is_nullable(kind, &nullable))
            {
                nullable.insert(id);
                changed = true;
            }
        }
        if !changed {
            return nullable;
        }
    }
}

fn is_nullable(kind: &ParserKind, nullable: &HashSet<ParserId>) -> bool {
    match kind {
        ParserKind::Literal(text) => text.is_empty(),
        ParserKind::Pattern(pattern) => pattern.is_nullable(),
        ParserKind::StartOfInput
        | ParserKind::EndOfInput
        | ParserKind::Pass
        | ParserKind::Optional(_)
        | ParserKind::Lookahead { .. } => true,
        ParserKind::Sequence(parsers) => parsers.iter().all(|p| nullable.contains(p)),
        ParserKind::Alternation(parsers) => parsers.iter().any(|p| nullable.contains(p)),
        ParserKind::Repetition { parser, min, .. } => *min == 0 || nullable.contains(parser),
        ParserKind::Transform { parser, .. }
        | ParserKind::Expect { parser, .. }
        | ParserKind::Token(parser)
        | ParserKind::Rule(Some(parser)) => nullable.contains(parser),
        ParserKind::Any
        | ParserKind::Char(_)
        | ParserKind::Range(..)
        | ParserKind::OneOf(_)
        | ParserKind::NoneOf(_)
        | ParserKind::Satisfy { .. }
        | ParserKind::Fail(_)
        | ParserKind::Rule(None) => false,
    }
}

fn check_nullable_repetition(
    graph: &Graph,
    reachable: &[ParserId],
    nullable: &HashSet<ParserId>,
    owners: &HashMap<ParserId, String>,
) -> Result<(), ValidationError> {
    for &id in reachable {
        if let Some(ParserKind::Repetition {
            parser, max: None, ..
        }) = graph.kind(id)
        {
            if nullable.contains(parser) {
                return Err(ValidationError::NullableRepetition {
                    context: context(graph, owners, id),
                });
            }
        }
    }
    Ok(())
}

/// Parsers `id` may call before it has consumed anything.
fn leading_calls(graph: &Graph, id: ParserId, nullable: &HashSet<ParserId>) -> Vec<ParserId> {
    match graph.kind(id) {
        Some(ParserKind::Sequence(parsers)) => {
            let mut calls = Vec::new();
            for &parser in parsers {
                calls.push(parser);
                if !nullable.contains(&parser) {
                    break;
                }
            }
            calls
        }
        Some(kind) => kind.operands(),
        None => Vec::new(),
    }
}

fn check_left_recursion(
    graph: &Graph,
    reachable: &[ParserId],
    nullable: &HashSet<ParserId>,
    owners: &HashMap<ParserId, String>,
) -> Result<(), ValidationError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Active,
        Done,
    }

    let mut marks: HashMap<ParserId, Mark> = HashMap::new();

    for &root in reachable {
        if marks.contains_key(&root) {
            continue;
        }
        // Iterative depth-first search; each frame holds its pending calls
        let mut stack = vec![(root, leading_calls(graph, root, nullable))];
        marks.insert(root, Mark::Active);

        while let Some((id, calls)) = stack.last_mut() {
            let id = *id;
            let Some(next) = calls.pop() else {
                marks.insert(id, Mark::Done);
                stack.pop();
                continue;
            };
            match marks.get(&next) {
                Some(Mark::Active) => {
                    return Err(ValidationError::LeftRecursion {
                        context: context(graph, owners, next),
                    });
                }
                Some(Mark::Done) => {}
                None => {
                    marks.insert(next, Mark::Active);
                    stack.push((next, leading_calls(graph, next, nullable)));
                }
            }
        }
    }

    Ok(())
}
