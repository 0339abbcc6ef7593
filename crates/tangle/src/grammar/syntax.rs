//! Rule definitions lowered from the bootstrap syntax tree.
//!
//! Nothing here touches a user graph: the compiler checks names and
//! references against these definitions first and only then builds nodes.

use super::bootstrap;
use super::GrammarError;
use crate::ast::AstNode;
use crate::error::ParseError;
use crate::graph::Pattern;
use crate::state::Position;

/// One `name label? : alternatives ;` statement.
#[derive(Debug, Clone)]
pub(crate) struct RuleDef {
    pub name: String,
    pub label: Option<String>,
    pub body: Expr,
    pub position: Position,
}

/// Right-hand side of a rule.
#[derive(Debug, Clone)]
pub(crate) enum Expr {
    Char(char),
    Literal(String),
    Pattern(Pattern),
    Ref { name: String, position: Position },
    Sequence(Vec<Expr>),
    Alternation(Vec<Expr>),
    Repetition {
        expr: Box<Expr>,
        min: usize,
        max: Option<usize>,
    },
    Optional(Box<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    /// Rule references in source order.
    pub(crate) fn references(&self) -> Vec<(&str, Position)> {
        let mut refs = Vec::new();
        self.collect_references(&mut refs);
        refs
    }

    fn collect_references<'a>(&'a self, refs: &mut Vec<(&'a str, Position)>) {
        match self {
            Expr::Ref { name, position } => refs.push((name.as_str(), *position)),
            Expr::Sequence(items) | Expr::Alternation(items) => {
                for item in items {
                    item.collect_references(refs);
                }
            }
            Expr::Repetition { expr, .. } | Expr::Optional(expr) | Expr::Not(expr) => {
                expr.collect_references(refs);
            }
            Expr::Char(_) | Expr::Literal(_) | Expr::Pattern(_) => {}
        }
    }
}

/// Parses and lowers grammar text.
pub(crate) fn parse_grammar(text: &str) -> Result<Vec<RuleDef>, GrammarError> {
    let ast = bootstrap::parse(text).map_err(GrammarError::Syntax)?;
    ast.children()
        .iter()
        .filter(|child| child.has_tag("stmt"))
        .map(lower_stmt)
        .collect()
}

/// A node the bootstrap grammar should always have produced.
fn part<'a>(node: &'a AstNode, tag: &str) -> Result<&'a AstNode, GrammarError> {
    node.find(tag).ok_or_else(|| malformed(node, tag))
}

fn malformed(node: &AstNode, what: &str) -> GrammarError {
    GrammarError::Syntax(ParseError::failure(
        node.position(),
        format!("malformed grammar: missing {what}"),
        None,
    ))
}

fn lower_stmt(stmt: &AstNode) -> Result<RuleDef, GrammarError> {
    let ident = part(stmt, "ident")?;
    let label = stmt
        .find("label")
        .map(|label| unescape(strip_delimiters(label.contents())));
    let body = lower_alt(part(stmt, "alt")?)?;
    Ok(RuleDef {
        name: ident.contents().to_string(),
        label,
        body,
        position: ident.position(),
    })
}

fn lower_alt(alt: &AstNode) -> Result<Expr, GrammarError> {
    let mut branches = alt
        .children()
        .iter()
        .filter(|child| child.has_tag("seq"))
        .map(lower_seq)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(if branches.len() == 1 {
        branches.remove(0)
    } else {
        Expr::Alternation(branches)
    })
}

fn lower_seq(seq: &AstNode) -> Result<Expr, GrammarError> {
    let mut factors = seq
        .children()
        .iter()
        .filter(|child| child.has_tag("factor"))
        .map(lower_factor)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(if factors.len() == 1 {
        factors.remove(0)
    } else {
        Expr::Sequence(factors)
    })
}

fn lower_factor(factor: &AstNode) -> Result<Expr, GrammarError> {
    let base = factor
        .get_child(0)
        .ok_or_else(|| malformed(factor, "operand"))?;
    let expr = lower_base(base)?;
    match factor.find("suffix") {
        Some(suffix) => apply_suffix(expr, suffix),
        None => Ok(expr),
    }
}

fn lower_base(base: &AstNode) -> Result<Expr, GrammarError> {
    if base.has_tag("string") || base.has_tag("char") {
        let text = unescape(strip_delimiters(base.contents()));
        let mut chars = text.chars();
        return Ok(match (chars.next(), chars.next()) {
            (Some(c), None) => Expr::Char(c),
            _ => Expr::Literal(text),
        });
    }
    if base.has_tag("regex") {
        let source = strip_delimiters(base.contents()).replace("\\/", "/");
        return Pattern::new(&source)
            .map(Expr::Pattern)
            .map_err(|error| GrammarError::InvalidPattern {
                position: base.position(),
                error,
            });
    }
    if base.has_tag("ref") {
        let ident = if base.is_leaf() {
            base
        } else {
            part(base, "ident")?
        };
        return Ok(Expr::Ref {
            name: ident.contents().to_string(),
            position: ident.position(),
        });
    }
    if base.has_tag("group") {
        return lower_alt(part(base, "alt")?);
    }
    Err(malformed(base, "operand"))
}

fn apply_suffix(expr: Expr, suffix: &AstNode) -> Result<Expr, GrammarError> {
    let expr = Box::new(expr);
    if suffix.is_leaf() {
        return Ok(match suffix.contents() {
            "*" => Expr::Repetition {
                expr,
                min: 0,
                max: None,
            },
            "+" => Expr::Repetition {
                expr,
                min: 1,
                max: None,
            },
            "?" => Expr::Optional(expr),
            _ => Expr::Not(expr),
        });
    }

    let invalid = |message: String| GrammarError::InvalidRepetition {
        position: suffix.position(),
        message,
    };
    let bounds = suffix
        .children()
        .iter()
        .filter(|child| child.has_tag("digits"))
        .map(|digits| {
            digits
                .contents()
                .parse::<usize>()
                .map_err(|err| invalid(format!("bad count {}: {err}", digits.contents())))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let open_ended = suffix.children().iter().any(|child| child.contents() == ",");

    let (min, max) = match (bounds.as_slice(), open_ended) {
        (&[n], false) => (n, Some(n)),
        (&[n], true) => (n, None),
        (&[min, max], true) => (min, Some(max)),
        _ => return Err(invalid("malformed bounds".to_string())),
    };
    if let Some(max) = max.filter(|&max| max < min) {
        return Err(invalid(format!("bounds {{{min},{max}}} are inverted")));
    }
    Ok(Expr::Repetition { expr, min, max })
}

/// Drops the opening and closing delimiter of a quoted token.
fn strip_delimiters(text: &str) -> &str {
    let mut chars = text.chars();
    chars.next();
    chars.next_back();
    chars.as_str()
}

/// Resolves backslash escapes; unknown escapes stand for the escaped
/// character itself.
pub(crate) fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        out.push(match chars.next() {
            Some('n') => '\n',
            Some('t') => '\t',
            Some('r') => '\r',
            Some('0') => '\0',
            Some(other) => other,
            None => '\\',
        });
    }
    out
}
