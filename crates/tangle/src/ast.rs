//! The uniform tree produced by successful parses.
//!
//! Every parser in a graph, whatever its kind, yields an [`AstNode`]. Leaves
//! carry the matched text in `contents`; internal nodes carry structure in
//! `children` and leave `contents` empty. Nodes own their data outright, so a
//! tree outlives the graph that produced it.

use std::fmt;

use facet::Facet;

use crate::state::Position;

/// A node of a parse tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AstNode {
    tag: String,
    contents: String,
    position: Position,
    children: Vec<AstNode>,
}

/// One row of a flattened tree, in pre-order.
///
/// This is the serialisable view of an [`AstNode`] used for JSON output.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct AstLine {
    /// Nesting depth, 0 for the root.
    pub depth: usize,
    /// Tag of the node.
    pub tag: String,
    /// Matched text of a leaf, empty for internal nodes.
    pub contents: String,
    /// Line the node starts on.
    pub line: usize,
    /// Column the node starts at.
    pub column: usize,
    /// Number of direct children.
    pub children: usize,
}

impl AstNode {
    /// Creates an anonymous leaf holding `contents`.
    #[must_use]
    pub fn leaf(contents: impl Into<String>, position: Position) -> Self {
        AstNode {
            tag: String::new(),
            contents: contents.into(),
            position,
            children: Vec::new(),
        }
    }

    /// Creates an anonymous internal node.
    #[must_use]
    pub fn branch(children: Vec<AstNode>, position: Position) -> Self {
        AstNode {
            tag: String::new(),
            contents: String::new(),
            position,
            children,
        }
    }

    /// Creates the empty node: no tag, no contents, no children.
    #[must_use]
    pub fn empty(position: Position) -> Self {
        AstNode {
            position,
            ..AstNode::default()
        }
    }

    /// The node's tag, possibly empty.
    ///
    /// Tags of nested named parsers are joined with `|`, outermost first
    /// (`expr|number`).
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Matched text of a leaf. Always empty for internal nodes.
    #[must_use]
    pub fn contents(&self) -> &str {
        &self.contents
    }

    /// Where the match started.
    #[must_use]
    pub fn position(&self) -> Position {
        self.position
    }

    /// Children in match order.
    #[must_use]
    pub fn children(&self) -> &[AstNode] {
        &self.children
    }

    /// Number of children.
    #[must_use]
    pub fn children_num(&self) -> usize {
        self.children.len()
    }

    /// Returns the child at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range. Use [`AstNode::get_child`] when
    /// the index is not known to be valid.
    #[must_use]
    pub fn child(&self, index: usize) -> &AstNode {
        &self.children[index]
    }

    /// Returns the child at `index`, if any.
    #[must_use]
    pub fn get_child(&self, index: usize) -> Option<&AstNode> {
        self.children.get(index)
    }

    /// Returns `true` for leaves.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Returns `true` for the empty node produced by optional and
    /// zero-width matches.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tag.is_empty() && self.contents.is_empty() && self.children.is_empty()
    }

    /// Returns `true` if one of the `|`-separated components of the tag is
    /// `name`.
    #[must_use]
    pub fn has_tag(&self, name: &str) -> bool {
        self.tag.split('|').any(|part| part == name)
    }

    /// First child carrying `name` in its tag.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&AstNode> {
        self.children.iter().find(|child| child.has_tag(name))
    }

    /// Replaces the tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Prefixes the tag with `name`, which is how named parsers label their
    /// results.
    #[must_use]
    pub fn tagged(mut self, name: &str) -> Self {
        self.tag = if self.tag.is_empty() {
            name.to_string()
        } else {
            format!("{name}|{}", self.tag)
        };
        self
    }

    /// Consumes the node and returns its children.
    #[must_use]
    pub fn into_children(self) -> Vec<AstNode> {
        self.children
    }

    /// Consumes the node and returns its first child, or an empty node.
    #[must_use]
    pub fn into_first(self) -> AstNode {
        let position = self.position;
        self.children
            .into_iter()
            .next()
            .unwrap_or_else(|| AstNode::empty(position))
    }

    /// Splices the children of anonymous internal children into this node
    /// and drops empty children.
    ///
    /// Tagged children and leaves are kept as they are.
    #[must_use]
    pub fn flatten(mut self) -> Self {
        let children = std::mem::take(&mut self.children);
        let mut flat = Vec::with_capacity(children.len());
        for child in children {
            splice_into(child, &mut flat);
        }
        self.children = flat;
        self
    }

    /// [`AstNode::flatten`], then collapses an anonymous node left with a
    /// single child into that child.
    #[must_use]
    pub fn fold(self) -> Self {
        let folded = self.flatten();
        if folded.tag.is_empty() && folded.children.len() == 1 {
            folded.into_first()
        } else {
            folded
        }
    }

    /// Pre-order listing of the tree.
    #[must_use]
    pub fn lines(&self) -> Vec<AstLine> {
        let mut lines = Vec::new();
        self.collect_lines(0, &mut lines);
        lines
    }

    fn collect_lines(&self, depth: usize, lines: &mut Vec<AstLine>) {
        lines.push(AstLine {
            depth,
            tag: self.tag.clone(),
            contents: self.contents.clone(),
            line: self.position.line,
            column: self.position.column,
            children: self.children.len(),
        });
        for child in &self.children {
            child.collect_lines(depth + 1, lines);
        }
    }

    /// Serialises [`AstNode::lines`] as a JSON array.
    #[must_use]
    pub fn to_json(&self) -> String {
        facet_json::to_string(&self.lines())
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        let tag = if self.tag.is_empty() { "_" } else { &self.tag };
        if self.children.is_empty() {
            writeln!(
                f,
                "{indent}{tag}:{} '{}'",
                self.position,
                self.contents.escape_debug()
            )
        } else {
            writeln!(f, "{indent}{tag}")?;
            self.children
                .iter()
                .try_for_each(|child| child.write_indented(f, depth + 1))
        }
    }
}

fn splice_into(child: AstNode, out: &mut Vec<AstNode>) {
    if child.is_empty() {
        return;
    }
    if child.tag.is_empty() && !child.children.is_empty() {
        for grandchild in child.children {
            splice_into(grandchild, out);
        }
    } else {
        out.push(child);
    }
}

impl fmt::Display for AstNode {
    /// Indented tree, one node per line, leaves as `tag:line:col 'text'`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(text: &str) -> AstNode {
        AstNode::leaf(text, Position::START)
    }

    #[test]
    fn test_tagged_composes_outermost_first() {
        let node = leaf("1").tagged("number").tagged("expr");
        assert_eq!(node.tag(), "expr|number");
        assert!(node.has_tag("number"));
        assert!(node.has_tag("expr"));
        assert!(!node.has_tag("num"));
    }

    #[test]
    fn test_flatten_splices_anonymous_branches_and_drops_empty() {
        let inner = AstNode::branch(vec![leaf("b"), leaf("c")], Position::START);
        let tagged = AstNode::branch(vec![leaf("d")], Position::START).tagged("keep");
        let node = AstNode::branch(
            vec![leaf("a"), inner, AstNode::empty(Position::START), tagged],
            Position::START,
        )
        .flatten();

        let texts: Vec<_> = node.children().iter().map(AstNode::contents).collect();
        assert_eq!(texts, vec!["a", "b", "c", ""]);
        assert_eq!(node.child(3).tag(), "keep");
        assert_eq!(node.child(3).children_num(), 1);
    }

    #[test]
    fn test_fold_collapses_single_child() {
        let node = AstNode::branch(
            vec![AstNode::empty(Position::START), leaf("x").tagged("x")],
            Position::START,
        )
        .fold();
        assert_eq!(node.tag(), "x");
        assert_eq!(node.contents(), "x");
    }

    #[test]
    fn test_get_child_is_bounds_checked() {
        let node = AstNode::branch(vec![leaf("a")], Position::START);
        assert!(node.get_child(0).is_some());
        assert!(node.get_child(1).is_none());
    }

    #[test]
    #[should_panic(expected = "index out of bounds")]
    fn test_child_out_of_range_panics() {
        let node = AstNode::branch(vec![leaf("a")], Position::START);
        let _ = node.child(1);
    }

    #[test]
    fn test_display_prints_indented_tree() {
        let node = AstNode::branch(vec![leaf("+").tagged("operator")], Position::START)
            .tagged("lispy");
        assert_eq!(node.to_string(), "lispy\n  operator:1:1 '+'\n");
    }

    #[test]
    fn test_lines_are_preorder() {
        let node = AstNode::branch(
            vec![AstNode::branch(vec![leaf("a")], Position::START).tagged("inner"), leaf("b")],
            Position::START,
        );
        let lines = node.lines();
        let depths: Vec<_> = lines.iter().map(|line| line.depth).collect();
        assert_eq!(depths, vec![0, 1, 2, 1]);
        assert_eq!(lines[1].tag, "inner");
        assert_eq!(lines[1].children, 1);
    }
}
