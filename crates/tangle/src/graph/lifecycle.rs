//! Releasing parser graphs.
//!
//! Cleanup walks the graph from a caller-supplied set of roots with an
//! explicit worklist. A node is taken out of the arena the first time it is
//! popped, before its operands are queued, so a node reached again through
//! sharing or a cycle finds a released slot and is skipped.

use super::{Graph, Node, ParserId};

impl Graph {
    /// Releases every node reachable from `roots`, each exactly once.
    ///
    /// Nodes that are not reachable from `roots` are left alone, as are ids
    /// that have already been released. Returns the number of nodes
    /// released.
    ///
    /// Using any of the released ids afterwards is a contract violation.
    pub fn cleanup(&mut self, roots: &[ParserId]) -> usize {
        self.cleanup_with(roots, |_, _| {})
    }

    /// [`Graph::cleanup`], calling `on_release` once for every node as it is
    /// released.
    pub fn cleanup_with<F>(&mut self, roots: &[ParserId], mut on_release: F) -> usize
    where
        F: FnMut(ParserId, &Node),
    {
        let mut pending: Vec<ParserId> = roots.to_vec();
        let mut released = 0;

        while let Some(id) = pending.pop() {
            let Some(node) = self.release(id) else {
                continue; // Released earlier in this walk or before it
            };
            log::trace!("releasing parser {id} ({})", node.kind().kind_name());
            on_release(id, &node);
            pending.extend(node.kind().operands());
            released += 1;
        }

        log::debug!(
            "released {released} parsers from {} roots, {} still live",
            roots.len(),
            self.len()
        );
        released
    }

    /// Releases exactly the listed nodes, without following operands.
    pub(crate) fn discard(&mut self, ids: &[ParserId]) {
        for &id in ids {
            let _ = self.release(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use crate::graph::Graph;

    #[test]
    fn test_cleanup_releases_whole_tree() {
        let mut graph = Graph::new();
        let a = graph.char('a');
        let b = graph.char('b');
        let ab = graph.sequence(&[a, b]);
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.cleanup(&[ab]), 3);
        assert!(graph.is_empty());
        assert!(!graph.contains(a));
    }

    #[test]
    fn test_shared_node_released_once() {
        let mut graph = Graph::new();
        let shared = graph.char('x');
        let left = graph.sequence(&[shared, shared]);
        let right = graph.optional(shared);
        let mut counts: HashMap<_, usize> = HashMap::new();
        let released = graph.cleanup_with(&[left, right, left], |id, _| {
            *counts.entry(id).or_default() += 1;
        });
        assert_eq!(released, 3);
        assert!(counts.values().all(|&count| count == 1));
        assert_eq!(counts[&shared], 1);
    }

    #[test]
    fn test_cycle_terminates() {
        let mut graph = Graph::new();
        let rule = graph.rule("a");
        let x = graph.char('x');
        let y = graph.char('y');
        let again = graph.sequence(&[x, rule]);
        let body = graph.alternation(&[again, y]);
        graph.define(rule, body).unwrap();

        let mut counts: HashMap<_, usize> = HashMap::new();
        let released = graph.cleanup_with(&[rule], |id, _| {
            *counts.entry(id).or_default() += 1;
        });
        assert_eq!(released, 5);
        assert_eq!(counts.len(), 5);
        assert!(counts.values().all(|&count| count == 1));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_nodes_outside_closure_untouched() {
        let mut graph = Graph::new();
        let a = graph.char('a');
        let b = graph.char('b');
        let only_a = graph.optional(a);
        graph.cleanup(&[only_a]);
        assert!(graph.contains(b));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_second_cleanup_is_noop() {
        let mut graph = Graph::new();
        let a = graph.char('a');
        assert_eq!(graph.cleanup(&[a]), 1);
        assert_eq!(graph.cleanup(&[a]), 0);
    }

    #[test]
    fn test_released_slots_are_reused_with_fresh_ids() {
        let mut graph = Graph::new();
        let a = graph.char('a');
        graph.cleanup(&[a]);
        let b = graph.char('b');
        assert_ne!(a, b);
        assert!(!graph.contains(a));
        assert!(graph.contains(b));
    }

    #[test]
    #[should_panic(expected = "used after cleanup")]
    fn test_running_released_parser_panics() {
        let mut graph = Graph::new();
        let a = graph.char('a');
        graph.cleanup(&[a]);
        let _ = graph.run(a, "a");
    }
}
