//! Diff engine.
//!
//! Computes the delta between the editor's current collection and a base
//! graph. Element identity is the `id`; transient `working` metadata is
//! stripped from both sides first, so draft-only edits never produce a
//! transaction.

use crate::graph::{Element, ElementDelta, Graph, GraphDelta};
use std::collections::{HashMap, HashSet};

/// Returns the delta that turns `base` into `current`, or `None` if they hold
/// the same elements.
///
/// Pure reordering is not a change. `added` and `updated` follow the order of
/// `current`, `removed` follows the order of `base`. If `current` lists an ID
/// twice, the first occurrence wins.
///
/// Applying the result to `base` yields `current` up to element order.
pub fn diff(current: &Graph, base: &Graph) -> Option<GraphDelta> {
    let delta = GraphDelta {
        nodes: diff_elements(&current.nodes, &base.nodes),
        edges: diff_elements(&current.edges, &base.edges),
    };
    if delta.is_empty() {
        None
    } else {
        Some(delta)
    }
}

fn diff_elements(current: &[Element], base: &[Element]) -> ElementDelta {
    let base_by_id: HashMap<&str, &Element> =
        base.iter().map(|e| (e.id.as_str(), e)).collect();

    let mut delta = ElementDelta::default();
    let mut seen: HashSet<&str> = HashSet::with_capacity(current.len());

    for element in current {
        if !seen.insert(element.id.as_str()) {
            continue;
        }
        let stripped = element.stripped();
        match base_by_id.get(element.id.as_str()) {
            None => delta.added.push(stripped),
            Some(old) if old.body != stripped.body => delta.updated.push(stripped),
            Some(_) => {}
        }
    }

    let mut removed_seen: HashSet<&str> = HashSet::new();
    for element in base {
        let id = element.id.as_str();
        if !seen.contains(id) && removed_seen.insert(id) {
            delta.removed.push(element.id.clone());
        }
    }

    delta
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn el(id: &str, v: i64) -> Element {
        Element::new(id, json!({ "v": v }))
    }

    #[test]
    fn identical_graphs_have_no_diff() {
        let g = Graph::new(vec![el("a", 1)], vec![el("e", 1)]);
        assert_eq!(diff(&g, &g), None);
    }

    #[test]
    fn reorder_is_not_a_change() {
        let base = Graph::new(vec![el("a", 1), el("b", 2)], vec![]);
        let current = Graph::new(vec![el("b", 2), el("a", 1)], vec![]);
        assert_eq!(diff(&current, &base), None);
    }

    #[test]
    fn working_metadata_is_ignored() {
        let base = Graph::new(vec![el("a", 1)], vec![]);
        let current = Graph::new(vec![el("a", 1).with_working(json!("draft"))], vec![]);
        assert_eq!(diff(&current, &base), None);
    }

    #[test]
    fn detects_add_update_remove() {
        let base = Graph::new(vec![el("a", 1), el("b", 2)], vec![el("e1", 0)]);
        let current = Graph::new(
            vec![el("c", 3), el("a", 9).with_working(json!({"x": 1}))],
            vec![el("e1", 0)],
        );

        let delta = diff(&current, &base).unwrap();
        assert_eq!(delta.nodes.added, vec![el("c", 3)]);
        // Stripped before entering the delta
        assert_eq!(delta.nodes.updated, vec![el("a", 9)]);
        assert_eq!(delta.nodes.removed, vec!["b".to_string()]);
        assert!(delta.edges.is_empty());
    }

    #[test]
    fn duplicate_ids_in_current_keep_first() {
        let base = Graph::default();
        let current = Graph::new(vec![el("a", 1), el("a", 2)], vec![]);
        let delta = diff(&current, &base).unwrap();
        assert_eq!(delta.nodes.added, vec![el("a", 1)]);
    }

    fn arb_elements() -> impl Strategy<Value = Vec<Element>> {
        prop::collection::btree_map("[a-f]", 0i64..4, 0..6)
            .prop_map(|m| m.into_iter().map(|(id, v)| el(&id, v)).collect())
    }

    fn sorted(mut elements: Vec<Element>) -> Vec<Element> {
        elements.sort_by(|a, b| a.id.cmp(&b.id));
        elements
    }

    proptest! {
        #[test]
        fn diff_then_apply_reaches_current(
            base_nodes in arb_elements(),
            current_nodes in arb_elements(),
            base_edges in arb_elements(),
            current_edges in arb_elements(),
        ) {
            let base = Graph::new(base_nodes, base_edges);
            let current = Graph::new(current_nodes, current_edges);

            match diff(&current, &base) {
                None => {
                    prop_assert_eq!(sorted(base.nodes.clone()), sorted(current.nodes.clone()));
                    prop_assert_eq!(sorted(base.edges.clone()), sorted(current.edges.clone()));
                }
                Some(delta) => {
                    let applied = base.apply(&delta).unwrap();
                    prop_assert_eq!(sorted(applied.nodes), sorted(current.nodes));
                    prop_assert_eq!(sorted(applied.edges), sorted(current.edges));
                }
            }
        }
    }
}
