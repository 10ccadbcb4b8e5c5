//! Property-based test generators using proptest.
//!
//! Provides strategies for generating graphs, edit histories and
//! transaction logs that replay cleanly.

use crate::fixtures::at;
use canvas_sync_protocol::{diff, CanvasState, Element, Graph, Transaction, TxId};
use proptest::prelude::*;
use serde_json::json;

/// Strategy for element lists with unique IDs drawn from `id_pattern`.
pub fn elements_strategy(
    id_pattern: &'static str,
    max: usize,
) -> impl Strategy<Value = Vec<Element>> {
    prop::collection::btree_map(id_pattern, 0i64..8, 0..max).prop_map(|m| {
        m.into_iter()
            .map(|(id, v)| Element::new(id, json!({ "v": v })))
            .collect()
    })
}

/// Strategy for small graphs with unique node and edge IDs.
pub fn graph_strategy() -> impl Strategy<Value = Graph> {
    (elements_strategy("n[0-7]", 6), elements_strategy("e[0-3]", 4))
        .prop_map(|(nodes, edges)| Graph::new(nodes, edges))
}

/// Strategy for a sequence of editor snapshots, as a user would produce.
pub fn edit_history_strategy(max_steps: usize) -> impl Strategy<Value = Vec<Graph>> {
    prop::collection::vec(graph_strategy(), 1..max_steps)
}

/// Builds the transaction log a client would capture while its editor went
/// through `history`, starting from an empty graph.
///
/// Each step that changes something becomes one transaction, one second
/// after the previous.
pub fn capture_history(version: &str, history: &[Graph]) -> CanvasState {
    let mut state = CanvasState::new(version, Graph::default(), at(0));
    let mut previous = Graph::default();
    let mut seconds = 0;
    for graph in history {
        if let Some(delta) = diff(graph, &previous) {
            seconds += 1;
            let payload = serde_json::to_value(&delta).expect("Failed to encode delta");
            state = state.append(Transaction::new(TxId::generate(), at(seconds), payload));
            previous = graph.clone();
        }
    }
    state
}

/// Strategy for a canvas state whose log replays without skips.
pub fn captured_state_strategy(max_steps: usize) -> impl Strategy<Value = CanvasState> {
    edit_history_strategy(max_steps).prop_map(|history| capture_history("v1", &history))
}

/// Strategy for a subset of `len` indices, as a selection mask.
pub fn mask_strategy(len: usize) -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(any::<bool>(), len)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
