//! Benchmark utilities.
//!
//! Deterministic graph and log builders shared by the benchmarks.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use canvas_sync_protocol::{diff, CanvasState, Element, Graph, Transaction, TxId};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;

fn epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Generate a graph with `nodes` nodes chained by `nodes - 1` edges.
pub fn chain_graph(nodes: usize) -> Graph {
    let node_list = (0..nodes)
        .map(|i| {
            Element::new(
                format!("n{i}"),
                json!({ "label": format!("node {i}"), "x": i, "y": 0 }),
            )
        })
        .collect();
    let edge_list = (1..nodes)
        .map(|i| {
            Element::new(
                format!("e{i}"),
                json!({ "source": format!("n{}", i - 1), "target": format!("n{i}") }),
            )
        })
        .collect();
    Graph::new(node_list, edge_list)
}

/// Returns `graph` with every `stride`-th node moved.
pub fn moved(graph: &Graph, stride: usize) -> Graph {
    let mut next = graph.clone();
    for node in next.nodes.iter_mut().step_by(stride.max(1)) {
        node.body["y"] = json!(1);
    }
    next
}

/// Generate a state whose log grows a chain one node at a time.
///
/// Each transaction adds a node and the edge linking it to its predecessor,
/// one second apart.
pub fn growing_log(transactions: usize) -> CanvasState {
    let mut state = CanvasState::new("bench", Graph::default(), epoch());
    let mut previous = Graph::default();
    for step in 1..=transactions {
        let next = chain_graph(step);
        if let Some(delta) = diff(&next, &previous) {
            let payload = serde_json::to_value(&delta).unwrap_or_default();
            let created_at = epoch() + Duration::seconds(step as i64);
            let tx_id = TxId::from(format!("tx{step}"));
            state
                .transactions
                .push(Transaction::new(tx_id, created_at, payload));
        }
        previous = next;
    }
    state
}
