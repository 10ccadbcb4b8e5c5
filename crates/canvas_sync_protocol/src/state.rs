//! Versioned canvas state.

use crate::graph::{Element, Graph};
use crate::transaction::{Transaction, TxId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The unit of persistence and synchronization for one canvas.
///
/// A state is a base snapshot (`nodes`, `edges`) identified by `version`, plus
/// the log of transactions captured since that snapshot. The working graph is
/// always derived by replaying the log, never stored.
///
/// # Invariants
///
/// - `tx_id` is unique within `transactions`
/// - `transactions` is ordered by `created_at`
/// - `version` only changes when a new base snapshot is created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasState {
    /// Snapshot lineage identifier.
    pub version: String,
    /// Snapshot nodes.
    #[serde(default)]
    pub nodes: Vec<Element>,
    /// Snapshot edges.
    #[serde(default)]
    pub edges: Vec<Element>,
    /// Transactions captured since the snapshot, in `created_at` order.
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    /// Snapshot creation time.
    pub updated_at: DateTime<Utc>,
    /// Revoked entries a later edit dropped from the log before the server
    /// acknowledged the revocation. Remote copies of these IDs are never
    /// merged back in.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub discarded: Vec<Transaction>,
}

impl CanvasState {
    /// Creates a state with an empty log.
    pub fn new(version: impl Into<String>, base: Graph, updated_at: DateTime<Utc>) -> Self {
        Self {
            version: version.into(),
            nodes: base.nodes,
            edges: base.edges,
            transactions: Vec::new(),
            updated_at,
            discarded: Vec::new(),
        }
    }

    /// Creates an empty canvas with a fresh version.
    pub fn empty() -> Self {
        Self::new(Uuid::new_v4().to_string(), Graph::default(), Utc::now())
    }

    /// Returns the snapshot graph, before any transaction is applied.
    pub fn base_graph(&self) -> Graph {
        Graph::new(self.nodes.clone(), self.edges.clone())
    }

    /// Returns the later of the snapshot time and the newest capture.
    pub fn last_modified(&self) -> DateTime<Utc> {
        self.transactions
            .iter()
            .map(|tx| tx.created_at)
            .max()
            .map_or(self.updated_at, |newest| newest.max(self.updated_at))
    }

    /// Looks up a transaction by ID.
    pub fn transaction(&self, tx_id: &TxId) -> Option<&Transaction> {
        self.transactions.iter().find(|tx| &tx.tx_id == tx_id)
    }

    /// Returns true if the log holds the given transaction.
    pub fn contains(&self, tx_id: &TxId) -> bool {
        self.transaction(tx_id).is_some()
    }

    /// Returns true if any entry lacks a sync stamp, revoked and discarded
    /// ones included.
    pub fn has_unsynced(&self) -> bool {
        !self.discarded.is_empty()
            || self.transactions.iter().any(|tx| tx.synced_at.is_none())
    }

    /// Returns true if `tx_id` was dropped by [`append`](Self::append) while
    /// its revocation was still unacknowledged.
    pub fn is_discarded(&self, tx_id: &TxId) -> bool {
        self.discarded.iter().any(|tx| &tx.tx_id == tx_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn empty_state_has_fresh_version() {
        let a = CanvasState::empty();
        let b = CanvasState::empty();
        assert_ne!(a.version, b.version);
        assert!(a.transactions.is_empty());
        assert!(a.base_graph().is_empty());
    }

    #[test]
    fn last_modified_prefers_newest_transaction() {
        let snapshot = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();

        let mut state = CanvasState::new("v1", Graph::default(), snapshot);
        assert_eq!(state.last_modified(), snapshot);

        state
            .transactions
            .push(Transaction::new("t".into(), later, json!({})));
        assert_eq!(state.last_modified(), later);
        assert!(state.has_unsynced());
        assert!(state.contains(&"t".into()));
    }

    #[test]
    fn serde_uses_camel_case() {
        let state: CanvasState = serde_json::from_value(json!({
            "version": "v9",
            "updatedAt": "2024-03-01T12:00:00Z"
        }))
        .unwrap();
        assert_eq!(state.version, "v9");
        assert!(state.nodes.is_empty());
        assert!(state.transactions.is_empty());
    }
}
