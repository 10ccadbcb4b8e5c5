//! Server-side canvas states.

use canvas_sync_protocol::{CanvasState, SyncedTransaction, Transaction, TxId, VersionConflict};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

/// The authoritative state of every canvas the server knows.
///
/// The ledger maintains:
/// - One [`CanvasState`] per canvas, whose `version` is the only version the
///   server accepts pushes for
/// - Transactions in `created_at` order, each stamped with `synced_at`
///
/// Every operation takes the write lock for its whole read-modify-write.
#[derive(Debug, Default)]
pub struct CanvasLedger {
    canvases: RwLock<HashMap<String, CanvasState>>,
}

impl CanvasLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current state of a canvas.
    pub fn state(&self, canvas_id: &str) -> Option<CanvasState> {
        self.canvases.read().get(canvas_id).cloned()
    }

    /// Replaces a canvas's state outright.
    ///
    /// Used to seed the ledger and to simulate edits made by other clients.
    pub fn insert(&self, canvas_id: impl Into<String>, state: CanvasState) {
        self.canvases.write().insert(canvas_id.into(), state);
    }

    /// Drops a transaction from a canvas's log. Returns true if it existed.
    pub fn remove_transaction(&self, canvas_id: &str, tx_id: &TxId) -> bool {
        let mut canvases = self.canvases.write();
        let Some(state) = canvases.get_mut(canvas_id) else {
            return false;
        };
        let before = state.transactions.len();
        state.transactions.retain(|tx| &tx.tx_id != tx_id);
        state.transactions.len() != before
    }

    /// Records pushed transactions.
    ///
    /// Returns `None` if the canvas is unknown or `version` is not current.
    /// Known IDs only have their revoked flag updated; new ones are inserted
    /// by `created_at` and stamped with `now`. A revoked entry the server
    /// never held is not stored. Every pushed ID is acknowledged.
    pub fn push(
        &self,
        canvas_id: &str,
        version: &str,
        transactions: &[Transaction],
        now: DateTime<Utc>,
    ) -> Option<Vec<SyncedTransaction>> {
        let mut canvases = self.canvases.write();
        let state = canvases.get_mut(canvas_id)?;
        if state.version != version {
            return None;
        }

        let mut acknowledged = Vec::with_capacity(transactions.len());
        let mut fresh = Vec::new();
        for tx in transactions {
            match state.transactions.iter_mut().find(|t| t.tx_id == tx.tx_id) {
                Some(existing) => {
                    existing.revoked = tx.revoked;
                    acknowledged.push(SyncedTransaction::new(
                        tx.tx_id.clone(),
                        existing.synced_at.unwrap_or(now),
                    ));
                }
                None => {
                    fresh.push(tx.synced(now));
                    acknowledged.push(SyncedTransaction::new(tx.tx_id.clone(), now));
                }
            }
        }

        let (mut next, _) = state.merge_remote(&fresh);
        next.updated_at = now;
        *state = next;
        Some(acknowledged)
    }

    /// Consolidates a submitted state into a new snapshot.
    ///
    /// A submitted version other than the current one is answered with a
    /// conflict holding both states. Otherwise the submitted log and the
    /// server's log are unioned (submitted entries win on duplicate IDs),
    /// replayed over the submitted base, and stored as the new base under a
    /// fresh version with an empty log. An unknown canvas is registered the
    /// same way.
    pub fn snapshot(
        &self,
        canvas_id: &str,
        submitted: &CanvasState,
        now: DateTime<Utc>,
    ) -> Result<CanvasState, VersionConflict> {
        let mut canvases = self.canvases.write();
        let union = match canvases.get(canvas_id) {
            Some(current) if current.version != submitted.version => {
                return Err(VersionConflict::new(submitted.clone(), current.clone()));
            }
            Some(current) => submitted.merge_remote(&current.transactions).0,
            None => submitted.clone(),
        };

        let base = union.reconstruct().strip_working();
        let consolidated = CanvasState::new(Uuid::new_v4().to_string(), base, now);
        canvases.insert(canvas_id.to_string(), consolidated.clone());
        Ok(consolidated)
    }

    /// Replaces a canvas's state with a submitted one, whatever the current
    /// version.
    ///
    /// The submitted working graph becomes the base of a fresh version with
    /// an empty log. Nothing from the server's previous state is kept.
    pub fn overwrite(
        &self,
        canvas_id: &str,
        submitted: &CanvasState,
        now: DateTime<Utc>,
    ) -> CanvasState {
        let base = submitted.reconstruct().strip_working();
        let replaced = CanvasState::new(Uuid::new_v4().to_string(), base, now);
        self.canvases
            .write()
            .insert(canvas_id.to_string(), replaced.clone());
        replaced
    }

    /// Returns transactions of `version` created at or after `since`.
    ///
    /// Empty if the canvas is unknown or the version is stale.
    pub fn transactions_since(
        &self,
        canvas_id: &str,
        version: &str,
        since: DateTime<Utc>,
    ) -> Vec<Transaction> {
        let canvases = self.canvases.read();
        match canvases.get(canvas_id) {
            Some(state) if state.version == version => state
                .transactions
                .iter()
                .filter(|tx| tx.created_at >= since)
                .cloned()
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Returns the IDs of all known canvases.
    pub fn canvas_ids(&self) -> Vec<String> {
        self.canvases.read().keys().cloned().collect()
    }

    /// Returns the number of known canvases.
    pub fn len(&self) -> usize {
        self.canvases.read().len()
    }

    /// Returns true if no canvas is known.
    pub fn is_empty(&self) -> bool {
        self.canvases.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas_sync_protocol::Graph;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn add(id: &str, secs: i64) -> Transaction {
        Transaction::new(
            id.into(),
            at(secs),
            json!({ "nodes": { "added": [{ "id": id, "body": {} }] } }),
        )
    }

    fn seeded() -> CanvasLedger {
        let ledger = CanvasLedger::new();
        ledger.insert("c", CanvasState::new("v1", Graph::default(), at(0)));
        ledger
    }

    #[test]
    fn push_requires_current_version() {
        let ledger = seeded();
        assert!(ledger.push("c", "v0", &[add("a", 1)], at(5)).is_none());
        assert!(ledger.push("unknown", "v1", &[add("a", 1)], at(5)).is_none());
        assert!(ledger.state("c").unwrap().transactions.is_empty());
    }

    #[test]
    fn push_inserts_by_creation_time_and_stamps() {
        let ledger = seeded();
        ledger.push("c", "v1", &[add("b", 2)], at(5)).unwrap();
        let acks = ledger.push("c", "v1", &[add("a", 1)], at(6)).unwrap();
        assert_eq!(acks[0].synced_at, at(6));

        let state = ledger.state("c").unwrap();
        let ids: Vec<_> = state.transactions.iter().map(|t| t.tx_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(state.transactions.iter().all(Transaction::is_synced));
        assert_eq!(state.updated_at, at(6));
    }

    #[test]
    fn repush_updates_revoked_flag() {
        let ledger = seeded();
        ledger.push("c", "v1", &[add("a", 1)], at(5)).unwrap();
        let acks = ledger
            .push("c", "v1", &[add("a", 1).with_revoked(true)], at(9))
            .unwrap();

        // The original stamp is kept
        assert_eq!(acks[0].synced_at, at(5));
        let state = ledger.state("c").unwrap();
        assert_eq!(state.transactions.len(), 1);
        assert!(state.transactions[0].revoked);
    }

    #[test]
    fn snapshot_consolidates_union_of_logs() {
        let ledger = seeded();
        ledger.push("c", "v1", &[add("server", 1)], at(5)).unwrap();

        let mut submitted = CanvasState::new("v1", Graph::default(), at(0));
        submitted.transactions = vec![add("client", 2), add("gone", 3).with_revoked(true)];

        let next = ledger.snapshot("c", &submitted, at(10)).unwrap();
        assert_ne!(next.version, "v1");
        assert!(next.transactions.is_empty());
        let mut nodes: Vec<_> = next.nodes.iter().map(|n| n.id.as_str()).collect();
        nodes.sort();
        assert_eq!(nodes, vec!["client", "server"]);
        assert_eq!(ledger.state("c"), Some(next));
    }

    #[test]
    fn revoked_unknown_entries_are_acknowledged_but_not_stored() {
        let ledger = seeded();
        let acks = ledger
            .push("c", "v1", &[add("a", 1), add("b", 2).with_revoked(true)], at(5))
            .unwrap();
        assert_eq!(acks.len(), 2);

        let state = ledger.state("c").unwrap();
        let ids: Vec<_> = state.transactions.iter().map(|t| t.tx_id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[test]
    fn overwrite_ignores_the_current_lineage() {
        let ledger = seeded();
        ledger.push("c", "v1", &[add("server", 1)], at(5)).unwrap();

        let mut submitted = CanvasState::new("elsewhere", Graph::default(), at(0));
        submitted.transactions = vec![add("mine", 2)];

        let replaced = ledger.overwrite("c", &submitted, at(10));
        assert_ne!(replaced.version, "v1");
        assert!(replaced.transactions.is_empty());
        let nodes: Vec<_> = replaced.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(nodes, vec!["mine"]);
        assert_eq!(ledger.state("c"), Some(replaced));
    }

    #[test]
    fn stale_snapshot_conflicts() {
        let ledger = seeded();
        let stale = CanvasState::new("v0", Graph::default(), at(0));
        let conflict = ledger.snapshot("c", &stale, at(10)).unwrap_err();
        assert_eq!(conflict.local_state.version, "v0");
        assert_eq!(conflict.remote_state.version, "v1");
        assert_eq!(ledger.state("c").unwrap().version, "v1");
    }

    #[test]
    fn snapshot_registers_unknown_canvas() {
        let ledger = CanvasLedger::new();
        let mut submitted = CanvasState::empty();
        submitted.transactions = vec![add("a", 1)];

        let registered = ledger.snapshot("new", &submitted, at(10)).unwrap();
        assert_eq!(registered.nodes.len(), 1);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn transactions_since_filters_by_version_and_time() {
        let ledger = seeded();
        ledger
            .push("c", "v1", &[add("a", 1), add("b", 5)], at(6))
            .unwrap();

        let recent = ledger.transactions_since("c", "v1", at(5));
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].tx_id.as_str(), "b");
        assert!(ledger.transactions_since("c", "v0", at(0)).is_empty());
        assert!(ledger.transactions_since("x", "v1", at(0)).is_empty());
    }

    #[test]
    fn remove_transaction() {
        let ledger = seeded();
        ledger.push("c", "v1", &[add("a", 1)], at(5)).unwrap();
        assert!(ledger.remove_transaction("c", &"a".into()));
        assert!(!ledger.remove_transaction("c", &"a".into()));
        assert!(ledger.state("c").unwrap().transactions.is_empty());
    }
}
