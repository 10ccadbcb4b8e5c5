//! Transaction log operations.
//!
//! All operations return a new [`CanvasState`]; the input is never mutated,
//! so a state being replayed elsewhere cannot observe a half-applied change.

use crate::messages::SyncedTransaction;
use crate::state::CanvasState;
use crate::transaction::{Transaction, TxId};
use chrono::{DateTime, Utc};
use std::collections::HashSet;

impl CanvasState {
    /// Appends a freshly captured transaction.
    ///
    /// Revoked entries are discarded first: a new edit permanently drops
    /// undone history instead of branching it. Entries whose revocation the
    /// server has not acknowledged move to [`discarded`](Self::discarded)
    /// until it has.
    #[must_use]
    pub fn append(&self, tx: Transaction) -> Self {
        let (revoked, mut transactions): (Vec<Transaction>, Vec<Transaction>) = self
            .transactions
            .iter()
            .cloned()
            .partition(|existing| existing.revoked);
        transactions.push(tx);

        let mut discarded = self.discarded.clone();
        discarded.extend(revoked.into_iter().filter(|tx| !tx.is_synced()));
        Self {
            transactions,
            discarded,
            ..self.clone()
        }
    }

    /// Stamps a transaction as accepted by the server.
    ///
    /// Idempotent. Unknown IDs are ignored: the transaction may have been
    /// superseded by a snapshot in the meantime.
    #[must_use]
    pub fn mark_synced(&self, tx_id: &TxId, synced_at: DateTime<Utc>) -> Self {
        self.mark_all_synced(&[SyncedTransaction::new(tx_id.clone(), synced_at)])
    }

    /// Applies a batch of server acknowledgements.
    ///
    /// Acknowledged discarded entries are forgotten: the server now holds
    /// their revocation.
    #[must_use]
    pub fn mark_all_synced(&self, acknowledged: &[SyncedTransaction]) -> Self {
        let stamp = |tx: &Transaction| acknowledged.iter().find(|ack| ack.tx_id == tx.tx_id);
        let transactions = self
            .transactions
            .iter()
            .map(|tx| match stamp(tx) {
                Some(ack) => tx.synced(ack.synced_at),
                None => tx.clone(),
            })
            .collect();
        let discarded = self
            .discarded
            .iter()
            .filter(|tx| stamp(*tx).is_none())
            .cloned()
            .collect();
        Self {
            transactions,
            discarded,
            ..self.clone()
        }
    }

    /// Applies the acknowledgements of a push that sent `sent`.
    ///
    /// Like [`mark_all_synced`](Self::mark_all_synced), but an entry whose
    /// revoked flag changed while the push was in flight keeps its cleared
    /// stamp, so the new flag goes out with the next push.
    #[must_use]
    pub fn acknowledge(&self, sent: &[Transaction], acknowledged: &[SyncedTransaction]) -> Self {
        let unchanged: Vec<SyncedTransaction> = acknowledged
            .iter()
            .filter(|ack| {
                let sent = sent.iter().find(|tx| tx.tx_id == ack.tx_id);
                match (sent, self.logged_or_discarded(&ack.tx_id)) {
                    (Some(sent), Some(now)) => sent.revoked == now.revoked,
                    _ => true,
                }
            })
            .cloned()
            .collect();
        self.mark_all_synced(&unchanged)
    }

    fn logged_or_discarded(&self, tx_id: &TxId) -> Option<&Transaction> {
        self.transaction(tx_id)
            .or_else(|| self.discarded.iter().find(|tx| &tx.tx_id == tx_id))
    }

    /// Merges transactions received from the server.
    ///
    /// - New entries are inserted by `created_at` without reordering existing
    ///   ones; ties keep the local entry first.
    /// - Revoked entries this log does not hold are skipped, as are IDs this
    ///   log discarded.
    /// - A local entry the server already acknowledged takes the server's
    ///   revoked flag, so undo and redo on other clients show up here. An
    ///   unsynced local entry wins.
    ///
    /// Returns the merged state and the number of entries inserted or
    /// updated.
    #[must_use]
    pub fn merge_remote(&self, remote: &[Transaction]) -> (Self, usize) {
        let mut updated = 0;
        let mut transactions = self.transactions.clone();
        for remote_tx in remote {
            if let Some(local) = transactions.iter_mut().find(|tx| tx.tx_id == remote_tx.tx_id) {
                if local.is_synced() && local.revoked != remote_tx.revoked {
                    local.revoked = remote_tx.revoked;
                    updated += 1;
                }
            }
        }

        let incoming: Vec<Transaction> = remote
            .iter()
            .filter(|tx| !tx.revoked && !self.is_discarded(&tx.tx_id))
            .cloned()
            .collect();
        let (merged, added) = Self {
            transactions,
            ..self.clone()
        }
        .carry_over(&incoming);
        (merged, added + updated)
    }

    /// Inserts entries this log does not hold, revoked ones included.
    ///
    /// Used to re-apply local entries on top of another state. New entries
    /// are inserted by `created_at`; ties keep the existing entry first.
    /// Returns the merged state and the number of entries inserted.
    #[must_use]
    pub fn carry_over(&self, entries: &[Transaction]) -> (Self, usize) {
        let mut known: HashSet<&TxId> = self.transactions.iter().map(|tx| &tx.tx_id).collect();
        let mut incoming: Vec<Transaction> = entries
            .iter()
            .filter(|tx| known.insert(&tx.tx_id))
            .cloned()
            .collect();

        if incoming.is_empty() {
            return (self.clone(), 0);
        }
        incoming.sort_by_key(|tx| tx.created_at);
        let added = incoming.len();

        let mut merged = Vec::with_capacity(self.transactions.len() + added);
        let mut existing = self.transactions.iter().peekable();
        for tx in incoming {
            while let Some(local) = existing.next_if(|local| local.created_at <= tx.created_at) {
                merged.push(local.clone());
            }
            merged.push(tx);
        }
        merged.extend(existing.cloned());

        (
            Self {
                transactions: merged,
                ..self.clone()
            },
            added,
        )
    }

    /// Keeps the discarded entries of `other` if both states share a version.
    #[must_use]
    pub fn keeping_discarded(&self, other: &CanvasState) -> Self {
        if self.version != other.version {
            return self.clone();
        }
        let mut discarded = self.discarded.clone();
        for tx in &other.discarded {
            if !self.is_discarded(&tx.tx_id) && !self.contains(&tx.tx_id) {
                discarded.push(tx.clone());
            }
        }
        Self {
            discarded,
            ..self.clone()
        }
    }

    /// Returns the transactions that still have to be pushed: unsynced and
    /// not revoked, in log order.
    pub fn pending(&self) -> Vec<Transaction> {
        self.transactions
            .iter()
            .filter(|tx| tx.is_pending())
            .cloned()
            .collect()
    }

    /// Returns revocations the server has not acknowledged: unsynced revoked
    /// entries of the log, then the discarded ones.
    pub fn pending_revocations(&self) -> Vec<Transaction> {
        self.transactions
            .iter()
            .filter(|tx| tx.revoked && !tx.is_synced())
            .chain(self.discarded.iter())
            .cloned()
            .collect()
    }

    /// Returns everything a push sends by default: [`pending`](Self::pending)
    /// followed by [`pending_revocations`](Self::pending_revocations).
    pub fn outgoing(&self) -> Vec<Transaction> {
        let mut outgoing = self.pending();
        outgoing.extend(self.pending_revocations());
        outgoing
    }

    /// Returns active local transactions the given server list does not hold.
    pub fn missing_from(&self, server: &[Transaction]) -> Vec<Transaction> {
        let known: HashSet<&TxId> = server.iter().map(|tx| &tx.tx_id).collect();
        self.transactions
            .iter()
            .filter(|tx| !tx.revoked && !known.contains(&tx.tx_id))
            .cloned()
            .collect()
    }

    /// Returns entries of this log that `other` does not hold.
    pub fn transactions_not_in(&self, other: &CanvasState) -> Vec<Transaction> {
        let known: HashSet<&TxId> = other.transactions.iter().map(|tx| &tx.tx_id).collect();
        self.transactions
            .iter()
            .filter(|tx| !known.contains(&tx.tx_id))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn tx(id: &str, secs: i64) -> Transaction {
        Transaction::new(id.into(), at(secs), json!({}))
    }

    fn state_with(transactions: Vec<Transaction>) -> CanvasState {
        let mut state = CanvasState::new("v1", Graph::default(), at(0));
        state.transactions = transactions;
        state
    }

    fn ids(state: &CanvasState) -> Vec<&str> {
        state.transactions.iter().map(|t| t.tx_id.as_str()).collect()
    }

    #[test]
    fn append_discards_revoked_history() {
        let state = state_with(vec![tx("a", 1), tx("b", 2).with_revoked(true)]);
        let next = state.append(tx("c", 3));
        assert_eq!(ids(&next), vec!["a", "c"]);
        // Input untouched
        assert_eq!(ids(&state), vec!["a", "b"]);
    }

    #[test]
    fn append_keeps_unacknowledged_revocations_aside() {
        let state = state_with(vec![
            tx("a", 1).synced(at(2)).with_revoked(true),
            tx("b", 2).with_revoked(true).synced(at(3)),
        ]);
        let next = state.append(tx("c", 4));
        assert_eq!(ids(&next), vec!["c"]);
        // "b" is revoked and acknowledged: the server already knows
        assert_eq!(next.discarded.len(), 1);
        assert!(next.is_discarded(&"a".into()));
        assert!(next.has_unsynced());

        let outgoing: Vec<_> = next.outgoing().iter().map(|t| t.tx_id.clone()).collect();
        assert_eq!(outgoing, vec![TxId::from("c"), TxId::from("a")]);
    }

    #[test]
    fn acknowledged_discards_are_forgotten() {
        let state = state_with(vec![tx("a", 1).with_revoked(true)]).append(tx("b", 2));
        let sent = state.outgoing();
        let acks = vec![
            SyncedTransaction::new("b".into(), at(5)),
            SyncedTransaction::new("a".into(), at(5)),
        ];
        let next = state.acknowledge(&sent, &acks);
        assert!(next.discarded.is_empty());
        assert!(next.transactions[0].is_synced());
        assert!(next.outgoing().is_empty());
    }

    #[test]
    fn acknowledge_skips_entries_toggled_in_flight() {
        let state = state_with(vec![tx("a", 1)]);
        let sent = state.outgoing();
        // Undone while the push was in flight
        let undone = state.undo().unwrap();

        let next = undone.acknowledge(&sent, &[SyncedTransaction::new("a".into(), at(5))]);
        assert!(!next.transactions[0].is_synced());
        assert_eq!(next.pending_revocations().len(), 1);
    }

    #[test]
    fn merge_remote_never_resurrects_discarded_entries() {
        let state = state_with(vec![tx("a", 1).synced(at(2)).with_revoked(true)])
            .append(tx("b", 3));
        let server = vec![tx("a", 1).synced(at(2)), tx("b", 3).synced(at(4))];

        let (merged, changed) = state.merge_remote(&server);
        assert_eq!(changed, 0);
        assert_eq!(ids(&merged), vec!["b"]);
    }

    #[test]
    fn merge_remote_skips_foreign_revoked_entries() {
        let state = state_with(vec![]);
        let (merged, changed) = state.merge_remote(&[tx("x", 1).synced(at(2)).with_revoked(true)]);
        assert_eq!(changed, 0);
        assert!(merged.transactions.is_empty());
    }

    #[test]
    fn merge_remote_follows_revocations_of_synced_entries() {
        let state = state_with(vec![tx("a", 1).synced(at(2)), tx("b", 2)]);
        let mut revoked_a = tx("a", 1).synced(at(2));
        revoked_a.revoked = true;
        let mut revoked_b = tx("b", 2).synced(at(3));
        revoked_b.revoked = true;

        let (merged, changed) = state.merge_remote(&[revoked_a, revoked_b]);
        assert_eq!(changed, 1);
        assert!(merged.transactions[0].revoked);
        assert!(merged.transactions[0].is_synced());
        // Unsynced local entries win
        assert!(!merged.transactions[1].revoked);
    }

    #[test]
    fn carry_over_keeps_revoked_entries() {
        let state = state_with(vec![tx("a", 1)]);
        let (merged, added) = state.carry_over(&[tx("b", 2).with_revoked(true)]);
        assert_eq!(added, 1);
        assert_eq!(ids(&merged), vec!["a", "b"]);
    }

    #[test]
    fn keeping_discarded_requires_same_version() {
        let old = state_with(vec![tx("a", 1).with_revoked(true)]).append(tx("b", 2));
        let same = state_with(vec![tx("b", 2)]);
        assert_eq!(same.keeping_discarded(&old).discarded.len(), 1);

        let newer = CanvasState::new("v2", Graph::default(), at(9));
        assert!(newer.keeping_discarded(&old).discarded.is_empty());
    }

    #[test]
    fn mark_synced_is_idempotent() {
        let state = state_with(vec![tx("a", 1)]);
        let once = state.mark_synced(&"a".into(), at(10));
        let twice = once.mark_synced(&"a".into(), at(10));
        assert_eq!(once, twice);
        assert_eq!(once.transactions[0].synced_at, Some(at(10)));
    }

    #[test]
    fn mark_synced_ignores_unknown_ids() {
        let state = state_with(vec![tx("a", 1)]);
        let next = state.mark_synced(&"gone".into(), at(10));
        assert_eq!(next, state);
    }

    #[test]
    fn merge_remote_deduplicates() {
        // [A(synced), B(unsynced)] + server [A, C] => [A, B, C]
        let local = state_with(vec![tx("a", 1).synced(at(5)), tx("b", 2)]);
        let server = vec![tx("a", 1).synced(at(5)), tx("c", 3).synced(at(6))];

        let (merged, added) = local.merge_remote(&server);
        assert_eq!(added, 1);
        assert_eq!(ids(&merged), vec!["a", "b", "c"]);
    }

    #[test]
    fn merge_remote_interleaves_by_created_at() {
        let local = state_with(vec![tx("a", 1), tx("c", 3)]);
        let (merged, added) = local.merge_remote(&[tx("d", 4), tx("b", 2)]);
        assert_eq!(added, 2);
        assert_eq!(ids(&merged), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn merge_remote_keeps_existing_order_on_ties() {
        let local = state_with(vec![tx("x", 5), tx("y", 5)]);
        let (merged, _) = local.merge_remote(&[tx("z", 5)]);
        assert_eq!(ids(&merged), vec!["x", "y", "z"]);
    }

    #[test]
    fn merge_remote_ignores_duplicates_within_batch() {
        let local = state_with(vec![]);
        let (merged, added) = local.merge_remote(&[tx("a", 1), tx("a", 1)]);
        assert_eq!(added, 1);
        assert_eq!(ids(&merged), vec!["a"]);
    }

    #[test]
    fn pending_skips_synced_and_revoked() {
        let state = state_with(vec![
            tx("a", 1).synced(at(2)),
            tx("b", 2),
            tx("c", 3).with_revoked(true),
        ]);
        let pending = state.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].tx_id.as_str(), "b");
    }

    #[test]
    fn missing_from_server_list() {
        let state = state_with(vec![
            tx("a", 1).synced(at(2)),
            tx("b", 2).synced(at(2)),
            tx("c", 3).with_revoked(true),
        ]);
        let missing = state.missing_from(&[tx("a", 1)]);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].tx_id.as_str(), "b");
    }
}
