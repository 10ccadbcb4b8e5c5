//! Concurrent-edit merge and version conflicts.

use crate::state::CanvasState;
use crate::transaction::{Transaction, TxId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Local and remote states whose version lineages diverged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionConflict {
    /// The client's state.
    pub local_state: CanvasState,
    /// The server's authoritative state.
    pub remote_state: CanvasState,
}

impl VersionConflict {
    /// Creates a conflict from both sides.
    pub fn new(local_state: CanvasState, remote_state: CanvasState) -> Self {
        Self {
            local_state,
            remote_state,
        }
    }

    /// Returns what a user needs to pick a side.
    pub fn summary(&self) -> ConflictSummary {
        ConflictSummary {
            local_version: self.local_state.version.clone(),
            remote_version: self.remote_state.version.clone(),
            local_modified: self.local_state.last_modified(),
            remote_modified: self.remote_state.last_modified(),
            local_unsynced: self
                .local_state
                .transactions
                .iter()
                .filter(|tx| !tx.is_synced())
                .count(),
        }
    }
}

/// The side a conflict was resolved in favour of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictChoice {
    /// Keep the local state and make it authoritative.
    Local,
    /// Discard the local state and adopt the server's.
    Remote,
}

impl fmt::Display for ConflictChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictChoice::Local => f.write_str("local"),
            ConflictChoice::Remote => f.write_str("remote"),
        }
    }
}

/// A presentable digest of a [`VersionConflict`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictSummary {
    /// Local version ID.
    pub local_version: String,
    /// Remote version ID.
    pub remote_version: String,
    /// Last modification of the local state.
    pub local_modified: DateTime<Utc>,
    /// Last modification of the remote state.
    pub remote_modified: DateTime<Utc>,
    /// Local transactions the server has not acknowledged.
    pub local_unsynced: usize,
}

/// Result of merging a local state with the server's.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// A single state both sides agree on.
    Merged(CanvasState),
    /// The lineages diverged with unsynced local work at stake.
    Conflict(VersionConflict),
}

/// Merges a local state with the server's current state.
///
/// - Same version: the remote base with the union of both logs. An entry the
///   local side has not synced wins over the remote copy of the same `tx_id`,
///   and IDs the local side discarded stay out.
/// - Different versions, nothing unsynced locally: the remote state.
/// - Different versions with unsynced local work: a [`VersionConflict`].
pub fn merge_states(local: &CanvasState, remote: &CanvasState) -> MergeOutcome {
    if local.version == remote.version {
        let local_by_id: HashMap<&TxId, &Transaction> =
            local.transactions.iter().map(|tx| (&tx.tx_id, tx)).collect();

        let transactions = remote
            .transactions
            .iter()
            .filter(|remote_tx| !local.is_discarded(&remote_tx.tx_id))
            .map(|remote_tx| match local_by_id.get(&remote_tx.tx_id) {
                Some(local_tx) if !local_tx.is_synced() => (*local_tx).clone(),
                _ => remote_tx.clone(),
            })
            .collect();
        let base = CanvasState {
            transactions,
            discarded: local.discarded.clone(),
            ..remote.clone()
        };
        let (merged, _) = base.carry_over(&local.transactions_not_in(remote));
        return MergeOutcome::Merged(merged);
    }

    if !local.has_unsynced() {
        return MergeOutcome::Merged(remote.clone());
    }

    MergeOutcome::Conflict(VersionConflict::new(local.clone(), remote.clone()))
}
