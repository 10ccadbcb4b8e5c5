//! Working-graph reconstruction.

use crate::error::ApplyError;
use crate::graph::Graph;
use crate::state::CanvasState;
use crate::transaction::{Transaction, TxId};

/// A transaction that could not be applied during replay.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedTransaction {
    /// The skipped transaction.
    pub tx_id: TxId,
    /// Why it was skipped.
    pub reason: ApplyError,
}

/// The outcome of replaying a state's log onto its base snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Replay {
    /// The reconstructed working graph.
    pub graph: Graph,
    /// Number of transactions applied.
    pub applied: usize,
    /// Transactions that were skipped because they did not apply cleanly.
    pub skipped: Vec<SkippedTransaction>,
}

impl CanvasState {
    /// Replays every non-revoked transaction, in `created_at` order, onto a
    /// copy of the base snapshot.
    ///
    /// A transaction whose payload is malformed or does not apply to the
    /// graph built so far is skipped as a whole; replay continues with the
    /// next one. The state itself is never modified.
    pub fn replay(&self) -> Replay {
        let mut active: Vec<&Transaction> =
            self.transactions.iter().filter(|tx| !tx.revoked).collect();
        // Stable, so equal timestamps keep log order
        active.sort_by_key(|tx| tx.created_at);

        let mut graph = self.base_graph();
        let mut applied = 0;
        let mut skipped = Vec::new();

        for tx in active {
            match tx.delta().and_then(|delta| graph.apply(&delta)) {
                Ok(next) => {
                    graph = next;
                    applied += 1;
                }
                Err(reason) => skipped.push(SkippedTransaction {
                    tx_id: tx.tx_id.clone(),
                    reason,
                }),
            }
        }

        Replay {
            graph,
            applied,
            skipped,
        }
    }

    /// Reconstructs the working graph, logging skipped transactions.
    pub fn reconstruct(&self) -> Graph {
        let replay = self.replay();
        for skipped in &replay.skipped {
            tracing::warn!(
                version = %self.version,
                tx_id = %skipped.tx_id,
                reason = %skipped.reason,
                "skipping transaction during replay"
            );
        }
        replay.graph
    }
}
