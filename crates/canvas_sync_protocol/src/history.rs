//! Undo/redo transforms over the transaction log.

use crate::state::CanvasState;

impl CanvasState {
    /// Revokes the newest active transaction.
    ///
    /// Returns `None` when there is nothing to undo (empty log, or every
    /// entry already revoked). The revoked entry loses its sync stamp and goes
    /// out with the next push.
    #[must_use]
    pub fn undo(&self) -> Option<Self> {
        let index = self.transactions.iter().rposition(|tx| !tx.revoked)?;
        Some(self.toggle(index, true))
    }

    /// Restores the oldest revoked transaction.
    ///
    /// Returns `None` when no entry is revoked.
    #[must_use]
    pub fn redo(&self) -> Option<Self> {
        let index = self.transactions.iter().position(|tx| tx.revoked)?;
        Some(self.toggle(index, false))
    }

    /// Returns true if [`undo`](Self::undo) would change the log.
    pub fn can_undo(&self) -> bool {
        self.transactions.iter().any(|tx| !tx.revoked)
    }

    /// Returns true if [`redo`](Self::redo) would change the log.
    pub fn can_redo(&self) -> bool {
        self.transactions.iter().any(|tx| tx.revoked)
    }

    fn toggle(&self, index: usize, revoked: bool) -> Self {
        let transactions = self
            .transactions
            .iter()
            .enumerate()
            .map(|(i, tx)| {
                if i == index {
                    tx.with_revoked(revoked)
                } else {
                    tx.clone()
                }
            })
            .collect();
        Self {
            transactions,
            ..self.clone()
        }
    }
}
