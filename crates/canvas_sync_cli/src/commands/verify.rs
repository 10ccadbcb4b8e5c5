//! Verify command implementation.

use super::CommandResult;
use canvas_sync_protocol::{CanvasState, TxId};
use std::collections::HashSet;
use std::path::Path;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of transactions checked.
    pub checked: usize,
    /// Number of transactions that replayed cleanly.
    pub applied: usize,
    /// Violations found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs the verify command. Fails if any violation is found.
pub fn run(path: &Path, canvas_id: &str) -> CommandResult<()> {
    println!("Verifying canvas {canvas_id:?} at {}", path.display());
    println!();

    let store = super::open_store(path)?;
    let state = super::load_canvas(&store, canvas_id)?;
    let result = verify(&state);

    println!("  Transactions checked: {}", result.checked);
    println!("  Applied on replay:    {}", result.applied);
    for error in &result.errors {
        println!("  ERROR: {error}");
    }
    println!();

    if result.is_ok() {
        println!("✓ Canvas verification passed");
        Ok(())
    } else {
        println!("✗ Canvas verification failed");
        tracing::error!(canvas_id, violations = result.errors.len(), "verification failed");
        Err("Verification failed".into())
    }
}

/// Checks the log invariants of one canvas state.
///
/// - every `tx_id` appears once
/// - `created_at` never decreases along the log
/// - every active transaction replays onto the graph built so far
pub fn verify(state: &CanvasState) -> VerifyResult {
    let mut result = VerifyResult {
        checked: state.transactions.len(),
        ..VerifyResult::default()
    };

    let mut seen: HashSet<&TxId> = HashSet::new();
    for tx in &state.transactions {
        if !seen.insert(&tx.tx_id) {
            result.errors.push(format!("duplicate transaction ID {}", tx.tx_id));
        }
    }

    for (index, pair) in state.transactions.windows(2).enumerate() {
        if pair[1].created_at < pair[0].created_at {
            result.errors.push(format!(
                "transaction {} at position {} was created before its predecessor {}",
                pair[1].tx_id,
                index + 1,
                pair[0].tx_id
            ));
        }
    }

    let replay = state.replay();
    result.applied = replay.applied;
    for skipped in replay.skipped {
        result.errors.push(format!(
            "transaction {} does not replay: {}",
            skipped.tx_id, skipped.reason
        ));
    }

    result
}
