//! Dump-log command implementation.

use super::{CommandResult, Format};
use canvas_sync_protocol::{CanvasState, ElementDelta, Transaction};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

/// Transaction representation for output.
#[derive(Debug, Serialize)]
pub struct TransactionInfo {
    /// Position in the log.
    pub index: usize,
    /// Transaction ID.
    pub tx_id: String,
    /// Capture time.
    pub created_at: DateTime<Utc>,
    /// Server acceptance time, if synced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<DateTime<Utc>>,
    /// Whether the entry is undone.
    pub revoked: bool,
    /// Short description of the delta, or why it does not decode.
    pub summary: String,
}

/// Runs the dump-log command.
pub fn run(
    path: &Path,
    canvas_id: &str,
    limit: Option<usize>,
    format: Format,
) -> CommandResult<()> {
    let store = super::open_store(path)?;
    let state = super::load_canvas(&store, canvas_id)?;
    let entries = describe(&state, limit);

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        Format::Text => print_text_output(&entries),
    }
    Ok(())
}

/// Describes the first `limit` log entries.
pub fn describe(state: &CanvasState, limit: Option<usize>) -> Vec<TransactionInfo> {
    state
        .transactions
        .iter()
        .take(limit.unwrap_or(usize::MAX))
        .enumerate()
        .map(|(index, tx)| TransactionInfo {
            index,
            tx_id: tx.tx_id.to_string(),
            created_at: tx.created_at,
            synced_at: tx.synced_at,
            revoked: tx.revoked,
            summary: summarize(tx),
        })
        .collect()
}

fn summarize(tx: &Transaction) -> String {
    match tx.delta() {
        Ok(delta) => format!(
            "{}, {}",
            counts("nodes", &delta.nodes),
            counts("edges", &delta.edges)
        ),
        Err(e) => format!("undecodable: {e}"),
    }
}

fn counts(name: &str, delta: &ElementDelta) -> String {
    format!(
        "{name} +{} ~{} -{}",
        delta.added.len(),
        delta.updated.len(),
        delta.removed.len()
    )
}

fn print_text_output(entries: &[TransactionInfo]) {
    if entries.is_empty() {
        println!("Transaction log is empty");
        return;
    }
    for entry in entries {
        let status = if entry.revoked {
            "revoked"
        } else if entry.synced_at.is_some() {
            "synced"
        } else {
            "pending"
        };
        println!(
            "[{:>4}] {} {} {:<8} {}",
            entry.index,
            entry.created_at.to_rfc3339(),
            entry.tx_id,
            status,
            entry.summary
        );
    }
}
