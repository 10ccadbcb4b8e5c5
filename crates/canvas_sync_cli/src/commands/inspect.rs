//! Inspect command implementation.

use super::{CommandResult, Format};
use canvas_sync_protocol::CanvasState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

/// Canvas inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Canvas ID.
    pub canvas_id: String,
    /// Snapshot version.
    pub version: String,
    /// Snapshot creation time.
    pub updated_at: DateTime<Utc>,
    /// Latest snapshot or capture time.
    pub last_modified: DateTime<Utc>,
    /// Nodes in the base snapshot.
    pub base_nodes: usize,
    /// Edges in the base snapshot.
    pub base_edges: usize,
    /// Log statistics.
    pub log: LogStats,
    /// Nodes in the reconstructed working graph.
    pub working_nodes: usize,
    /// Edges in the reconstructed working graph.
    pub working_edges: usize,
    /// Transactions skipped during replay.
    pub skipped: Vec<String>,
}

/// Transaction log statistics.
#[derive(Debug, Default, Serialize)]
pub struct LogStats {
    /// Total entries.
    pub total: usize,
    /// Entries accepted by the server.
    pub synced: usize,
    /// Active entries still to be pushed.
    pub pending: usize,
    /// Undone entries.
    pub revoked: usize,
    /// Revocations the server has not acknowledged, discarded ones included.
    pub unsent_revocations: usize,
}

/// Runs the inspect command.
pub fn run(path: &Path, canvas_id: &str, format: Format) -> CommandResult<()> {
    let store = super::open_store(path)?;
    let state = super::load_canvas(&store, canvas_id)?;
    let result = inspect(canvas_id, &state);

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Format::Text => print_text_output(&result),
    }
    Ok(())
}

/// Computes statistics for one canvas.
pub fn inspect(canvas_id: &str, state: &CanvasState) -> InspectResult {
    let log = LogStats {
        total: state.transactions.len(),
        synced: state.transactions.iter().filter(|tx| tx.is_synced()).count(),
        pending: state.pending().len(),
        revoked: state.transactions.iter().filter(|tx| tx.revoked).count(),
        unsent_revocations: state.pending_revocations().len(),
    };
    let replay = state.replay();

    InspectResult {
        canvas_id: canvas_id.to_string(),
        version: state.version.clone(),
        updated_at: state.updated_at,
        last_modified: state.last_modified(),
        base_nodes: state.nodes.len(),
        base_edges: state.edges.len(),
        log,
        working_nodes: replay.graph.nodes.len(),
        working_edges: replay.graph.edges.len(),
        skipped: replay
            .skipped
            .iter()
            .map(|s| format!("{}: {}", s.tx_id, s.reason))
            .collect(),
    }
}

fn print_text_output(result: &InspectResult) {
    println!("Canvas Inspection");
    println!("=================");
    println!();
    println!("Canvas:   {}", result.canvas_id);
    println!("Version:  {}", result.version);
    println!("Snapshot: {}", result.updated_at.to_rfc3339());
    println!("Modified: {}", result.last_modified.to_rfc3339());
    println!();
    println!("Base snapshot:");
    println!("  Nodes: {}", result.base_nodes);
    println!("  Edges: {}", result.base_edges);
    println!();
    println!("Transaction log:");
    println!("  Total:   {}", result.log.total);
    println!("  Synced:  {}", result.log.synced);
    println!("  Pending: {}", result.log.pending);
    println!("  Revoked: {}", result.log.revoked);
    println!("  Unsent revocations: {}", result.log.unsent_revocations);
    println!();
    println!("Working graph:");
    println!("  Nodes: {}", result.working_nodes);
    println!("  Edges: {}", result.working_edges);

    if !result.skipped.is_empty() {
        println!();
        println!("Skipped during replay:");
        for skipped in &result.skipped {
            println!("  {skipped}");
        }
    }
}
