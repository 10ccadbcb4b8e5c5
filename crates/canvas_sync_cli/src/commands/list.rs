//! List command implementation.

use super::{CommandResult, Format};
use canvas_sync_engine::CanvasStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

/// One line of the canvas listing.
#[derive(Debug, Serialize)]
pub struct CanvasSummary {
    /// Canvas ID.
    pub canvas_id: String,
    /// Snapshot version.
    pub version: String,
    /// Log length.
    pub transactions: usize,
    /// Entries not yet accepted by the server.
    pub unsynced: usize,
    /// Latest snapshot or capture time.
    pub last_modified: DateTime<Utc>,
}

/// Runs the list command.
pub fn run(path: &Path, format: Format) -> CommandResult<()> {
    let store = super::open_store(path)?;
    let canvases = collect(&store)?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&canvases)?),
        Format::Text => {
            if canvases.is_empty() {
                println!("No canvases stored at {}", path.display());
            }
            for canvas in &canvases {
                println!(
                    "{}  version={}  transactions={}  unsynced={}  modified={}",
                    canvas.canvas_id,
                    canvas.version,
                    canvas.transactions,
                    canvas.unsynced,
                    canvas.last_modified.to_rfc3339()
                );
            }
        }
    }
    Ok(())
}

/// Summarizes every stored canvas, sorted by ID.
pub fn collect(store: &CanvasStore) -> CommandResult<Vec<CanvasSummary>> {
    let mut ids = store.canvas_ids()?;
    ids.sort();

    let mut canvases = Vec::with_capacity(ids.len());
    for canvas_id in ids {
        let Some(state) = store.load(&canvas_id)? else {
            continue;
        };
        canvases.push(CanvasSummary {
            version: state.version.clone(),
            transactions: state.transactions.len(),
            unsynced: state
                .transactions
                .iter()
                .filter(|tx| tx.synced_at.is_none())
                .count(),
            last_modified: state.last_modified(),
            canvas_id,
        });
    }
    Ok(canvases)
}
