//! Working command implementation: prints the reconstructed graph.

use super::CommandResult;
use canvas_sync_protocol::CanvasState;
use serde_json::Value;
use std::path::Path;

/// Runs the working command.
pub fn run(path: &Path, canvas_id: &str) -> CommandResult<()> {
    let store = super::open_store(path)?;
    let state = super::load_canvas(&store, canvas_id)?;
    println!("{}", serde_json::to_string_pretty(&working_graph(&state)?)?);
    Ok(())
}

/// Replays the log and returns the working graph as JSON.
pub fn working_graph(state: &CanvasState) -> CommandResult<Value> {
    Ok(serde_json::to_value(state.reconstruct())?)
}
