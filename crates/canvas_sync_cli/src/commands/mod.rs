//! CLI command implementations.

pub mod dump_log;
pub mod inspect;
pub mod list;
pub mod verify;
pub mod working;

use canvas_sync_engine::CanvasStore;
use canvas_sync_protocol::CanvasState;
use canvas_sync_storage::FileStore;
use clap::ValueEnum;
use std::path::Path;
use std::sync::Arc;

/// Result type shared by all commands.
pub type CommandResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Output format for commands that support both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Opens the canvas store at `path`. The directory must already exist.
pub fn open_store(path: &Path) -> CommandResult<CanvasStore> {
    if !path.is_dir() {
        return Err(format!("No canvas store found at {}", path.display()).into());
    }
    let backend = FileStore::open(path)?;
    Ok(CanvasStore::new(Arc::new(backend)))
}

/// Loads one canvas, failing if it is not stored.
pub fn load_canvas(store: &CanvasStore, canvas_id: &str) -> CommandResult<CanvasState> {
    store
        .load(canvas_id)?
        .ok_or_else(|| format!("Canvas {canvas_id:?} not found").into())
}
