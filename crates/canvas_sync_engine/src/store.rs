//! Typed canvas persistence over a key-value store.

use crate::error::{SyncError, SyncResult};
use canvas_sync_protocol::{decode_state, encode_state, CanvasState};
use canvas_sync_storage::{KeyValueStore, StorageError};
use std::sync::Arc;

const KEY_PREFIX: &str = "canvas-state:";

/// Returns the store key of a canvas.
pub fn state_key(canvas_id: &str) -> String {
    format!("{KEY_PREFIX}{canvas_id}")
}

/// Persists one [`CanvasState`] per canvas, CBOR-encoded under
/// `canvas-state:<canvas_id>`.
///
/// All mutations go through [`update`](Self::update), which runs on the
/// backend's atomic read-modify-write.
#[derive(Clone)]
pub struct CanvasStore {
    backend: Arc<dyn KeyValueStore>,
}

impl CanvasStore {
    /// Wraps a key-value backend.
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Loads the stored state of a canvas.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Corrupted`] if the stored bytes do not decode.
    pub fn load(&self, canvas_id: &str) -> SyncResult<Option<CanvasState>> {
        self.backend
            .get(&state_key(canvas_id))?
            .map(|bytes| decode(canvas_id, &bytes))
            .transpose()
    }

    /// Atomically transforms the stored state.
    ///
    /// `f` receives the current state (if any) and returns the replacement,
    /// or `None` to leave the store untouched. Returns the written state.
    ///
    /// # Errors
    ///
    /// A stored value that fails to decode is reported as corrupted and is
    /// never overwritten.
    pub fn update<F>(&self, canvas_id: &str, mut f: F) -> SyncResult<Option<CanvasState>>
    where
        F: FnMut(Option<CanvasState>) -> Option<CanvasState>,
    {
        let mut failure: Option<SyncError> = None;
        let mut written: Option<CanvasState> = None;

        self.backend.update(&state_key(canvas_id), &mut |current| {
            failure = None;
            written = None;
            let current = match current.map(|bytes| decode(canvas_id, bytes)).transpose() {
                Ok(current) => current,
                Err(e) => {
                    failure = Some(e);
                    return None;
                }
            };
            let next = f(current)?;
            match encode_state(&next) {
                Ok(bytes) => {
                    written = Some(next);
                    Some(bytes)
                }
                Err(e) => {
                    failure = Some(e.into());
                    None
                }
            }
        })?;

        match failure {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }

    /// Replaces the stored state unconditionally.
    pub fn save(&self, canvas_id: &str, state: &CanvasState) -> SyncResult<()> {
        self.backend
            .set(&state_key(canvas_id), &encode_state(state)?)?;
        Ok(())
    }

    /// Lists the canvases that have a stored state.
    pub fn canvas_ids(&self) -> SyncResult<Vec<String>> {
        Ok(self
            .backend
            .keys()?
            .into_iter()
            .filter_map(|key| key.strip_prefix(KEY_PREFIX).map(str::to_string))
            .collect())
    }
}

fn decode(canvas_id: &str, bytes: &[u8]) -> SyncResult<CanvasState> {
    decode_state(bytes).map_err(|e| {
        SyncError::Storage(StorageError::Corrupted(format!("canvas {canvas_id}: {e}")))
    })
}
