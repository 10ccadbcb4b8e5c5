//! Test fixtures and session helpers.
//!
//! Provides deterministic timestamps, payload builders, temporary file
//! stores and a ready-made device (store, editor and session) for
//! end-to-end scenarios.

use canvas_sync_engine::{
    CanvasRegistry, CanvasStore, ForceSync, GraphEditor, MemoryEditor, PushOutcome,
    RemoteService, SyncConfig, SyncResult, SyncSession,
};
use canvas_sync_protocol::{CanvasState, Element, Graph, Transaction, TxId};
use canvas_sync_storage::{FileStore, InMemoryStore};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// A fixed instant `secs` seconds after 2023-11-14T22:13:20Z.
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0)
        .single()
        .expect("Timestamp out of range")
}

/// A node with a `label` body.
pub fn node(id: &str) -> Element {
    Element::new(id, json!({ "label": id }))
}

/// A payload adding one labelled node.
pub fn add_node(id: &str) -> Value {
    json!({ "nodes": { "added": [{ "id": id, "body": { "label": id } }] } })
}

/// A payload removing one node.
pub fn remove_node(id: &str) -> Value {
    json!({ "nodes": { "removed": [id] } })
}

/// A transaction created at [`at`]`(secs)`.
pub fn tx_at(id: &str, secs: i64, payload: Value) -> Transaction {
    Transaction::new(TxId::from(id), at(secs), payload)
}

/// A state over an empty base holding `transactions`.
pub fn state_with(version: &str, transactions: Vec<Transaction>) -> CanvasState {
    let mut state = CanvasState::new(version, Graph::default(), at(0));
    state.transactions = transactions;
    state
}

/// Returns the sorted node IDs of a graph.
pub fn node_ids(graph: &Graph) -> Vec<String> {
    let mut ids: Vec<String> = graph.nodes.iter().map(|n| n.id.clone()).collect();
    ids.sort();
    ids
}

/// A file store in a temporary directory with automatic cleanup.
pub struct TempFileStore {
    /// The store instance.
    pub store: Arc<FileStore>,
    /// The temporary directory (kept alive to prevent cleanup).
    dir: TempDir,
}

impl TempFileStore {
    /// Creates a store in a fresh temporary directory.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::open(dir.path()).expect("Failed to open file store");
        Self {
            store: Arc::new(store),
            dir,
        }
    }

    /// Returns the store directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Returns a typed canvas store over this directory.
    pub fn canvas_store(&self) -> CanvasStore {
        CanvasStore::new(self.store.clone())
    }
}

impl Default for TempFileStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a test with a temporary file-backed canvas store.
///
/// # Example
///
/// ```rust
/// use canvas_sync_testkit::{state_with, with_temp_store};
///
/// with_temp_store(|store| {
///     store.save("c", &state_with("v1", vec![])).unwrap();
///     assert_eq!(store.canvas_ids().unwrap(), vec!["c".to_string()]);
/// });
/// ```
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&CanvasStore) -> R,
{
    let temp = TempFileStore::new();
    f(&temp.canvas_store())
}

/// One simulated client: an in-memory store, an editor and a session.
pub struct TestDevice {
    /// Raw backend, for write counting.
    pub backend: Arc<InMemoryStore>,
    /// Typed store over `backend`.
    pub store: CanvasStore,
    /// The editor the session captures from.
    pub editor: Arc<MemoryEditor>,
    /// The session under test.
    pub session: SyncSession,
}

impl TestDevice {
    /// Creates a device syncing `canvas_id` with `remote`.
    pub fn new(canvas_id: &str, remote: Arc<dyn RemoteService>, config: SyncConfig) -> Self {
        let backend = Arc::new(InMemoryStore::new());
        let store = CanvasStore::new(backend.clone());
        let editor = Arc::new(MemoryEditor::new());
        let registry = Arc::new(CanvasRegistry::new(config.init_cooldown));
        let session = SyncSession::new(
            canvas_id,
            config,
            store.clone(),
            remote,
            editor.clone(),
            registry,
        );
        Self {
            backend,
            store,
            editor,
            session,
        }
    }

    /// Adds a labelled node in the editor without capturing.
    pub fn add(&self, id: &str) {
        self.editor.edit(|g| g.nodes.push(node(id)));
    }

    /// Removes a node in the editor without capturing.
    pub fn remove(&self, id: &str) {
        self.editor.edit(|g| g.nodes.retain(|n| n.id != id));
    }

    /// Adds a node and captures it immediately.
    pub async fn add_and_capture(&self, id: &str) -> SyncResult<Option<TxId>> {
        self.add(id);
        self.session.sync_local_now().await
    }

    /// Captures and pushes, bypassing the grace period.
    pub async fn push(&self) -> SyncResult<PushOutcome> {
        self.session
            .force_sync_state(ForceSync {
                sync_remote: true,
                transactions: None,
            })
            .await
    }

    /// Returns the sorted node IDs shown in the editor.
    pub fn nodes(&self) -> Vec<String> {
        node_ids(&self.editor.working_graph())
    }

    /// Returns the persisted state.
    pub fn stored(&self) -> Option<CanvasState> {
        self.store
            .load(self.session.canvas_id())
            .expect("Failed to load canvas state")
    }
}
