//! Graph editor seam.

use canvas_sync_protocol::Graph;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

/// The host's graph editor.
///
/// The engine reads the editor's current collection to capture edits and
/// replaces it wholesale when a remote change, snapshot or undo/redo alters
/// the working graph.
pub trait GraphEditor: Send + Sync {
    /// Returns the editor's current nodes and edges.
    fn working_graph(&self) -> Graph;

    /// Replaces the editor's nodes and edges.
    fn set_working_graph(&self, graph: Graph);
}

/// An editor that only holds a graph in memory.
#[derive(Debug, Default)]
pub struct MemoryEditor {
    graph: RwLock<Graph>,
    replacements: AtomicUsize,
}

impl MemoryEditor {
    /// Creates an editor showing an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a local edit, as a user interaction would.
    pub fn edit(&self, f: impl FnOnce(&mut Graph)) {
        f(&mut self.graph.write());
    }

    /// Returns how many times the engine replaced the graph.
    pub fn replacements(&self) -> usize {
        self.replacements.load(Ordering::SeqCst)
    }
}

impl GraphEditor for MemoryEditor {
    fn working_graph(&self) -> Graph {
        self.graph.read().clone()
    }

    fn set_working_graph(&self, graph: Graph) {
        *self.graph.write() = graph;
        self.replacements.fetch_add(1, Ordering::SeqCst);
    }
}
