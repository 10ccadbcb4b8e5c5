//! # CanvasSync Protocol
//!
//! Canvas state model and transaction log for CanvasSync.
//!
//! This crate provides:
//! - [`Graph`] and [`Element`] for the editor's node/edge collection
//! - [`Transaction`] for captured deltas and [`CanvasState`] for versioned
//!   snapshots carrying a transaction log
//! - The diff engine ([`diff`]) that turns an edited graph into a delta
//! - Transaction log operations: append, mark synced, merge, replay
//! - Undo/redo transforms over the log
//! - Concurrent-edit merge and [`VersionConflict`] detection
//! - Wire messages and the CBOR state codec
//!
//! This is a pure protocol crate with no I/O operations. Every operation on a
//! [`CanvasState`] returns a new value and leaves its input untouched.
//!
//! ## Example
//!
//! ```rust
//! use canvas_sync_protocol::{diff, CanvasState, Element, Graph, Transaction};
//! use serde_json::json;
//!
//! let state = CanvasState::empty();
//! let mut edited = state.reconstruct();
//! edited.nodes.push(Element::new("n1", json!({"label": "hello"})));
//!
//! let delta = diff(&edited, &state.reconstruct()).unwrap();
//! let state = state.append(Transaction::capture(&delta).unwrap());
//! assert_eq!(state.reconstruct().nodes.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod conflict;
mod diff;
mod error;
mod graph;
mod history;
mod messages;
mod oplog;
mod replay;
mod state;
mod transaction;

pub use codec::{decode_message, decode_state, encode_message, encode_state};
pub use conflict::{merge_states, ConflictChoice, ConflictSummary, MergeOutcome, VersionConflict};
pub use diff::diff;
pub use error::{ApplyError, ProtocolError, ProtocolResult};
pub use graph::{Element, ElementDelta, ElementKind, Graph, GraphDelta};
pub use messages::{
    FetchStateRequest, FetchStateResponse, FetchTransactionsRequest, FetchTransactionsResponse,
    PushRequest, PushResponse, SnapshotRequest, SnapshotResponse, SyncMessage, SyncedTransaction,
};
pub use replay::{Replay, SkippedTransaction};
pub use state::CanvasState;
pub use transaction::{Transaction, TxId};
