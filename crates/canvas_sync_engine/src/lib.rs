//! # CanvasSync Engine
//!
//! Keeps a locally cached canvas consistent with the server of record.
//!
//! This crate provides:
//! - [`SyncSession`]: debounced and immediate local capture, periodic push
//!   and poll cycles, undo/redo and teardown for one canvas
//! - [`VersionManager`]: collapses long logs into server snapshots
//! - [`ConflictResolver`]: settles diverged lineages, defaulting to the
//!   server's version
//! - [`FailureMonitor`]: consecutive-failure counting and degraded mode
//! - [`CanvasRegistry`]: suppresses repeated initialization
//! - [`CanvasStore`]: typed persistence over a key-value backend
//! - [`RemoteService`] and [`GraphEditor`] seams, with test doubles
//!
//! ## Architecture
//!
//! Three activities run independently, each behind its own re-entrancy
//! lock:
//! 1. Local capture diffs the editor against the stored state and appends
//!    a transaction
//! 2. Push sends pending transactions and records acknowledgements
//! 3. Poll merges remote transactions the client does not have yet
//!
//! ## Key Invariants
//!
//! - Every store mutation is an atomic read-modify-write
//! - Edits not yet captured are flushed before the editor graph is replaced
//! - A conflict never silently favours local work
//! - Remote failures are never fatal; they are retried next cycle

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod editor;
mod error;
mod monitor;
mod registry;
mod resolver;
mod session;
mod store;
mod transport;
mod version;

pub use config::SyncConfig;
pub use editor::{GraphEditor, MemoryEditor};
pub use error::{SyncError, SyncResult};
pub use monitor::FailureMonitor;
pub use registry::CanvasRegistry;
pub use resolver::{
    AuditEvent, ConflictPrompt, ConflictResolver, DecidedBy, Resolution, AUDIT_TARGET,
};
pub use session::{ForceSync, InitOutcome, PollOutcome, PushOutcome, SyncSession};
pub use store::{state_key, CanvasStore};
pub use transport::{MockRemote, RemoteService};
pub use version::{SnapshotOutcome, SnapshotPhase, VersionManager};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
