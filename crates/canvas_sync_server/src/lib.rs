//! # CanvasSync Server
//!
//! Reference in-memory server of record for CanvasSync.
//!
//! This crate provides:
//! - Handlers for the four remote operations (fetch state, push, snapshot,
//!   fetch transactions)
//! - Per-canvas authoritative state with version checks
//! - Snapshot consolidation into a fresh version
//! - Encoded message dispatch
//!
//! # Protocol
//!
//! The server accepts work only against a canvas's current version:
//! 1. Pushes to a stale version get `success: false`
//! 2. A stale snapshot gets a conflict holding both states
//! 3. A current snapshot collapses the log into a new base under a new
//!    version; every client then moves to that version
//! 4. Polls for a stale version return nothing

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod ledger;
mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use ledger::CanvasLedger;
pub use server::CanvasServer;
