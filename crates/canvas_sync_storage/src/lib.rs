//! # CanvasSync Storage
//!
//! Local persistent key-value store for CanvasSync.
//!
//! This crate provides the lowest-level persistence abstraction used by the
//! sync engine. Stores are **opaque byte maps** keyed by strings - they do not
//! interpret the values they hold.
//!
//! ## Design Principles
//!
//! - Stores are simple key-value maps (get, set, update)
//! - `update` is an atomic read-modify-write per key
//! - A crash mid-write leaves either the old or the new value, never a mix
//! - Must be `Send + Sync` for concurrent access
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral sessions
//! - [`FileStore`] - One file per key with atomic replace-on-write
//!
//! ## Example
//!
//! ```rust
//! use canvas_sync_storage::{KeyValueStore, InMemoryStore};
//!
//! let store = InMemoryStore::new();
//! store.set("canvas-state:demo", b"hello").unwrap();
//! assert_eq!(store.get("canvas-state:demo").unwrap(), Some(b"hello".to_vec()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::KeyValueStore;
pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
