//! # CanvasSync Testkit
//!
//! Test utilities for CanvasSync.
//!
//! This crate provides:
//! - Test fixtures, temporary stores and simulated devices
//! - Property-based test generators using proptest
//! - Loopback and fault-injecting remotes over the reference server
//! - Fuzz testing harnesses
//!
//! ## Usage
//!
//! ```rust,no_run
//! use canvas_sync_engine::SyncConfig;
//! use canvas_sync_testkit::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn demo() {
//! let remote = Arc::new(LoopbackRemote::with_fresh_server());
//! let device = TestDevice::new("board", remote, SyncConfig::default());
//! device.session.initialize().await.unwrap();
//! device.add_and_capture("n1").await.unwrap();
//! device.push().await.unwrap();
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod fuzz;
pub mod generators;
pub mod integration;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::fuzz::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
}

pub use fixtures::*;
pub use fuzz::*;
pub use generators::*;
pub use integration::*;
