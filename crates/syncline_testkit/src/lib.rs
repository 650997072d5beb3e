//! # Syncline Testkit
//!
//! Test utilities for Syncline.
//!
//! This crate provides:
//! - An in-process endpoint with clients wired through the real transport
//! - Row builders and temporary stores
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use syncline_storage::LocalStore;
//! use syncline_testkit::prelude::*;
//!
//! let harness = ClientServerHarness::new();
//! let client = harness.client();
//! client.local.insert(&todo_at("a", "milk", 10)).unwrap();
//! assert_eq!(client.engine.sync().unwrap().synced, 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
