//! # Syncline Sync Engine
//!
//! Client side of the Syncline offline-first sync protocol.
//!
//! This crate provides:
//! - Sync state machine (idle → syncing → idle) with a re-entrancy guard
//! - Per-entity-type cursor management
//! - Last-write-wins merge of pulled rows
//! - HTTP transport abstraction with reqwest and loopback clients
//!
//! ## Architecture
//!
//! The engine implements a **push-then-pull** cycle per entity type:
//! 1. Push every local row changed since the cursor, in batches
//! 2. Pull every remote row changed since the cursor, in pages
//! 3. Merge each page into the local store as it arrives
//! 4. Persist the server's timestamp as the new cursor
//!
//! ## Key Invariants
//!
//! - The cursor only ever takes a value the server returned
//! - The cursor never moves backwards
//! - A failed cycle leaves the cursor unchanged
//! - Pulled tombstones never resurrect or delete rows unless tombstone pull
//!   is enabled

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod applier;
mod config;
mod error;
mod http;
mod state;
mod transport;

pub use applier::{LocalApplier, MergeReport};
pub use config::{SyncConfig, DEFAULT_SYNC_PAGE_SIZE};
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpResponse, HttpTransport, LoopbackClient, LoopbackServer, ReqwestClient};
pub use state::{SyncEngine, SyncOutcome, SyncState, SyncStats};
pub use transport::{MockTransport, RecordedRequest, SyncTransport};
