//! # Syncline Sync Server
//!
//! Reference sync endpoint for Syncline.
//!
//! This crate provides:
//! - The `POST /sync/{entityType}` endpoint: upsert pushed rows, then return
//!   one page of rows changed since the client cursor
//! - Bounded batch writes with retry of unprocessed items
//! - Keyset pagination over the remote `(updated_at, id)` index
//! - Optional bearer authentication (HMAC-SHA256 tokens)
//!
//! # Architecture
//!
//! The endpoint is stateless between requests. Canonical rows live in a
//! [`RemoteStore`](syncline_storage::RemoteStore); requests and responses
//! are framework-neutral values, so the server can sit behind any HTTP
//! stack or be called in-process through
//! [`LoopbackServer`](syncline_sync_engine::LoopbackServer).
//!
//! # Authentication
//!
//! Authentication is optional:
//!
//! ```rust
//! use syncline_sync_server::{HttpRequest, ServerConfig, SyncServer};
//!
//! let config = ServerConfig::default().with_auth(b"my-secure-secret".to_vec());
//! let server = SyncServer::new(config);
//!
//! let token = server.token_validator().unwrap().create_token("device-1").unwrap();
//! let request = HttpRequest::post("/sync/todos", b"{}".to_vec()).with_bearer(token);
//! assert_eq!(server.handle(&request).status, 200);
//! ```
//!
//! # Protocol
//!
//! Each request does, in order:
//! 1. Validate the path, credentials, items and page token
//! 2. Upsert `items` in batches, retrying unprocessed subsets
//! 3. Read the server clock as `syncTimestamp`
//! 4. Return the requested page of rows with `updatedAt > lastSyncTimestamp`

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod config;
mod error;
mod handler;
mod query;
mod server;
mod upsert;

pub use auth::{AuthConfig, TokenValidator};
pub use config::{
    ServerConfig, ENV_AUTH_SECRET, ENV_BATCH_WRITE_LIMIT, ENV_DEFAULT_PAGE_SIZE,
    ENV_MAX_PAGE_SIZE, ENV_MAX_WRITE_RETRIES,
};
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use query::{read_page, PageStart, ResultPage};
pub use server::{HttpRequest, Method, SyncServer};
pub use upsert::{upsert_items, UpsertOutcome};
