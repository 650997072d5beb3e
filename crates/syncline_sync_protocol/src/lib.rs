//! # Syncline Sync Protocol
//!
//! Shared types for the Syncline client engine and sync endpoint.
//!
//! This crate provides:
//! - [`SyncableEntity`], the capability contract every synced entity implements
//! - [`Todo`], the reference entity
//! - Wire messages ([`SyncRequest`], [`SyncResponse`], [`ErrorBody`])
//! - Opaque page tokens ([`PageToken`])
//! - The last-write-wins merge rule ([`decide`], [`TieBreak`])
//! - Clocks ([`SystemClock`], [`ManualClock`])
//!
//! This is a pure protocol crate with no I/O operations.
//!
//! ## Wire format
//!
//! A single endpoint, `POST {base}/sync/{entityType}`, carries JSON bodies
//! with camelCase field names. Entities on the wire never carry the entity
//! type; the endpoint adds and strips it.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod conflict;
mod entity;
mod error;
mod messages;

pub use clock::{Clock, ManualClock, SystemClock};
pub use conflict::{decide, MergeDecision, TieBreak};
pub use entity::{SyncableEntity, Timestamp, Todo};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    ErrorBody, PageToken, SyncRequest, SyncResponse, DEFAULT_PAGE_SIZE, ERROR_INTERNAL,
    ERROR_INVALID_REQUEST, ERROR_MISSING_ENTITY_TYPE, ERROR_NOT_FOUND, ERROR_UNAUTHORIZED,
};
