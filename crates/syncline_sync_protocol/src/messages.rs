//! Protocol messages for sync.

use crate::entity::Timestamp;
use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};

/// Page size used when a request does not name one.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Error body when the entity type path segment is absent.
pub const ERROR_MISSING_ENTITY_TYPE: &str = "entityType path param required";
/// Error body for malformed request bodies.
pub const ERROR_INVALID_REQUEST: &str = "invalid_request";
/// Error body for rejected credentials.
pub const ERROR_UNAUTHORIZED: &str = "unauthorized";
/// Error body for unknown routes.
pub const ERROR_NOT_FOUND: &str = "not_found";
/// Error body for unhandled faults.
pub const ERROR_INTERNAL: &str = "internal_error";

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

/// Body of `POST /sync/{entityType}`.
///
/// A push carries local changes in `items`; a pull carries no items and
/// names the page it wants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest<T> {
    /// Client cursor; `None` on first sync.
    #[serde(default)]
    pub last_sync_timestamp: Option<Timestamp>,
    /// Local changes to upsert.
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    /// Zero-based page number.
    #[serde(default)]
    pub page: u32,
    /// Rows per page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Continuation token from the previous page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
}

impl<T> SyncRequest<T> {
    /// Creates a push request for one batch of local changes.
    pub fn push(last_sync_timestamp: Option<Timestamp>, items: Vec<T>, page_size: u32) -> Self {
        Self {
            last_sync_timestamp,
            items,
            page: 0,
            page_size,
            page_token: None,
        }
    }

    /// Creates a pull request for one page of remote changes.
    pub fn pull(
        last_sync_timestamp: Option<Timestamp>,
        page: u32,
        page_size: u32,
        page_token: Option<String>,
    ) -> Self {
        Self {
            last_sync_timestamp,
            items: Vec::new(),
            page,
            page_size,
            page_token,
        }
    }
}

/// Successful response of `POST /sync/{entityType}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse<T> {
    /// Remote rows changed since the request cursor, this page only.
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    /// Server time when the response was built; the next cursor.
    pub sync_timestamp: Timestamp,
    /// Number of request items written.
    #[serde(default)]
    pub synced: u64,
    /// True if more pages follow.
    #[serde(default)]
    pub has_more: bool,
    /// Page number echoed from the request.
    #[serde(default)]
    pub page: u32,
    /// Page size used.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Token for the next page, present iff `has_more`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
    /// Ids of request items that could not be written.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unprocessed: Vec<String>,
}

/// Error response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Short error code.
    pub error: String,
}

impl ErrorBody {
    /// Creates an error body.
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Position in the changed-since result set.
///
/// Rows are ordered by `(updated_at, id)`; a token names the last row of
/// the page it ends, and the next page starts strictly after it. Clients
/// treat the encoded form as opaque.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageToken {
    /// `updated_at` of the last row returned.
    #[serde(rename = "u")]
    pub updated_at: Timestamp,
    /// `id` of the last row returned.
    #[serde(rename = "i")]
    pub id: String,
}

impl PageToken {
    /// Creates a token.
    pub fn new(updated_at: Timestamp, id: impl Into<String>) -> Self {
        Self {
            updated_at,
            id: id.into(),
        }
    }

    /// Encodes to the opaque wire form.
    pub fn encode(&self) -> ProtocolResult<String> {
        Ok(hex::encode(serde_json::to_vec(self)?))
    }

    /// Decodes the opaque wire form.
    pub fn decode(token: &str) -> ProtocolResult<Self> {
        let bytes = hex::decode(token).map_err(|e| ProtocolError::InvalidPageToken(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| ProtocolError::InvalidPageToken(e.to_string()))
    }
}
