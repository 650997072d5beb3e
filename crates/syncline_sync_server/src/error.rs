//! Error types for the sync endpoint.

use syncline_storage::StorageError;
use syncline_sync_protocol::{
    ERROR_INTERNAL, ERROR_INVALID_REQUEST, ERROR_MISSING_ENTITY_TYPE, ERROR_NOT_FOUND,
    ERROR_UNAUTHORIZED,
};
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync endpoint.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The request path names no entity type.
    #[error("entity type path parameter missing")]
    MissingEntityType,

    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Authentication failed.
    #[error("not authorized: {0}")]
    Unauthorized(String),

    /// No route matches the request.
    #[error("no route for {0}")]
    NotFound(String),

    /// Remote store failure.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Returns the HTTP status for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::MissingEntityType | ServerError::InvalidRequest(_) => 400,
            ServerError::Unauthorized(_) => 401,
            ServerError::NotFound(_) => 404,
            ServerError::Storage(_) | ServerError::Internal(_) => 500,
        }
    }

    /// Returns the code sent in the error body.
    ///
    /// Server faults share one opaque code; their details are only logged.
    pub fn error_code(&self) -> &'static str {
        match self {
            ServerError::MissingEntityType => ERROR_MISSING_ENTITY_TYPE,
            ServerError::InvalidRequest(_) => ERROR_INVALID_REQUEST,
            ServerError::Unauthorized(_) => ERROR_UNAUTHORIZED,
            ServerError::NotFound(_) => ERROR_NOT_FOUND,
            ServerError::Storage(_) | ServerError::Internal(_) => ERROR_INTERNAL,
        }
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }
}
