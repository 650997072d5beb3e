//! Main sync server.

use crate::auth::TokenValidator;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerContext, RequestHandler};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use syncline_storage::{MemoryRemoteStore, RemoteStore};
use syncline_sync_engine::{HttpResponse, LoopbackServer};
use syncline_sync_protocol::{Clock, ErrorBody, SyncRequest, SyncResponse, SystemClock};
use tracing::{error, warn};

const SYNC_PREFIX: &str = "/sync";
const PING_PATH: &str = "/ping";

/// HTTP method of an incoming request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// Anything else.
    Other,
}

/// A framework-neutral HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Request method.
    pub method: Method,
    /// Request path, optionally with a query string.
    pub path: String,
    /// Bearer token from the `Authorization` header.
    pub bearer: Option<String>,
    /// Raw body.
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Creates a `POST` request.
    pub fn post(path: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            bearer: None,
            body,
        }
    }

    /// Creates a `GET` request.
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            bearer: None,
            body: Vec::new(),
        }
    }

    /// Attaches a bearer token.
    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }
}

enum Route<'a> {
    Ping,
    Sync(&'a str),
}

/// The sync server.
///
/// Serves `POST /sync/{entityType}` over a [`RemoteStore`]. Requests arrive
/// as [`HttpRequest`] values so any HTTP framework can front it; the server
/// also implements [`LoopbackServer`] for in-process clients.
///
/// # Example
///
/// ```
/// use syncline_sync_server::{HttpRequest, ServerConfig, SyncServer};
///
/// let server = SyncServer::new(ServerConfig::default());
/// let response = server.handle(&HttpRequest::post("/sync/todos", b"{}".to_vec()));
/// assert_eq!(response.status, 200);
/// ```
pub struct SyncServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
}

impl SyncServer {
    /// Creates a server over a fresh in-memory store.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryRemoteStore::new()))
    }

    /// Creates a server over an existing store.
    pub fn with_store(config: ServerConfig, store: Arc<dyn RemoteStore>) -> Self {
        Self::with_parts(config, store, Arc::new(SystemClock))
    }

    /// Creates a server with an explicit store and clock.
    pub fn with_parts(
        config: ServerConfig,
        store: Arc<dyn RemoteStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let context = Arc::new(HandlerContext::new(config, store, clock));
        let handler = RequestHandler::new(Arc::clone(&context));

        Self { handler, context }
    }

    /// Returns the remote store.
    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.context.store
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.context.config
    }

    /// Returns the token validator when authentication is enabled.
    pub fn token_validator(&self) -> Option<&TokenValidator> {
        self.context.validator()
    }

    /// Handles a typed sync request, bypassing routing and authentication.
    pub fn handle_sync(
        &self,
        entity_type: &str,
        request: SyncRequest<Value>,
    ) -> ServerResult<SyncResponse<Value>> {
        self.handler.handle_sync(entity_type, request)
    }

    /// Routes and handles one HTTP request.
    pub fn handle(&self, request: &HttpRequest) -> HttpResponse {
        match self.dispatch(request) {
            Ok(response) => response,
            Err(err) => {
                if err.is_server_error() {
                    error!(path = %request.path, error = %err, "sync request failed");
                } else {
                    warn!(path = %request.path, error = %err, "sync request rejected");
                }
                json_response(err.status_code(), &ErrorBody::new(err.error_code()))
            }
        }
    }

    fn dispatch(&self, request: &HttpRequest) -> ServerResult<HttpResponse> {
        let path = request
            .path
            .split_once('?')
            .map_or(request.path.as_str(), |(path, _)| path);

        match (request.method, route(path)?) {
            (Method::Get, Route::Ping) => Ok(json_response(200, &json!({"status": "ok"}))),
            (Method::Post, Route::Sync(entity_type)) => {
                self.handler.authenticate(request.bearer.as_deref())?;
                let response = self.handler.handle_body(entity_type, &request.body)?;
                Ok(json_response(200, &response))
            }
            _ => Err(ServerError::NotFound(path.to_string())),
        }
    }
}

fn route(path: &str) -> ServerResult<Route<'_>> {
    if path == PING_PATH {
        return Ok(Route::Ping);
    }
    let rest = path
        .strip_prefix(SYNC_PREFIX)
        .ok_or_else(|| ServerError::NotFound(path.to_string()))?;
    match rest {
        "" | "/" => Ok(Route::Sync("")),
        _ => match rest.strip_prefix('/') {
            Some(entity_type) if !entity_type.contains('/') => Ok(Route::Sync(entity_type)),
            _ => Err(ServerError::NotFound(path.to_string())),
        },
    }
}

fn json_response<T: Serialize>(status: u16, body: &T) -> HttpResponse {
    match serde_json::to_vec(body) {
        Ok(bytes) => HttpResponse::new(status, bytes),
        Err(e) => {
            error!(error = %e, "failed to encode response body");
            HttpResponse::new(500, br#"{"error":"internal_error"}"#.to_vec())
        }
    }
}

impl LoopbackServer for SyncServer {
    fn handle_post(&self, path: &str, bearer: Option<&str>, body: &[u8]) -> HttpResponse {
        let mut request = HttpRequest::post(path, body.to_vec());
        request.bearer = bearer.map(str::to_string);
        self.handle(&request)
    }
}
