//! HTTP transport implementation.
//!
//! The actual HTTP client is abstracted via a trait so the transport can
//! run over reqwest in production and straight into an in-process server in
//! tests.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use syncline_sync_protocol::{ErrorBody, SyncRequest, SyncResponse, SyncableEntity};
use tracing::debug;

/// A response as seen by an [`HttpClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Raw body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    /// Creates a `200 OK` response.
    pub fn ok(body: Vec<u8>) -> Self {
        Self::new(200, body)
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport.
pub trait HttpClient: Send + Sync {
    /// Sends a JSON POST request, with a bearer token when given.
    ///
    /// Returns `Err` only when no response was received.
    fn post(&self, url: &str, bearer: Option<&str>, body: Vec<u8>)
        -> Result<HttpResponse, String>;

    /// Checks if the client is connected/healthy.
    fn is_healthy(&self) -> bool {
        true
    }
}

/// HTTP-based sync transport.
///
/// Posts JSON to `{base_url}/sync/{entityType}`.
pub struct HttpTransport<C: HttpClient> {
    /// Base URL of the sync server (e.g., "https://sync.example.com").
    base_url: String,
    /// HTTP client implementation.
    client: C,
    /// Connection state.
    connected: AtomicBool,
    /// Bearer token.
    auth_token: RwLock<Option<String>>,
    /// Last error message.
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            connected: AtomicBool::new(true),
            auth_token: RwLock::new(None),
            last_error: RwLock::new(None),
        }
    }

    /// Creates a transport for `config.server_url` using `config.auth_token`.
    pub fn from_config(config: &SyncConfig, client: C) -> Self {
        let transport = Self::new(config.server_url.clone(), client);
        transport.set_auth_token(config.auth_token.clone());
        transport
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the endpoint URL for an entity type.
    pub fn endpoint(&self, entity_type: &str) -> String {
        format!("{}/sync/{entity_type}", self.base_url)
    }

    /// Sets or clears the bearer token.
    pub fn set_auth_token(&self, token: Option<String>) {
        *self.auth_token.write() = token;
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Closes the transport; later exchanges fail with `NotConnected`.
    pub fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn fail(&self, err: SyncError) -> SyncError {
        *self.last_error.write() = Some(err.to_string());
        err
    }
}

impl<C: HttpClient> SyncTransport for HttpTransport<C> {
    fn exchange<E: SyncableEntity>(
        &self,
        request: &SyncRequest<E>,
    ) -> SyncResult<SyncResponse<E>> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }

        let body = serde_json::to_vec(request)
            .map_err(|e| SyncError::Protocol(format!("failed to encode request: {e}")))?;
        let url = self.endpoint(E::ENTITY_TYPE);
        let token = self.auth_token.read().clone();

        let response = self
            .client
            .post(&url, token.as_deref(), body)
            .map_err(|e| self.fail(SyncError::network(e)))?;

        debug!(url = %url, status = response.status, "sync endpoint replied");

        if !response.is_success() {
            let message = serde_json::from_slice::<ErrorBody>(&response.body)
                .map(|b| b.error)
                .unwrap_or_else(|_| String::from_utf8_lossy(&response.body).into_owned());
            return Err(self.fail(SyncError::status(response.status, message)));
        }

        *self.last_error.write() = None;

        serde_json::from_slice(&response.body).map_err(|e| {
            self.fail(SyncError::Protocol(format!(
                "failed to decode response: {e}"
            )))
        })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.client.is_healthy()
    }
}

/// Trait for servers that can handle loopback requests.
pub trait LoopbackServer: Send + Sync {
    /// Handles a POST request and returns the response.
    fn handle_post(&self, path: &str, bearer: Option<&str>, body: &[u8]) -> HttpResponse;
}

impl<S: LoopbackServer + ?Sized> LoopbackServer for Arc<S> {
    fn handle_post(&self, path: &str, bearer: Option<&str>, body: &[u8]) -> HttpResponse {
        (**self).handle_post(path, bearer, body)
    }
}

/// A loopback HTTP client that routes requests directly to a sync server.
///
/// Useful for testing without actual network overhead.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }
}

impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    fn post(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: Vec<u8>,
    ) -> Result<HttpResponse, String> {
        // Extract path from URL
        let path = url.find("/sync").map(|i| &url[i..]).unwrap_or(url);

        Ok(self.server.handle_post(path, bearer, &body))
    }
}

/// Production [`HttpClient`] backed by blocking reqwest.
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    /// Builds a client with the given request timeout.
    pub fn new(timeout: Duration) -> SyncResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Builds a client from `config.timeout`.
    pub fn from_config(config: &SyncConfig) -> SyncResult<Self> {
        Self::new(config.timeout)
    }
}

impl HttpClient for ReqwestClient {
    fn post(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: Vec<u8>,
    ) -> Result<HttpResponse, String> {
        let mut request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = request.send().map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let body = response.bytes().map_err(|e| e.to_string())?;
        Ok(HttpResponse::new(status, body.to_vec()))
    }
}
