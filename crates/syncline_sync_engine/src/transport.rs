//! Transport layer abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use syncline_sync_protocol::{SyncRequest, SyncResponse, SyncableEntity};

/// A sync transport carries one request/response exchange with the sync
/// endpoint for an entity type.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, in-process loopback, mock for testing).
pub trait SyncTransport: Send + Sync {
    /// Sends `request` to the endpoint for `E::ENTITY_TYPE` and returns its
    /// response.
    fn exchange<E: SyncableEntity>(&self, request: &SyncRequest<E>)
        -> SyncResult<SyncResponse<E>>;

    /// Checks if the transport is connected.
    fn is_connected(&self) -> bool;
}

impl<T: SyncTransport> SyncTransport for Arc<T> {
    fn exchange<E: SyncableEntity>(
        &self,
        request: &SyncRequest<E>,
    ) -> SyncResult<SyncResponse<E>> {
        (**self).exchange(request)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}

/// A request seen by [`MockTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    /// Entity type the request was addressed to.
    pub entity_type: String,
    /// JSON body.
    pub body: Value,
}

#[derive(Debug)]
enum Scripted {
    Respond(Value),
    Fail { status: u16, message: String },
}

/// A mock transport for testing.
///
/// Replies are scripted in order; every request is recorded.
#[derive(Debug)]
pub struct MockTransport {
    connected: AtomicBool,
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockTransport {
    /// Creates a new mock transport with an empty script.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queues a successful response.
    pub fn push_response<E: SyncableEntity>(&self, response: SyncResponse<E>) {
        let value = serde_json::to_value(response).unwrap_or(Value::Null);
        self.script.lock().push_back(Scripted::Respond(value));
    }

    /// Queues a raw JSON response body.
    pub fn push_raw(&self, body: Value) {
        self.script.lock().push_back(Scripted::Respond(body));
    }

    /// Queues a non-success status.
    pub fn push_failure(&self, status: u16, message: impl Into<String>) {
        self.script.lock().push_back(Scripted::Fail {
            status,
            message: message.into(),
        });
    }

    /// Returns every request seen so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// Number of requests seen so far.
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Number of scripted replies not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncTransport for MockTransport {
    fn exchange<E: SyncableEntity>(
        &self,
        request: &SyncRequest<E>,
    ) -> SyncResult<SyncResponse<E>> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }

        self.requests.lock().push(RecordedRequest {
            entity_type: E::ENTITY_TYPE.to_string(),
            body: serde_json::to_value(request)?,
        });

        let next = self.script.lock().pop_front();
        match next {
            Some(Scripted::Respond(body)) => Ok(serde_json::from_value(body)?),
            Some(Scripted::Fail { status, message }) => Err(SyncError::status(status, message)),
            None => Err(SyncError::Protocol("no mock response scripted".into())),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
