//! Request handler for the sync endpoint.

use crate::auth::{AuthConfig, TokenValidator};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::query::{read_page, PageStart};
use crate::upsert::upsert_items;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use syncline_storage::{IndexKey, RemoteItem, RemoteStore, StorageError};
use syncline_sync_protocol::{Clock, PageToken, SyncRequest, SyncResponse, Timestamp};
use tracing::debug;

/// Context for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Remote store (shared across all handlers).
    pub store: Arc<dyn RemoteStore>,
    /// Source of `syncTimestamp` and token expiry checks.
    pub clock: Arc<dyn Clock>,
    validator: Option<TokenValidator>,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig, store: Arc<dyn RemoteStore>, clock: Arc<dyn Clock>) -> Self {
        let validator = match (&config.auth_secret, config.require_auth) {
            (Some(secret), true) => Some(TokenValidator::new(
                AuthConfig::new(secret.clone()).with_expiry(config.token_expiry),
            )),
            _ => None,
        };
        Self {
            config,
            store,
            clock,
            validator,
        }
    }

    /// Returns the token validator when authentication is enabled.
    pub fn validator(&self) -> Option<&TokenValidator> {
        self.validator.as_ref()
    }
}

/// Wire body of a sync request as received.
///
/// Unlike [`SyncRequest`], an absent `pageSize` stays absent so the server
/// default applies.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InboundRequest {
    #[serde(default)]
    last_sync_timestamp: Option<Timestamp>,
    #[serde(default)]
    items: Vec<Value>,
    #[serde(default)]
    page: u32,
    #[serde(default)]
    page_size: Option<u32>,
    #[serde(default)]
    page_token: Option<String>,
}

impl From<SyncRequest<Value>> for InboundRequest {
    fn from(request: SyncRequest<Value>) -> Self {
        Self {
            last_sync_timestamp: request.last_sync_timestamp,
            items: request.items,
            page: request.page,
            page_size: Some(request.page_size),
            page_token: request.page_token,
        }
    }
}

/// Handler for sync requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Checks the bearer token when authentication is enabled.
    ///
    /// Returns the token subject, or `None` when authentication is off.
    pub fn authenticate(&self, bearer: Option<&str>) -> ServerResult<Option<String>> {
        let Some(validator) = self.context.validator() else {
            return Ok(None);
        };
        let token =
            bearer.ok_or_else(|| ServerError::Unauthorized("missing bearer token".into()))?;
        validator
            .validate_token_at(token, self.context.clock.now_millis())
            .map(Some)
    }

    /// Handles a raw JSON body for `POST /sync/{entity_type}`.
    ///
    /// An empty body is treated as `{}`.
    pub fn handle_body(&self, entity_type: &str, body: &[u8]) -> ServerResult<SyncResponse<Value>> {
        let request = if body.iter().all(u8::is_ascii_whitespace) {
            InboundRequest::default()
        } else {
            serde_json::from_slice(body).map_err(|e| ServerError::InvalidRequest(e.to_string()))?
        };
        self.process(entity_type, request)
    }

    /// Handles a typed sync request.
    pub fn handle_sync(
        &self,
        entity_type: &str,
        request: SyncRequest<Value>,
    ) -> ServerResult<SyncResponse<Value>> {
        self.process(entity_type, request.into())
    }

    fn process(
        &self,
        entity_type: &str,
        request: InboundRequest,
    ) -> ServerResult<SyncResponse<Value>> {
        if entity_type.is_empty() {
            return Err(ServerError::MissingEntityType);
        }
        let config = &self.context.config;
        let page_size = config.effective_page_size(request.page_size);

        // Validate everything before the first write.
        let items = request
            .items
            .into_iter()
            .map(|value| RemoteItem::from_wire(entity_type, value))
            .collect::<Result<Vec<_>, StorageError>>()
            .map_err(|e| ServerError::InvalidRequest(e.to_string()))?;

        let start = match request.page_token.as_deref() {
            Some(token) => PageStart::After(IndexKey::from(
                PageToken::decode(token).map_err(|e| ServerError::InvalidRequest(e.to_string()))?,
            )),
            None => PageStart::Offset(request.page),
        };

        let upsert = upsert_items(
            &*self.context.store,
            items,
            config.batch_write_limit,
            config.max_write_retries,
        )?;

        let sync_timestamp = self.context.clock.now_millis();
        let page = read_page(
            &*self.context.store,
            entity_type,
            request.last_sync_timestamp,
            start,
            page_size as usize,
            config.store_scan_size,
        )?;

        let has_more = page.has_more();
        let next_page_token = page
            .next
            .map(|key| PageToken::from(key).encode())
            .transpose()
            .map_err(|e| ServerError::Internal(format!("failed to encode page token: {e}")))?;

        debug!(
            entity_type,
            synced = upsert.written,
            returned = page.items.len(),
            has_more,
            "sync request handled"
        );

        Ok(SyncResponse {
            items: page.items.into_iter().map(RemoteItem::into_wire).collect(),
            sync_timestamp,
            synced: upsert.written,
            has_more,
            page: request.page,
            page_size,
            next_page_token,
            unprocessed: upsert.unprocessed,
        })
    }
}
