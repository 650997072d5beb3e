//! Configuration for the sync engine.

use std::time::Duration;
use syncline_sync_protocol::TieBreak;

/// Page size used by [`SyncEngine::sync`](crate::SyncEngine::sync).
pub const DEFAULT_SYNC_PAGE_SIZE: u32 = 128;

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the sync endpoint, without the `/sync` suffix.
    pub server_url: String,
    /// Rows per push batch and per pull page.
    pub page_size: u32,
    /// Request timeout.
    pub timeout: Duration,
    /// How equal `updated_at` values are settled.
    pub tie_break: TieBreak,
    /// Whether pulled tombstones are merged instead of discarded.
    pub pull_tombstones: bool,
    /// Bearer token sent with every request.
    pub auth_token: Option<String>,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            page_size: DEFAULT_SYNC_PAGE_SIZE,
            timeout: Duration::from_secs(30),
            tie_break: TieBreak::default(),
            pull_tombstones: false,
            auth_token: None,
        }
    }

    /// Sets the page size.
    pub fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = size;
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the tie-break policy.
    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    /// Enables merging of pulled tombstones.
    pub fn with_tombstone_pull(mut self, enabled: bool) -> Self {
        self.pull_tombstones = enabled;
        self
    }

    /// Sets the bearer token.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("")
    }
}
