//! Server configuration.

use std::time::Duration;
use syncline_storage::MAX_BATCH_WRITE_ITEMS;
use syncline_sync_protocol::DEFAULT_PAGE_SIZE;
use tracing::warn;

/// Environment variable overriding [`ServerConfig::batch_write_limit`].
pub const ENV_BATCH_WRITE_LIMIT: &str = "SYNCLINE_BATCH_WRITE_LIMIT";
/// Environment variable overriding [`ServerConfig::max_write_retries`].
pub const ENV_MAX_WRITE_RETRIES: &str = "SYNCLINE_MAX_WRITE_RETRIES";
/// Environment variable overriding [`ServerConfig::default_page_size`].
pub const ENV_DEFAULT_PAGE_SIZE: &str = "SYNCLINE_DEFAULT_PAGE_SIZE";
/// Environment variable overriding [`ServerConfig::max_page_size`].
pub const ENV_MAX_PAGE_SIZE: &str = "SYNCLINE_MAX_PAGE_SIZE";
/// Environment variable enabling authentication with the given secret.
pub const ENV_AUTH_SECRET: &str = "SYNCLINE_AUTH_SECRET";

/// Configuration for the sync endpoint.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Items per remote batch write, at most [`MAX_BATCH_WRITE_ITEMS`].
    pub batch_write_limit: usize,
    /// Retries of the unprocessed subset of one batch.
    pub max_write_retries: u32,
    /// Page size when a request names none.
    pub default_page_size: u32,
    /// Largest page size honoured.
    pub max_page_size: u32,
    /// Rows read per store call when skipping to an offset page.
    pub store_scan_size: usize,
    /// Whether to require authentication.
    pub require_auth: bool,
    /// Secret key for token validation (if auth enabled).
    pub auth_secret: Option<Vec<u8>>,
    /// Token lifetime.
    pub token_expiry: Duration,
}

impl ServerConfig {
    /// Creates a configuration with default limits.
    pub fn new() -> Self {
        Self {
            batch_write_limit: MAX_BATCH_WRITE_ITEMS,
            max_write_retries: 5,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: 1000,
            store_scan_size: 1000,
            require_auth: false,
            auth_secret: None,
            token_expiry: Duration::from_secs(24 * 60 * 60),
        }
    }

    /// Reads overrides from the process environment.
    ///
    /// Unset or unparsable values keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads overrides through `lookup`, which maps a variable name to its
    /// value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::new();

        if let Some(limit) = parse_var::<usize>(&lookup, ENV_BATCH_WRITE_LIMIT) {
            config = config.with_batch_write_limit(limit);
        }
        if let Some(retries) = parse_var::<u32>(&lookup, ENV_MAX_WRITE_RETRIES) {
            config = config.with_max_write_retries(retries);
        }
        if let Some(size) = parse_var::<u32>(&lookup, ENV_MAX_PAGE_SIZE) {
            config = config.with_max_page_size(size);
        }
        if let Some(size) = parse_var::<u32>(&lookup, ENV_DEFAULT_PAGE_SIZE) {
            config = config.with_default_page_size(size);
        }
        if let Some(secret) = lookup(ENV_AUTH_SECRET).filter(|s| !s.is_empty()) {
            config = config.with_auth(secret.into_bytes());
        }

        config
    }

    /// Sets the batch write limit, clamped to `1..=MAX_BATCH_WRITE_ITEMS`.
    pub fn with_batch_write_limit(mut self, limit: usize) -> Self {
        self.batch_write_limit = limit.clamp(1, MAX_BATCH_WRITE_ITEMS);
        self
    }

    /// Sets the retry budget per batch.
    pub fn with_max_write_retries(mut self, retries: u32) -> Self {
        self.max_write_retries = retries;
        self
    }

    /// Sets the default page size.
    pub fn with_default_page_size(mut self, size: u32) -> Self {
        self.default_page_size = size.max(1);
        self
    }

    /// Sets the maximum page size.
    pub fn with_max_page_size(mut self, size: u32) -> Self {
        self.max_page_size = size.max(1);
        self
    }

    /// Sets the rows read per store call while skipping.
    pub fn with_store_scan_size(mut self, size: usize) -> Self {
        self.store_scan_size = size.max(1);
        self
    }

    /// Enables authentication with the given secret.
    pub fn with_auth(mut self, secret: Vec<u8>) -> Self {
        self.require_auth = true;
        self.auth_secret = Some(secret);
        self
    }

    /// Sets the token lifetime.
    pub fn with_token_expiry(mut self, expiry: Duration) -> Self {
        self.token_expiry = expiry;
        self
    }

    /// Clamps a requested page size into `1..=max_page_size`.
    pub fn effective_page_size(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size.max(1))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable setting");
            None
        }
    }
}
