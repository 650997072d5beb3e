//! Authentication support for the sync endpoint.
//!
//! This module provides bearer-token authentication using HMAC-SHA256.
//! Tokens include an issue time for expiration checking.
//!
//! ## Token Format
//!
//! Tokens are composed of:
//! - 2 bytes: subject length (big-endian)
//! - N bytes: subject (UTF-8)
//! - 8 bytes: issued-at (Unix millis, big-endian)
//! - 32 bytes: HMAC-SHA256 signature over everything before it
//!
//! The whole token is hex-encoded for the `Authorization: Bearer` header.

use crate::error::{ServerError, ServerResult};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;
use syncline_sync_protocol::{Clock, SystemClock, Timestamp};

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_LEN: usize = 32;
const ISSUED_AT_LEN: usize = 8;

/// Authentication configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Secret key for HMAC.
    pub secret: Vec<u8>,
    /// Token expiration duration.
    pub token_expiry: Duration,
}

impl AuthConfig {
    /// Creates a new auth configuration.
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            secret,
            token_expiry: Duration::from_secs(24 * 60 * 60), // 24 hours
        }
    }

    /// Sets the token expiration duration.
    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.token_expiry = expiry;
        self
    }
}

/// Token validator for incoming requests.
#[derive(Clone)]
pub struct TokenValidator {
    config: AuthConfig,
}

impl TokenValidator {
    /// Creates a new token validator.
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Mints a token for `subject`, issued now.
    pub fn create_token(&self, subject: &str) -> ServerResult<String> {
        self.create_token_at(subject, SystemClock.now_millis())
    }

    /// Mints a token for `subject` with an explicit issue time.
    pub fn create_token_at(&self, subject: &str, issued_at: Timestamp) -> ServerResult<String> {
        let subject_len = u16::try_from(subject.len())
            .map_err(|_| ServerError::InvalidRequest("token subject too long".into()))?;

        let mut data = Vec::with_capacity(2 + subject.len() + ISSUED_AT_LEN + SIGNATURE_LEN);
        data.extend_from_slice(&subject_len.to_be_bytes());
        data.extend_from_slice(subject.as_bytes());
        data.extend_from_slice(&(issued_at.max(0) as u64).to_be_bytes());

        let signature = self.mac(&data)?.finalize().into_bytes();
        data.extend_from_slice(&signature);
        Ok(hex::encode(data))
    }

    /// Validates a token against the wall clock and returns its subject.
    pub fn validate_token(&self, token: &str) -> ServerResult<String> {
        self.validate_token_at(token, SystemClock.now_millis())
    }

    /// Validates a token as of `now` and returns its subject.
    pub fn validate_token_at(&self, token: &str, now: Timestamp) -> ServerResult<String> {
        let bytes = hex::decode(token.trim())
            .map_err(|_| ServerError::Unauthorized("token is not hex".into()))?;

        let Some((len_bytes, rest)) = bytes.split_first_chunk::<2>() else {
            return Err(ServerError::Unauthorized("invalid token length".into()));
        };
        let subject_len = usize::from(u16::from_be_bytes(*len_bytes));
        if rest.len() != subject_len + ISSUED_AT_LEN + SIGNATURE_LEN {
            return Err(ServerError::Unauthorized("invalid token length".into()));
        }

        let signed_len = bytes.len() - SIGNATURE_LEN;
        let (signed, signature) = bytes.split_at(signed_len);
        self.mac(signed)?
            .verify_slice(signature)
            .map_err(|_| ServerError::Unauthorized("invalid signature".into()))?;

        let subject = std::str::from_utf8(&rest[..subject_len])
            .map_err(|_| ServerError::Unauthorized("subject is not UTF-8".into()))?;

        let mut issued = [0u8; ISSUED_AT_LEN];
        issued.copy_from_slice(&rest[subject_len..subject_len + ISSUED_AT_LEN]);
        let issued_at = u64::from_be_bytes(issued);

        let expiry_millis = u64::try_from(self.config.token_expiry.as_millis()).unwrap_or(u64::MAX);
        let now = now.max(0) as u64;
        if now > issued_at.saturating_add(expiry_millis) {
            return Err(ServerError::Unauthorized("token expired".into()));
        }

        Ok(subject.to_string())
    }

    /// Starts an HMAC-SHA256 over `data`.
    fn mac(&self, data: &[u8]) -> ServerResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.config.secret)
            .map_err(|e| ServerError::Internal(format!("hmac key rejected: {e}")))?;
        mac.update(data);
        Ok(mac)
    }
}

impl std::fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenValidator")
            .field("token_expiry", &self.config.token_expiry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> TokenValidator {
        TokenValidator::new(AuthConfig::new(b"test-secret-key-32-bytes-long!!".to_vec()))
    }

    #[test]
    fn create_and_validate_token() {
        let validator = validator();
        let token = validator.create_token_at("user-1", 1_000).unwrap();
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(token.len(), 2 * (2 + 6 + 8 + 32));

        let subject = validator.validate_token_at(&token, 2_000).unwrap();
        assert_eq!(subject, "user-1");
    }

    #[test]
    fn wall_clock_token_validates() {
        let validator = validator();
        let token = validator.create_token("device").unwrap();
        assert_eq!(validator.validate_token(&token).unwrap(), "device");
    }

    #[test]
    fn reject_other_secret() {
        let token = validator().create_token_at("user-1", 1_000).unwrap();
        let other = TokenValidator::new(AuthConfig::new(b"another-secret".to_vec()));
        assert!(matches!(
            other.validate_token_at(&token, 1_000),
            Err(ServerError::Unauthorized(_))
        ));
    }

    #[test]
    fn reject_tampered_token() {
        let validator = validator();
        let token = validator.create_token_at("user-1", 1_000).unwrap();
        let mut bytes = hex::decode(&token).unwrap();
        bytes[3] ^= 0x01; // Flip a bit in the subject
        let tampered = hex::encode(bytes);

        assert!(validator.validate_token_at(&tampered, 1_000).is_err());
    }

    #[test]
    fn reject_expired_token() {
        let validator = TokenValidator::new(
            AuthConfig::new(b"k".to_vec()).with_expiry(Duration::from_secs(60)),
        );
        let token = validator.create_token_at("user-1", 1_000).unwrap();

        assert!(validator.validate_token_at(&token, 61_000).is_ok());
        assert!(matches!(
            validator.validate_token_at(&token, 61_001),
            Err(ServerError::Unauthorized(msg)) if msg.contains("expired")
        ));
    }

    #[test]
    fn reject_malformed_tokens() {
        let validator = validator();
        for token in ["", "zz", "00", "0005abcd"] {
            assert!(matches!(
                validator.validate_token_at(token, 0),
                Err(ServerError::Unauthorized(_))
            ));
        }
    }
}
