//! Identity webhook signature verification.
//!
//! Deliveries are signed the Svix way: HMAC-SHA256 over
//! `"{svix-id}.{svix-timestamp}.{body}"` with the base64-decoded secret
//! (the part after `whsec_`). The `svix-signature` header holds one or more
//! space-separated `v1,<base64>` entries; any matching entry is accepted.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretSlice, SecretString};
use sha2::Sha256;
use thiserror::Error;
use tracing::{debug, instrument};

type HmacSha256 = Hmac<Sha256>;

const SECRET_PREFIX: &str = "whsec_";
const SIGNATURE_VERSION: &str = "v1";

/// Signature header names.
pub mod headers {
    pub const ID: &str = "svix-id";
    pub const TIMESTAMP: &str = "svix-timestamp";
    pub const SIGNATURE: &str = "svix-signature";
}

/// Reasons a delivery is rejected before its body is parsed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("invalid signing secret: {0}")]
    InvalidSecret(String),

    #[error("missing {0} header")]
    MissingHeader(&'static str),

    #[error("invalid timestamp")]
    InvalidTimestamp,

    #[error("timestamp outside tolerance")]
    Expired,

    #[error("no matching signature")]
    Mismatch,
}

/// Verifies webhook deliveries against the shared signing secret.
pub struct WebhookVerifier {
    key: SecretSlice<u8>,
    tolerance: Duration,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("key", &"[REDACTED]")
            .field("tolerance", &self.tolerance)
            .finish()
    }
}

impl WebhookVerifier {
    /// Build a verifier from a `whsec_`-prefixed secret. The prefix is
    /// optional.
    ///
    /// # Errors
    ///
    /// Returns `SignatureError::InvalidSecret` if the secret is not base64.
    pub fn new(secret: &SecretString, tolerance: Duration) -> Result<Self, SignatureError> {
        let raw = secret.expose_secret();
        let encoded = raw.strip_prefix(SECRET_PREFIX).unwrap_or(raw);
        let key = STANDARD
            .decode(encoded)
            .map_err(|e| SignatureError::InvalidSecret(e.to_string()))?;
        if key.is_empty() {
            return Err(SignatureError::InvalidSecret("empty key".to_owned()));
        }

        Ok(Self {
            key: SecretSlice::from(key),
            tolerance,
        })
    }

    /// Verify a delivery against the current time.
    ///
    /// # Errors
    ///
    /// Returns a [`SignatureError`] describing the first failed check.
    #[instrument(skip_all, fields(msg_id = %msg_id))]
    pub fn verify(
        &self,
        msg_id: &str,
        timestamp: &str,
        signatures: &str,
        body: &[u8],
    ) -> Result<(), SignatureError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| SignatureError::InvalidTimestamp)?
            .as_secs();
        let now = i64::try_from(now).map_err(|_| SignatureError::InvalidTimestamp)?;
        self.verify_at(msg_id, timestamp, signatures, body, now)
    }

    /// Verify a delivery as if the current unix time were `now`.
    ///
    /// # Errors
    ///
    /// Returns a [`SignatureError`] describing the first failed check.
    pub fn verify_at(
        &self,
        msg_id: &str,
        timestamp: &str,
        signatures: &str,
        body: &[u8],
        now: i64,
    ) -> Result<(), SignatureError> {
        let ts: i64 = timestamp
            .trim()
            .parse()
            .map_err(|_| SignatureError::InvalidTimestamp)?;
        let tolerance = i64::try_from(self.tolerance.as_secs()).unwrap_or(i64::MAX);
        if now.abs_diff(ts) > tolerance.unsigned_abs() {
            return Err(SignatureError::Expired);
        }

        let expected = self.sign(msg_id, timestamp.trim(), body)?;
        let matched = signatures
            .split_whitespace()
            .filter_map(|entry| entry.split_once(','))
            .filter(|(version, _)| *version == SIGNATURE_VERSION)
            .any(|(_, sig)| constant_time_compare(sig, &expected));

        if matched {
            debug!("Webhook signature verified");
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }

    /// Compute the base64 signature for a delivery.
    ///
    /// # Errors
    ///
    /// Returns `SignatureError::InvalidSecret` if the key cannot be used.
    pub fn sign(&self, msg_id: &str, timestamp: &str, body: &[u8]) -> Result<String, SignatureError> {
        let mut mac = HmacSha256::new_from_slice(self.key.expose_secret())
            .map_err(|e| SignatureError::InvalidSecret(e.to_string()))?;

        mac.update(msg_id.as_bytes());
        mac.update(b".");
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(body);

        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}
