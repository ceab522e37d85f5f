//! Identity provider integration.
//!
//! The provider holds a copy of each user's role in its private metadata.
//! That copy is what sessions carry as a claim, so authorization can usually
//! skip the database; the local `users.role` column stays authoritative.
//!
//! # Module Structure
//!
//! - [`client`] - HTTP client for the provider's backend API
//! - [`memory`] - In-process provider used by tests

pub mod client;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use marketplace_core::{ExternalUserId, Role};
use thiserror::Error;

pub use client::IdpClient;
pub use memory::InMemoryIdentityProvider;

/// Errors that can occur when talking to the identity provider.
#[derive(Debug, Error)]
pub enum IdpError {
    /// HTTP request failed before a response arrived.
    #[error("identity provider request failed: {0}")]
    Request(String),

    /// Provider answered with a non-success status.
    #[error("identity provider returned {status}: {message}")]
    Api { status: u16, message: String },

    /// Provider asked us to slow down.
    #[error("identity provider rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Response body could not be parsed.
    #[error("identity provider response error: {0}")]
    Response(String),

    /// No such user at the provider.
    #[error("user {0} not found at identity provider")]
    UserNotFound(String),

    /// Session exists but is not active.
    #[error("session {0} is not active")]
    InactiveSession(String),
}

impl IdpError {
    /// Whether the same call may succeed if repeated later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Request(_) | Self::RateLimited { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Response(_) | Self::UserNotFound(_) | Self::InactiveSession(_) => false,
        }
    }
}

/// Longest session id accepted from a browser.
pub const MAX_SESSION_ID_LEN: usize = 128;

/// Whether `id` is shaped like a provider session id: non-empty ASCII
/// letters, digits and underscores.
///
/// Session ids are placed in a URL path, so anything else is rejected
/// before a request is built.
#[must_use]
pub fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LEN
        && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Key-value role channel keyed by external id.
///
/// Reads are the authorization fast path; writes are role propagation.
/// Not guaranteed to agree with the local store at any instant.
#[async_trait]
pub trait IdentityMetadata: Send + Sync {
    /// Role currently held in the provider's metadata, if any.
    async fn read_role(&self, id: &ExternalUserId) -> Result<Option<Role>, IdpError>;

    /// Overwrite the role in the provider's metadata. Idempotent.
    async fn write_role(&self, id: &ExternalUserId, role: Role) -> Result<(), IdpError>;
}

/// Resolves a provider session token to the user it belongs to.
#[async_trait]
pub trait SessionVerifier: Send + Sync {
    /// Returns the session's user if the session is active.
    async fn resolve_session(&self, session_id: &str) -> Result<ExternalUserId, IdpError>;
}
