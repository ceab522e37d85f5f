//! Session-related types for marketplace authentication.
//!
//! Types stored in the session for authentication state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use marketplace_core::{ExternalUserId, Role};

/// Session-stored caller identity.
///
/// Written once when an identity-provider session is handed off. The role is
/// the claim read from provider metadata at `claimed_at`; the authorization
/// gate stops trusting it once it is older than the claim TTL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    /// Identity-provider user id.
    pub external_id: ExternalUserId,
    /// Role claim from provider metadata, if one was present and parseable.
    pub role_claim: Option<Role>,
    /// When the claim was read. Missing in sessions written before it was
    /// recorded, which makes their claim untrusted.
    #[serde(default)]
    pub claimed_at: Option<DateTime<Utc>>,
}

/// Session keys for authentication data.
pub mod keys {
    /// Key for storing the current signed-in user.
    pub const CURRENT_USER: &str = "current_user";
}
