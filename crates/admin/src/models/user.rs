//! User domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use marketplace_core::{Email, ExternalUserId, Role};

/// A marketplace user mirrored from the identity provider.
///
/// The `role` held here is the source of truth; the identity provider only
/// carries a cached copy of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    /// Identity-provider issued id.
    pub id: ExternalUserId,
    /// Display name.
    pub name: String,
    /// Primary email address.
    pub email: Email,
    /// Avatar URL.
    pub picture: String,
    /// Authoritative role.
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Profile fields carried by an identity lifecycle event.
///
/// Deliberately has no role: profile syncs never touch it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityProfile {
    pub id: ExternalUserId,
    pub name: String,
    pub email: Email,
    pub picture: String,
}
