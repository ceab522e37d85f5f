//! Role-based authorization for catalog mutations.
//!
//! The caller's role is read from the identity-provider claim carried in the
//! session while that claim is fresh, and from the local store otherwise.
//! A claim older than the configured TTL is ignored, so a demotion reaches
//! live sessions within one TTL. Access requires the exact role: there is no
//! hierarchy between `ADMIN` and `SELLER`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::instrument;

use marketplace_core::{ExternalUserId, Role};

use crate::db::UserRepository;
use crate::error::AppError;
use crate::models::CurrentUser;
use crate::timeout::bounded;

/// Who is making a request, as far as the session knows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    /// `None` for anonymous callers.
    pub external_id: Option<ExternalUserId>,
    /// Role claim from identity-provider metadata, if any.
    pub role_claim: Option<Role>,
    /// When `role_claim` was read from the provider.
    pub claimed_at: Option<DateTime<Utc>>,
}

impl Caller {
    /// A caller with no identity.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// An authenticated caller with no role claim; the store decides.
    #[must_use]
    pub const fn authenticated(id: ExternalUserId) -> Self {
        Self {
            external_id: Some(id),
            role_claim: None,
            claimed_at: None,
        }
    }

    /// An authenticated caller carrying a role claim read just now.
    #[must_use]
    pub fn with_claim(id: ExternalUserId, role: Role) -> Self {
        Self::with_claim_at(id, role, Utc::now())
    }

    /// An authenticated caller carrying a role claim read at `at`.
    #[must_use]
    pub const fn with_claim_at(id: ExternalUserId, role: Role, at: DateTime<Utc>) -> Self {
        Self {
            external_id: Some(id),
            role_claim: Some(role),
            claimed_at: Some(at),
        }
    }

    /// The role claim, if it was read no longer than `ttl` ago.
    ///
    /// A claim without a timestamp is never fresh.
    #[must_use]
    pub fn fresh_claim(&self, ttl: Duration, now: DateTime<Utc>) -> Option<Role> {
        let role = self.role_claim?;
        let age = now.signed_duration_since(self.claimed_at?);
        // A claim stamped in the future counts as age zero.
        let age = age.to_std().unwrap_or_default();
        (age <= ttl).then_some(role)
    }
}

impl From<CurrentUser> for Caller {
    fn from(user: CurrentUser) -> Self {
        Self {
            external_id: Some(user.external_id),
            role_claim: user.role_claim,
            claimed_at: user.claimed_at,
        }
    }
}

/// An authorized caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: ExternalUserId,
    pub role: Role,
}

/// Pure access decision for a caller whose role is already known.
///
/// # Errors
///
/// Returns `AppError::Unauthorized` unless `role == required`.
pub fn decide(id: &ExternalUserId, role: Role, required: Role) -> Result<Actor, AppError> {
    if role == required {
        Ok(Actor {
            id: id.clone(),
            role,
        })
    } else {
        Err(AppError::Unauthorized(required))
    }
}

/// Authorization gate with claim-first, store-fallback role resolution.
#[derive(Clone)]
pub struct AuthorizationGate {
    users: Arc<dyn UserRepository>,
    timeout: Duration,
    claim_ttl: Duration,
}

impl AuthorizationGate {
    #[must_use]
    pub fn new(users: Arc<dyn UserRepository>, timeout: Duration, claim_ttl: Duration) -> Self {
        Self {
            users,
            timeout,
            claim_ttl,
        }
    }

    /// Allow `caller` iff it is authenticated and holds exactly `required`.
    ///
    /// Performs no writes. The store is only consulted when the caller has
    /// no role claim or the claim is older than the claim TTL.
    ///
    /// # Errors
    ///
    /// - `AppError::Unauthenticated` for anonymous callers
    /// - `AppError::Unauthorized(required)` for a mismatched or unknown user
    /// - `AppError::Transient` if the store fallback fails
    #[instrument(skip(self, caller), fields(required = %required))]
    pub async fn authorize(&self, caller: &Caller, required: Role) -> Result<Actor, AppError> {
        let id = caller
            .external_id
            .as_ref()
            .ok_or(AppError::Unauthenticated)?;

        let role = match caller.fresh_claim(self.claim_ttl, Utc::now()) {
            Some(role) => role,
            None => {
                if caller.role_claim.is_some() {
                    tracing::debug!(user_id = %id, "Role claim expired, reading stored role");
                }
                let user = bounded(self.timeout, "user lookup", self.users.find_by_id(id)).await?;
                match user {
                    Some(user) => user.role,
                    None => {
                        tracing::info!(user_id = %id, "Caller has no local user record");
                        return Err(AppError::Unauthorized(required));
                    }
                }
            }
        };

        decide(id, role, required)
    }
}
