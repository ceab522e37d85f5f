//! Caller extraction from the session.
//!
//! Handlers take a [`Caller`] and hand it to the authorization gate; nothing
//! here decides access. A request without a session, or whose session holds
//! no user, yields an anonymous caller.

use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;

use crate::authz::Caller;
use crate::models::{CurrentUser, session_keys};

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(session) = parts.extensions.get::<Session>() else {
            return Ok(Self::anonymous());
        };

        match session.get::<CurrentUser>(session_keys::CURRENT_USER).await {
            Ok(Some(user)) => Ok(user.into()),
            Ok(None) => Ok(Self::anonymous()),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read session, treating caller as anonymous");
                Ok(Self::anonymous())
            }
        }
    }
}

/// Helper to set the current user in the session.
///
/// The session id is rotated first so a pre-login id cannot be reused.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_user(
    session: &Session,
    user: &CurrentUser,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(session_keys::CURRENT_USER, user).await
}

/// Helper to clear the current user from the session (logout).
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_user(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.flush().await
}
