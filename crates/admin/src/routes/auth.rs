//! Session handoff route handlers for admin.
//!
//! The browser signs in with the identity provider and posts the provider's
//! session id here. The session is checked against the provider's backend
//! API and the user's role claim is read once and kept in the local session.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use tower_sessions::Session;
use tracing::{info, instrument, warn};

use crate::authz::Caller;
use crate::error::AppError;
use crate::idp::is_valid_session_id;
use crate::middleware::{clear_current_user, set_current_user};
use crate::models::CurrentUser;
use crate::state::AppState;
use crate::timeout::bounded;

/// Build the auth router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/session", post(create_session))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
}

/// Session handoff request body.
#[derive(Debug, Deserialize)]
pub struct SessionHandoff {
    pub session_id: String,
}

/// Exchange an identity provider session for a local one.
///
/// POST /auth/session
#[instrument(skip_all)]
async fn create_session(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<SessionHandoff>,
) -> Result<Json<CurrentUser>, AppError> {
    if !is_valid_session_id(&body.session_id) {
        warn!("Rejected malformed session id");
        return Err(AppError::Unauthenticated);
    }

    let idp_timeout = state.sync().idp_timeout;

    let resolved = bounded(idp_timeout, "session lookup", async {
        Ok::<_, AppError>(state.sessions().resolve_session(&body.session_id).await)
    })
    .await?;
    let external_id = match resolved {
        Ok(id) => id,
        Err(e) if !e.is_retryable() => {
            warn!(error = %e, "Rejected session handoff");
            return Err(AppError::Unauthenticated);
        }
        Err(e) => return Err(e.into()),
    };

    // Without a readable claim the gate falls back to the local store.
    let role_claim = match bounded(
        idp_timeout,
        "role claim lookup",
        state.metadata().read_role(&external_id),
    )
    .await
    {
        Ok(claim) => claim,
        Err(e) => {
            warn!(user_id = %external_id, error = %e, "Role claim unavailable");
            None
        }
    };

    let user = CurrentUser {
        claimed_at: role_claim.map(|_| Utc::now()),
        external_id,
        role_claim,
    };
    set_current_user(&session, &user).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to write session");
        AppError::Transient("session store unavailable".to_owned())
    })?;

    info!(user_id = %user.external_id, role_claim = ?user.role_claim, "Session established");
    Ok(Json(user))
}

/// Logout and clear session.
///
/// POST /auth/logout
async fn logout(session: Session) -> StatusCode {
    if let Err(e) = clear_current_user(&session).await {
        warn!(error = %e, "Failed to clear session");
    }
    StatusCode::NO_CONTENT
}

/// The identity held by the current session.
///
/// GET /auth/me
async fn me(caller: Caller) -> Result<Json<CurrentUser>, AppError> {
    let external_id = caller.external_id.ok_or(AppError::Unauthenticated)?;
    Ok(Json(CurrentUser {
        external_id,
        role_claim: caller.role_claim,
        claimed_at: caller.claimed_at,
    }))
}
