//! Identity provider webhook handler.
//!
//! The body is taken raw: the signature covers the exact bytes sent.

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
};
use tracing::{info, instrument, warn};

use crate::error::AppError;
use crate::identity::{Delivery, IngestOutcome};
use crate::state::AppState;

/// Create identity webhook routes.
pub fn router() -> Router<AppState> {
    Router::new().route("/api/webhooks/identity", post(handle_identity_event))
}

/// Handle an identity lifecycle webhook.
///
/// Answers 200 only once the local write has finished; any error response
/// asks the sender to redeliver, except 400 which it should not.
#[instrument(skip(state, headers, body))]
async fn handle_identity_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let delivery = Delivery::from_headers(&headers, &body).map_err(|e| {
        warn!(error = %e, "Identity webhook missing signature headers");
        AppError::MalformedEvent(e.to_string())
    })?;
    let msg_id = delivery.id.to_owned();

    match state
        .ingestor()
        .handle_delivery(state.verifier(), delivery)
        .await?
    {
        IngestOutcome::Upserted { user, propagation } => info!(
            %msg_id,
            user_id = %user.id,
            propagating = propagation.is_some(),
            "Identity webhook applied"
        ),
        IngestOutcome::Deleted { existed } => {
            info!(%msg_id, existed, "Identity webhook delete applied");
        }
        IngestOutcome::Ignored => info!(%msg_id, "Identity webhook ignored"),
    }

    Ok((StatusCode::OK, "Webhook received"))
}
