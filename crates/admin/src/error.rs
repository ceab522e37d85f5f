//! Unified error handling for the admin backend.
//!
//! Every failure a caller can observe is one of the kinds below. Authorization
//! and validation failures are terminal; `Transient` failures may be retried;
//! `MalformedEvent` must never be retried with the same payload.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use marketplace_core::Role;
use thiserror::Error;

use crate::catalog::UniqueField;
use crate::db::RepositoryError;
use crate::idp::IdpError;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// No authenticated caller.
    #[error("Unauthenticated")]
    Unauthenticated,

    /// Caller is authenticated but does not hold the required role.
    #[error("Unauthorized Access: {} privileges required for entry", role_title(.0))]
    Unauthorized(Role),

    /// Candidate failed shape or relational validation.
    #[error("Invalid {field}: {reason}")]
    Validation {
        /// Offending input field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// Another row already holds one of the candidate's unique values.
    #[error("A {kind} with same {field} already exists")]
    UniquenessConflict {
        /// Resource label, e.g. `"store"` or `"user"`.
        kind: &'static str,
        field: UniqueField,
        /// Id of the row already holding the value.
        existing_id: String,
    },

    /// Referenced record does not exist.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// Timeout or unreachable dependency; safe to retry.
    #[error("Transient error: {0}")]
    Transient(String),

    /// Identity event failed signature verification or parsing.
    #[error("Malformed identity event: {0}")]
    MalformedEvent(String),
}

const fn role_title(role: &Role) -> &'static str {
    match role {
        Role::User => "User",
        Role::Admin => "Admin",
        Role::Seller => "Seller",
    }
}

impl AppError {
    /// Shorthand for a validation failure.
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Whether the caller may retry the same request later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Unauthorized(_) => StatusCode::FORBIDDEN,
            Self::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::UniquenessConflict { .. } => StatusCode::CONFLICT,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::MalformedEvent(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        tracing::error!(error = %err, "Store operation failed");
        Self::Transient("store operation failed".to_owned())
    }
}

impl From<IdpError> for AppError {
    fn from(err: IdpError) -> Self {
        tracing::warn!(error = %err, "Identity provider call failed");
        Self::Transient("identity provider unavailable".to_owned())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if matches!(self, Self::Transient(_)) {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Admin request error"
            );
        }

        let status = self.status();

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Transient(_) => "Service temporarily unavailable, please retry".to_owned(),
            _ => self.to_string(),
        };

        (status, message).into_response()
    }
}
