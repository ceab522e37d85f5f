//! Applies identity events to the local user table.

use std::sync::Arc;
use std::time::Duration;

use tracing::instrument;

use marketplace_core::ExternalUserId;

use super::event::{IdentityEvent, ProfileEvent};
use crate::catalog::UniqueField;
use crate::db::{RepositoryError, UserRepository};
use crate::error::AppError;
use crate::models::{IdentityProfile, User};
use crate::propagation::{PropagationHandle, RoleBridge};
use crate::timeout::bounded;

/// What an ingested event did.
#[derive(Debug)]
pub enum IngestOutcome {
    /// The user row was created or refreshed. `propagation` is set when the
    /// stored role is being pushed to the identity provider.
    Upserted {
        user: User,
        propagation: Option<PropagationHandle>,
    },
    /// A delete was applied; `existed` is false for an unknown user.
    Deleted { existed: bool },
    /// Event type not handled here.
    Ignored,
}

/// Keeps local users in step with identity-provider lifecycle events.
#[derive(Clone)]
pub struct IdentityIngestor {
    users: Arc<dyn UserRepository>,
    bridge: RoleBridge,
    timeout: Duration,
}

impl IdentityIngestor {
    #[must_use]
    pub fn new(users: Arc<dyn UserRepository>, bridge: RoleBridge, timeout: Duration) -> Self {
        Self {
            users,
            bridge,
            timeout,
        }
    }

    /// Apply one verified event.
    ///
    /// The local write finishes before propagation starts, and propagation
    /// runs in the background: its failure never fails ingestion.
    ///
    /// # Errors
    ///
    /// - `AppError::UniquenessConflict` if another user holds the email
    /// - `AppError::Transient` if the store fails or times out
    #[instrument(skip(self, event), fields(event_type = %event.event_type()))]
    pub async fn ingest(&self, event: IdentityEvent) -> Result<IngestOutcome, AppError> {
        match event {
            IdentityEvent::Created(event) | IdentityEvent::Updated(event) => {
                self.apply_profile(event).await
            }
            IdentityEvent::Deleted { id } => self.apply_delete(&id).await,
            IdentityEvent::Ignored { event_type } => {
                tracing::debug!(%event_type, "Ignoring identity event");
                Ok(IngestOutcome::Ignored)
            }
        }
    }

    async fn apply_profile(&self, event: ProfileEvent) -> Result<IngestOutcome, AppError> {
        let ProfileEvent {
            profile,
            role_claim,
        } = event;

        let written = bounded(self.timeout, "user upsert", async {
            Ok::<_, AppError>(self.users.upsert_profile(&profile).await)
        })
        .await?;

        let user = match written {
            Ok(user) => user,
            Err(RepositoryError::Conflict(constraint)) => {
                tracing::warn!(user_id = %profile.id, %constraint, "User email already taken");
                return Err(self.email_conflict(&profile).await);
            }
            Err(err) => return Err(err.into()),
        };
        tracing::info!(user_id = %user.id, role = %user.role, "User synced");

        // The provider re-emits an update after every metadata write; stop
        // once it already carries the stored role.
        let propagation = if role_claim == Some(user.role) {
            tracing::debug!(user_id = %user.id, "Role claim already current");
            None
        } else {
            Some(self.bridge.dispatch(user.id.clone(), user.role))
        };

        Ok(IngestOutcome::Upserted { user, propagation })
    }

    async fn apply_delete(&self, id: &ExternalUserId) -> Result<IngestOutcome, AppError> {
        let existed = bounded(self.timeout, "user delete", self.users.delete(id)).await?;
        if existed {
            tracing::info!(user_id = %id, "User deleted");
        } else {
            tracing::debug!(user_id = %id, "Delete for unknown user");
        }
        Ok(IngestOutcome::Deleted { existed })
    }

    async fn email_conflict(&self, profile: &IdentityProfile) -> AppError {
        match bounded(
            self.timeout,
            "user lookup",
            self.users.find_by_email(&profile.email),
        )
        .await
        {
            Ok(Some(holder)) if holder.id != profile.id => AppError::UniquenessConflict {
                kind: "user",
                field: UniqueField::Email,
                existing_id: holder.id.to_string(),
            },
            Ok(_) => AppError::Transient("conflicting user is no longer visible".to_owned()),
            Err(err) => err,
        }
    }
}
