//! User role management commands.
//!
//! Roles never change through webhooks or the HTTP API; this is the only
//! path. The local row is written first since it is authoritative, then the
//! new role is pushed to the identity provider with retries.
//!
//! # Usage
//!
//! ```bash
//! mp-cli user set-role --id user_2abc --role SELLER
//! mp-cli user show --id user_2abc
//! ```
//!
//! # Environment Variables
//!
//! - `ADMIN_DATABASE_URL` (or `DATABASE_URL`) - `PostgreSQL` connection string
//! - `IDP_SECRET_KEY`, `IDP_WEBHOOK_SECRET`, `IDP_API_URL` - identity provider
//! - `IDP_TIMEOUT_MS`, `PROPAGATION_MAX_ATTEMPTS`, `PROPAGATION_BASE_DELAY_MS`

use std::sync::Arc;

use thiserror::Error;

use marketplace_admin::config::{ConfigError, IdpConfig, SyncConfig, get_database_url};
use marketplace_admin::db::{self, PgUserRepository, RepositoryError, UserRepository};
use marketplace_admin::idp::{IdpClient, IdpError};
use marketplace_admin::propagation::{PropagationError, RoleBridge};
use marketplace_core::{ExternalUserId, Role};

/// Errors that can occur during user operations.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database connection error: {0}")]
    Connect(#[from] sqlx::Error),

    #[error("Store error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Identity provider error: {0}")]
    Idp(#[from] IdpError),

    /// The local role was written but the provider still holds the old one.
    #[error("Role saved locally but not propagated: {0}")]
    Propagation(#[from] PropagationError),

    #[error("Invalid user id: {0}")]
    InvalidId(String),

    #[error("Invalid role: {0}. Valid roles: USER, ADMIN, SELLER")]
    InvalidRole(String),

    #[error("No user with id {0}")]
    NotFound(ExternalUserId),
}

fn parse_id(id: &str) -> Result<ExternalUserId, UserError> {
    ExternalUserId::parse(id).map_err(|e| UserError::InvalidId(e.to_string()))
}

async fn connect() -> Result<PgUserRepository, UserError> {
    dotenvy::dotenv().ok();

    let database_url = get_database_url("ADMIN_DATABASE_URL")?;
    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&database_url).await?;
    Ok(PgUserRepository::new(pool))
}

/// Set a user's role and propagate it to the identity provider.
///
/// # Errors
///
/// Returns an error if the arguments are invalid, the user does not exist,
/// or either write fails. A propagation failure leaves the local role set.
pub async fn set_role(id: &str, role: &str) -> Result<(), UserError> {
    let id = parse_id(id)?;
    let role: Role = role
        .parse()
        .map_err(|_| UserError::InvalidRole(role.to_owned()))?;

    let users = connect().await?;
    let idp = IdpConfig::from_env()?;
    let sync = SyncConfig::from_env()?;

    let user = match users.set_role(&id, role).await {
        Ok(user) => user,
        Err(RepositoryError::NotFound) => return Err(UserError::NotFound(id)),
        Err(e) => return Err(e.into()),
    };
    tracing::info!("Local role updated: {} is now {}", user.id, user.role);

    let client = IdpClient::new(&idp.api_url, idp.secret_key, sync.idp_timeout)?;
    let bridge = RoleBridge::new(Arc::new(client), sync.retry, sync.idp_timeout);
    let attempts = bridge.propagate_with_retry(&user.id, user.role).await?;

    tracing::info!(
        "Role propagated to identity provider after {} attempt(s)",
        attempts
    );
    Ok(())
}

/// Print a user's local record.
///
/// # Errors
///
/// Returns an error if the id is invalid, the user does not exist, or the
/// lookup fails.
pub async fn show(id: &str) -> Result<(), UserError> {
    let id = parse_id(id)?;
    let users = connect().await?;

    let user = users
        .find_by_id(&id)
        .await?
        .ok_or_else(|| UserError::NotFound(id))?;

    tracing::info!(
        "User {}: name={:?} email={} role={} created={} updated={}",
        user.id,
        user.name,
        user.email,
        user.role,
        user.created_at,
        user.updated_at
    );
    Ok(())
}
