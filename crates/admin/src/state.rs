//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::authz::AuthorizationGate;
use crate::catalog::UpsertEngine;
use crate::config::{AdminConfig, SyncConfig};
use crate::db::{CatalogRepository, PgCatalogRepository, PgUserRepository, UserRepository};
use crate::identity::{IdentityIngestor, SignatureError, WebhookVerifier};
use crate::idp::{IdentityMetadata, IdpClient, IdpError, SessionVerifier};
use crate::propagation::RoleBridge;

/// Error creating application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("identity provider client: {0}")]
    Idp(#[from] IdpError),
    #[error("webhook signing secret: {0}")]
    WebhookSecret(#[from] SignatureError),
}

/// The store and identity-provider implementations the services run on.
///
/// Production wires the `PostgreSQL` repositories and the HTTP client; tests
/// wire the in-memory ones.
#[derive(Clone)]
pub struct Backends {
    /// Present when running against `PostgreSQL`; used by readiness checks.
    pub pool: Option<PgPool>,
    pub users: Arc<dyn UserRepository>,
    pub catalog: Arc<dyn CatalogRepository>,
    pub metadata: Arc<dyn IdentityMetadata>,
    pub sessions: Arc<dyn SessionVerifier>,
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// services built once at startup.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    backends: Backends,
    sync: SyncConfig,
    verifier: WebhookVerifier,
    ingestor: IdentityIngestor,
    engine: UpsertEngine,
}

impl AppState {
    /// Create the production state: `PostgreSQL` repositories and the
    /// identity provider's backend API.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the webhook
    /// signing secret is not valid base64.
    pub fn new(config: &AdminConfig, pool: PgPool) -> Result<Self, StateError> {
        let idp = Arc::new(IdpClient::new(
            &config.idp.api_url,
            config.idp.secret_key.clone(),
            config.sync.idp_timeout,
        )?);
        let verifier =
            WebhookVerifier::new(&config.idp.webhook_secret, config.sync.webhook_tolerance)?;

        let backends = Backends {
            users: Arc::new(PgUserRepository::new(pool.clone())),
            catalog: Arc::new(PgCatalogRepository::new(pool.clone())),
            metadata: idp.clone(),
            sessions: idp,
            pool: Some(pool),
        };

        Ok(Self::from_backends(backends, verifier, config.sync))
    }

    /// Assemble the services over arbitrary backends.
    #[must_use]
    pub fn from_backends(backends: Backends, verifier: WebhookVerifier, sync: SyncConfig) -> Self {
        let bridge = RoleBridge::new(Arc::clone(&backends.metadata), sync.retry, sync.idp_timeout);
        let ingestor =
            IdentityIngestor::new(Arc::clone(&backends.users), bridge, sync.store_timeout);
        let gate = AuthorizationGate::new(
            Arc::clone(&backends.users),
            sync.store_timeout,
            sync.claim_ttl,
        );
        let engine = UpsertEngine::new(gate, Arc::clone(&backends.catalog), sync.store_timeout);

        Self {
            inner: Arc::new(AppStateInner {
                backends,
                sync,
                verifier,
                ingestor,
                engine,
            }),
        }
    }

    /// Get the database pool, if running against `PostgreSQL`.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.backends.pool.as_ref()
    }

    #[must_use]
    pub fn sync(&self) -> &SyncConfig {
        &self.inner.sync
    }

    /// Identity provider metadata channel (role reads and writes).
    #[must_use]
    pub fn metadata(&self) -> &dyn IdentityMetadata {
        self.inner.backends.metadata.as_ref()
    }

    /// Identity provider session lookup.
    #[must_use]
    pub fn sessions(&self) -> &dyn SessionVerifier {
        self.inner.backends.sessions.as_ref()
    }

    #[must_use]
    pub fn verifier(&self) -> &WebhookVerifier {
        &self.inner.verifier
    }

    #[must_use]
    pub fn ingestor(&self) -> &IdentityIngestor {
        &self.inner.ingestor
    }

    #[must_use]
    pub fn engine(&self) -> &UpsertEngine {
        &self.inner.engine
    }
}
