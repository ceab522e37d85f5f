//! In-process identity provider.
//!
//! Holds role metadata and sessions in memory and can be told to fail
//! upcoming writes, which is how propagation retries are exercised.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use marketplace_core::{ExternalUserId, Role};

use super::{IdentityMetadata, IdpError, SessionVerifier};

#[derive(Debug, Default)]
pub struct InMemoryIdentityProvider {
    roles: RwLock<HashMap<ExternalUserId, Role>>,
    sessions: RwLock<HashMap<String, ExternalUserId>>,
    failing_writes: AtomicU32,
    rejecting_writes: AtomicU32,
    write_attempts: AtomicU32,
}

impl InMemoryIdentityProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an active session for `user`.
    pub async fn insert_session(&self, session_id: &str, user: ExternalUserId) {
        self.sessions
            .write()
            .await
            .insert(session_id.to_owned(), user);
    }

    /// Set a role directly, bypassing write accounting.
    pub async fn set_role(&self, user: &ExternalUserId, role: Role) {
        self.roles.write().await.insert(user.clone(), role);
    }

    /// Role currently held for `user`.
    pub async fn role_of(&self, user: &ExternalUserId) -> Option<Role> {
        self.roles.read().await.get(user).copied()
    }

    /// Fail the next `n` writes with a retryable error.
    pub fn fail_next_writes(&self, n: u32) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` writes with a permanent error.
    pub fn reject_next_writes(&self, n: u32) {
        self.rejecting_writes.store(n, Ordering::SeqCst);
    }

    /// Number of `write_role` calls seen, failed ones included.
    #[must_use]
    pub fn write_attempts(&self) -> u32 {
        self.write_attempts.load(Ordering::SeqCst)
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl IdentityMetadata for InMemoryIdentityProvider {
    async fn read_role(&self, id: &ExternalUserId) -> Result<Option<Role>, IdpError> {
        Ok(self.role_of(id).await)
    }

    async fn write_role(&self, id: &ExternalUserId, role: Role) -> Result<(), IdpError> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.rejecting_writes) {
            return Err(IdpError::Api {
                status: 422,
                message: "metadata rejected".to_owned(),
            });
        }
        if take_one(&self.failing_writes) {
            return Err(IdpError::Api {
                status: 503,
                message: "service unavailable".to_owned(),
            });
        }
        self.roles.write().await.insert(id.clone(), role);
        Ok(())
    }
}

#[async_trait]
impl SessionVerifier for InMemoryIdentityProvider {
    async fn resolve_session(&self, session_id: &str) -> Result<ExternalUserId, IdpError> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| IdpError::InactiveSession(session_id.to_owned()))
    }
}
