//! Role propagation into identity-provider metadata.
//!
//! After the local store records a user's role, the role is pushed into the
//! provider so that later sessions carry it as a claim. The push is
//! fire-and-forget from the caller's point of view: failures are logged and
//! retried with exponential backoff, and never undo the local write.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{Instrument, info_span, instrument};

use marketplace_core::{ExternalUserId, Role};

use crate::idp::{IdentityMetadata, IdpError};

/// Backoff never waits longer than this between attempts.
const MAX_DELAY: Duration = Duration::from_secs(30);

/// Errors from pushing a role to the identity provider.
#[derive(Debug, Error)]
pub enum PropagationError {
    /// A single attempt did not finish in time.
    #[error("role propagation timed out after {0:?}")]
    Timeout(Duration),

    /// The provider call failed.
    #[error(transparent)]
    Idp(#[from] IdpError),

    /// Every attempt failed with a retryable error.
    #[error("role propagation gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<PropagationError>,
    },

    /// The background task panicked or was cancelled.
    #[error("role propagation task aborted: {0}")]
    Aborted(String),
}

impl PropagationError {
    /// Whether another attempt could succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Idp(err) => err.is_retryable(),
            Self::Exhausted { .. } | Self::Aborted(_) => false,
        }
    }
}

/// Exponential backoff settings.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles afterwards.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after failed attempt number `attempt` (1-based):
    /// `base * 2^(attempt-1)`, capped at 30 s, plus up to 25% jitter.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let backoff = self
            .base_delay
            .saturating_mul(1_u32 << exponent)
            .min(MAX_DELAY);

        let jitter_cap = u64::try_from(backoff.as_millis() / 4).unwrap_or(0);
        let jitter = if jitter_cap == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_cap)
        };
        backoff + Duration::from_millis(jitter)
    }
}

/// Handle to a propagation running in the background.
#[derive(Debug)]
pub struct PropagationHandle {
    inner: JoinHandle<Result<u32, PropagationError>>,
}

impl PropagationHandle {
    /// Wait for the background propagation to finish.
    ///
    /// # Errors
    ///
    /// Returns the propagation's final error, or `PropagationError::Aborted`
    /// if the task did not run to completion.
    pub async fn join(self) -> Result<u32, PropagationError> {
        self.inner
            .await
            .map_err(|e| PropagationError::Aborted(e.to_string()))?
    }
}

/// Writes authoritative roles into identity-provider metadata.
#[derive(Clone)]
pub struct RoleBridge {
    metadata: Arc<dyn IdentityMetadata>,
    policy: RetryPolicy,
    attempt_timeout: Duration,
}

impl RoleBridge {
    #[must_use]
    pub fn new(
        metadata: Arc<dyn IdentityMetadata>,
        policy: RetryPolicy,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            metadata,
            policy,
            attempt_timeout,
        }
    }

    /// One time-bounded write of `role` for `id`.
    ///
    /// # Errors
    ///
    /// Returns `PropagationError::Timeout` or the provider error.
    pub async fn propagate(&self, id: &ExternalUserId, role: Role) -> Result<(), PropagationError> {
        match tokio::time::timeout(self.attempt_timeout, self.metadata.write_role(id, role)).await {
            Ok(result) => result.map_err(PropagationError::from),
            Err(_) => Err(PropagationError::Timeout(self.attempt_timeout)),
        }
    }

    /// Write `role` for `id`, retrying retryable failures with backoff.
    ///
    /// Returns the number of attempts it took. Writes are idempotent, so
    /// repeating one that actually landed is harmless.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error, or `PropagationError::Exhausted`
    /// once the policy's attempts are used up.
    #[instrument(skip(self), fields(user_id = %id, role = %role))]
    pub async fn propagate_with_retry(
        &self,
        id: &ExternalUserId,
        role: Role,
    ) -> Result<u32, PropagationError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.propagate(id, role).await {
                Ok(()) => {
                    tracing::info!(attempt, "Role propagated");
                    return Ok(attempt);
                }
                Err(err) if !err.is_retryable() => {
                    tracing::error!(attempt, error = %err, "Role propagation rejected");
                    return Err(err);
                }
                Err(err) if attempt >= max_attempts => {
                    tracing::error!(attempt, error = %err, "Role propagation exhausted retries");
                    return Err(PropagationError::Exhausted {
                        attempts: attempt,
                        last: Box::new(err),
                    });
                }
                Err(err) => {
                    let delay = self.policy.delay_for(attempt);
                    tracing::warn!(
                        attempt,
                        delay_ms = %delay.as_millis(),
                        error = %err,
                        "Role propagation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Start propagation in the background and return immediately.
    #[must_use]
    pub fn dispatch(&self, id: ExternalUserId, role: Role) -> PropagationHandle {
        let bridge = self.clone();
        let span = info_span!("role_propagation", user_id = %id, role = %role);
        let inner = tokio::spawn(
            async move { bridge.propagate_with_retry(&id, role).await }.instrument(span),
        );
        PropagationHandle { inner }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::idp::InMemoryIdentityProvider;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
        }
    }

    fn user() -> ExternalUserId {
        ExternalUserId::parse("u1").unwrap()
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
        };
        let first = policy.delay_for(1);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(125));
        let third = policy.delay_for(3);
        assert!(third >= Duration::from_millis(400) && third <= Duration::from_millis(500));
        let capped = policy.delay_for(20);
        assert!(capped >= MAX_DELAY && capped <= MAX_DELAY + MAX_DELAY / 4);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let idp = Arc::new(InMemoryIdentityProvider::new());
        idp.fail_next_writes(2);
        let bridge = RoleBridge::new(idp.clone(), fast_policy(5), Duration::from_secs(1));

        let attempts = bridge
            .propagate_with_retry(&user(), Role::Seller)
            .await
            .unwrap();

        assert_eq!(attempts, 3);
        assert_eq!(idp.role_of(&user()).await, Some(Role::Seller));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let idp = Arc::new(InMemoryIdentityProvider::new());
        idp.fail_next_writes(10);
        let bridge = RoleBridge::new(idp.clone(), fast_policy(3), Duration::from_secs(1));

        let err = bridge
            .propagate_with_retry(&user(), Role::Admin)
            .await
            .unwrap_err();

        assert!(matches!(err, PropagationError::Exhausted { attempts: 3, .. }));
        assert_eq!(idp.write_attempts(), 3);
        assert_eq!(idp.role_of(&user()).await, None);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let idp = Arc::new(InMemoryIdentityProvider::new());
        idp.reject_next_writes(1);
        let bridge = RoleBridge::new(idp.clone(), fast_policy(5), Duration::from_secs(1));

        let err = bridge
            .propagate_with_retry(&user(), Role::Admin)
            .await
            .unwrap_err();

        assert!(matches!(err, PropagationError::Idp(_)));
        assert_eq!(idp.write_attempts(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_runs_in_background() {
        let idp = Arc::new(InMemoryIdentityProvider::new());
        let bridge = RoleBridge::new(idp.clone(), fast_policy(2), Duration::from_secs(1));

        let handle = bridge.dispatch(user(), Role::User);
        assert_eq!(handle.join().await.unwrap(), 1);
        assert_eq!(idp.role_of(&user()).await, Some(Role::User));
    }
}
