//! Identity provider backend API client.
//!
//! Provides methods for reading and writing a user's role in private
//! metadata, and for resolving session tokens.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use marketplace_core::{ExternalUserId, Role};

use super::{IdentityMetadata, IdpError, SessionVerifier, is_valid_session_id};

/// User object as returned by `GET /users/{id}` (fields we use).
#[derive(Debug, Deserialize)]
struct UserResponse {
    #[serde(default)]
    private_metadata: PrivateMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct PrivateMetadata {
    #[serde(default)]
    role: Option<String>,
}

/// Session object as returned by `GET /sessions/{id}` (fields we use).
#[derive(Debug, Deserialize)]
struct SessionResponse {
    user_id: String,
    status: String,
}

/// Identity provider API client.
#[derive(Clone)]
pub struct IdpClient {
    /// HTTP client.
    client: Client,
    /// API base, without trailing slash (e.g. `https://api.clerk.com/v1`).
    base_url: String,
    /// Backend secret key.
    secret_key: SecretString,
}

impl std::fmt::Debug for IdpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdpClient")
            .field("base_url", &self.base_url)
            .field("secret_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl IdpClient {
    /// Create a new client. `timeout` bounds every request.
    ///
    /// # Errors
    ///
    /// Returns `IdpError::Request` if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        secret_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, IdpError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IdpError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            secret_key,
        })
    }

    /// Fetch a user's private-metadata role.
    ///
    /// A missing or unrecognized role yields `None`: such a claim is not
    /// trusted and callers fall back to the local store.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the user does not exist.
    #[instrument(skip(self), fields(user_id = %id))]
    pub async fn get_user_role(&self, id: &ExternalUserId) -> Result<Option<Role>, IdpError> {
        let response = self
            .client
            .get(format!("{}/users/{}", self.base_url, id.as_str()))
            .bearer_auth(self.secret_key.expose_secret())
            .send()
            .await
            .map_err(|e| IdpError::Request(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(IdpError::UserNotFound(id.to_string()));
        }
        let user: UserResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| IdpError::Response(e.to_string()))?;

        let role = user
            .private_metadata
            .role
            .and_then(|raw| match raw.parse::<Role>() {
                Ok(role) => Some(role),
                Err(e) => {
                    warn!(error = %e, "Ignoring unrecognized role claim");
                    None
                }
            });
        Ok(role)
    }

    /// Merge `{"role": role}` into the user's private metadata.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the provider rejects it.
    #[instrument(skip(self), fields(user_id = %id, role = %role))]
    pub async fn update_user_role(&self, id: &ExternalUserId, role: Role) -> Result<(), IdpError> {
        let body = serde_json::json!({ "private_metadata": { "role": role } });

        let response = self
            .client
            .patch(format!("{}/users/{}/metadata", self.base_url, id.as_str()))
            .bearer_auth(self.secret_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| IdpError::Request(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(IdpError::UserNotFound(id.to_string()));
        }
        check_status(response).await?;

        debug!("Role written to identity provider metadata");
        Ok(())
    }

    /// Look up a session and return its user if it is active.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the session is not active.
    #[instrument(skip(self, session_id))]
    pub async fn get_active_session_user(
        &self,
        session_id: &str,
    ) -> Result<ExternalUserId, IdpError> {
        if !is_valid_session_id(session_id) {
            return Err(IdpError::InactiveSession(session_id.to_owned()));
        }

        let response = self
            .client
            .get(format!("{}/sessions/{session_id}", self.base_url))
            .bearer_auth(self.secret_key.expose_secret())
            .send()
            .await
            .map_err(|e| IdpError::Request(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(IdpError::InactiveSession(session_id.to_owned()));
        }
        let session: SessionResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| IdpError::Response(e.to_string()))?;

        if session.status != "active" {
            return Err(IdpError::InactiveSession(session_id.to_owned()));
        }

        ExternalUserId::parse(&session.user_id).map_err(|e| IdpError::Response(e.to_string()))
    }
}

/// Turn non-success statuses into errors, keeping the body for diagnostics.
async fn check_status(response: Response) -> Result<Response, IdpError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(IdpError::RateLimited { retry_after });
    }

    let message = response.text().await.unwrap_or_default();
    Err(IdpError::Api {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl IdentityMetadata for IdpClient {
    async fn read_role(&self, id: &ExternalUserId) -> Result<Option<Role>, IdpError> {
        self.get_user_role(id).await
    }

    async fn write_role(&self, id: &ExternalUserId, role: Role) -> Result<(), IdpError> {
        self.update_user_role(id, role).await
    }
}

#[async_trait]
impl SessionVerifier for IdpClient {
    async fn resolve_session(&self, session_id: &str) -> Result<ExternalUserId, IdpError> {
        self.get_active_session_user(session_id).await
    }
}
