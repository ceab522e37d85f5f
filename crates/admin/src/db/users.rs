//! User repository for database operations.
//!
//! Users are keyed by their identity-provider id. Profile syncs never touch
//! the stored role; only [`UserRepository::set_role`] does.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;

use marketplace_core::{Email, ExternalUserId, Role};

use super::{RepositoryError, UserRepository};
use crate::models::{IdentityProfile, User};

// =============================================================================
// Internal Row Types
// =============================================================================

/// Internal row type for `PostgreSQL` user queries.
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: String,
    name: String,
    email: String,
    picture: String,
    role: Role,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let id = ExternalUserId::parse(&row.id).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid user id in database: {e}"))
        })?;
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;

        Ok(Self {
            id,
            name: row.name,
            email,
            picture: row.picture,
            role: row.role,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const USER_COLUMNS: &str = "id, name, email, picture, role, created_at, updated_at";

// =============================================================================
// Repository
// =============================================================================

/// `PostgreSQL` implementation of [`UserRepository`].
#[derive(Debug, Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    #[instrument(skip(self), fields(user_id = %id))]
    async fn find_by_id(&self, id: &ExternalUserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM marketplace.users WHERE id = $1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    #[instrument(skip(self, email))]
    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM marketplace.users WHERE email = $1"
        ))
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    #[instrument(skip(self, profile), fields(user_id = %profile.id))]
    async fn upsert_profile(&self, profile: &IdentityProfile) -> Result<User, RepositoryError> {
        // `role` is only part of the INSERT; the UPDATE branch leaves it alone.
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r"
            INSERT INTO marketplace.users (id, name, email, picture, role)
            VALUES ($1, $2, $3, $4, 'USER')
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                email = EXCLUDED.email,
                picture = EXCLUDED.picture,
                updated_at = NOW()
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(profile.id.as_str())
        .bind(&profile.name)
        .bind(profile.email.as_str())
        .bind(&profile.picture)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from_write)?;

        row.try_into()
    }

    #[instrument(skip(self), fields(user_id = %id, role = %role))]
    async fn set_role(&self, id: &ExternalUserId, role: Role) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r"
            UPDATE marketplace.users
            SET role = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(id.as_str())
        .bind(role)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    #[instrument(skip(self), fields(user_id = %id))]
    async fn delete(&self, id: &ExternalUserId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM marketplace.users WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from_write)?;

        Ok(result.rows_affected() > 0)
    }
}
