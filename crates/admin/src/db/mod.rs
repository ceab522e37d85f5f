//! Database operations for the marketplace `PostgreSQL` schema.
//!
//! ## Tables
//!
//! - `users` - Local mirror of identity-provider accounts (role is authoritative here)
//! - `categories` - Global catalog categories
//! - `sub_categories` - Categories' children (FK `category_id`, restrict on delete)
//! - `stores` - Seller-owned storefronts (FK `user_id`)
//! - `session` - tower-sessions storage
//!
//! Every unique column has a constraint named `<table>_<column>_key`; the
//! repositories surface violations as [`RepositoryError::Conflict`] carrying
//! that name so callers can map it back to the offending field.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/admin/migrations/` and run via:
//! ```bash
//! cargo run -p marketplace-cli -- migrate
//! ```

pub mod catalog;
pub mod memory;
pub mod users;

use std::time::Duration;

use async_trait::async_trait;
use marketplace_core::{
    CategoryId, Email, ExternalUserId, Role, StoreId, SubCategoryId, UrlSlug,
};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use uuid::Uuid;

use crate::catalog::{ResourceKind, UniqueField};
use crate::models::{
    Category, CategoryWrite, IdentityProfile, Store, StoreWrite, SubCategory, SubCategoryWrite,
    User,
};

pub use catalog::PgCatalogRepository;
pub use memory::InMemoryStore;
pub use users::PgUserRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Unique constraint violation; carries the constraint name.
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// Foreign key violation; carries the constraint name.
    #[error("foreign key violation: {0}")]
    ForeignKey(String),
}

impl RepositoryError {
    /// Classify a sqlx error, pulling constraint names out of unique and
    /// foreign key violations.
    pub(crate) fn from_write(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            let constraint = db_err.constraint().unwrap_or_default().to_owned();
            if db_err.is_unique_violation() {
                return Self::Conflict(constraint);
            }
            if db_err.is_foreign_key_violation() {
                return Self::ForeignKey(constraint);
            }
        }
        Self::Database(err)
    }
}

/// Access to the local user table.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Get a user by external id.
    async fn find_by_id(&self, id: &ExternalUserId) -> Result<Option<User>, RepositoryError>;

    /// Get the user currently holding `email`.
    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError>;

    /// Insert or refresh a user's profile fields.
    ///
    /// New rows get [`Role::User`]; existing rows keep their stored role.
    async fn upsert_profile(&self, profile: &IdentityProfile) -> Result<User, RepositoryError>;

    /// Overwrite a user's role.
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    async fn set_role(&self, id: &ExternalUserId, role: Role) -> Result<User, RepositoryError>;

    /// Delete a user. Returns whether a row was removed.
    async fn delete(&self, id: &ExternalUserId) -> Result<bool, RepositoryError>;
}

/// Access to categories, sub-categories and stores.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Id of the oldest row of `kind` whose `field` equals `value`, ignoring
    /// the row with id `exclude`.
    async fn find_first_by_field(
        &self,
        kind: ResourceKind,
        field: UniqueField,
        value: &str,
        exclude: Option<Uuid>,
    ) -> Result<Option<Uuid>, RepositoryError>;

    async fn find_category(&self, id: CategoryId) -> Result<Option<Category>, RepositoryError>;

    /// All categories, most recently updated first.
    async fn list_categories(&self) -> Result<Vec<Category>, RepositoryError>;

    async fn upsert_category(&self, write: &CategoryWrite) -> Result<Category, RepositoryError>;

    /// Returns `RepositoryError::ForeignKey` while sub-categories still reference it.
    async fn delete_category(&self, id: CategoryId) -> Result<bool, RepositoryError>;

    async fn find_sub_category(
        &self,
        id: SubCategoryId,
    ) -> Result<Option<SubCategory>, RepositoryError>;

    /// All sub-categories, most recently updated first.
    async fn list_sub_categories(&self) -> Result<Vec<SubCategory>, RepositoryError>;

    async fn upsert_sub_category(
        &self,
        write: &SubCategoryWrite,
    ) -> Result<SubCategory, RepositoryError>;

    async fn delete_sub_category(&self, id: SubCategoryId) -> Result<bool, RepositoryError>;

    async fn find_store(&self, id: StoreId) -> Result<Option<Store>, RepositoryError>;

    async fn find_store_by_url(&self, url: &UrlSlug) -> Result<Option<Store>, RepositoryError>;

    /// Stores owned by `owner`, most recently updated first.
    async fn list_stores_by_owner(
        &self,
        owner: &ExternalUserId,
    ) -> Result<Vec<Store>, RepositoryError>;

    /// Create or replace a store. The owner is only written on insert.
    async fn upsert_store(&self, write: &StoreWrite) -> Result<Store, RepositoryError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
