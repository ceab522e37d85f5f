//! Catalog repository for database operations.
//!
//! Categories, sub-categories and stores all follow the same shape: keyed by
//! a locally generated UUID, with unique indexes on every field listed in
//! [`ResourceKind::unique_fields`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use marketplace_core::{
    CategoryId, Email, ExternalUserId, Phone, StoreId, StoreStatus, SubCategoryId, UrlSlug,
};

use super::{CatalogRepository, RepositoryError};
use crate::catalog::{ResourceKind, UniqueField};
use crate::models::{Category, CategoryWrite, Store, StoreWrite, SubCategory, SubCategoryWrite};

// =============================================================================
// Internal Row Types
// =============================================================================

fn corrupt(what: &str, err: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::DataCorruption(format!("invalid {what} in database: {err}"))
}

#[derive(Debug, sqlx::FromRow)]
struct CategoryRow {
    id: Uuid,
    name: String,
    image: String,
    url: String,
    featured: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CategoryRow> for Category {
    type Error = RepositoryError;

    fn try_from(row: CategoryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: CategoryId::from(row.id),
            name: row.name,
            image: row.image,
            url: UrlSlug::parse(&row.url).map_err(|e| corrupt("category url", e))?,
            featured: row.featured,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SubCategoryRow {
    id: Uuid,
    name: String,
    image: String,
    url: String,
    featured: bool,
    category_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubCategoryRow> for SubCategory {
    type Error = RepositoryError;

    fn try_from(row: SubCategoryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: SubCategoryId::from(row.id),
            name: row.name,
            image: row.image,
            url: UrlSlug::parse(&row.url).map_err(|e| corrupt("sub category url", e))?,
            featured: row.featured,
            category_id: CategoryId::from(row.category_id),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StoreRow {
    id: Uuid,
    name: String,
    description: String,
    email: String,
    phone: String,
    url: String,
    logo: String,
    cover: String,
    featured: bool,
    status: StoreStatus,
    user_id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<StoreRow> for Store {
    type Error = RepositoryError;

    fn try_from(row: StoreRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: StoreId::from(row.id),
            name: row.name,
            description: row.description,
            email: Email::parse(&row.email).map_err(|e| corrupt("store email", e))?,
            phone: Phone::parse(&row.phone).map_err(|e| corrupt("store phone", e))?,
            url: UrlSlug::parse(&row.url).map_err(|e| corrupt("store url", e))?,
            logo: row.logo,
            cover: row.cover,
            featured: row.featured,
            status: row.status,
            user_id: ExternalUserId::parse(&row.user_id).map_err(|e| corrupt("store owner", e))?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const CATEGORY_COLUMNS: &str = "id, name, image, url, featured, created_at, updated_at";
const SUB_CATEGORY_COLUMNS: &str =
    "id, name, image, url, featured, category_id, created_at, updated_at";
const STORE_COLUMNS: &str = "id, name, description, email, phone, url, logo, cover, featured, \
                             status, user_id, created_at, updated_at";

// =============================================================================
// Repository
// =============================================================================

/// `PostgreSQL` implementation of [`CatalogRepository`].
#[derive(Debug, Clone)]
pub struct PgCatalogRepository {
    pool: PgPool,
}

impl PgCatalogRepository {
    /// Create a new catalog repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogRepository for PgCatalogRepository {
    #[instrument(skip(self, value), fields(kind = %kind, field = %field))]
    async fn find_first_by_field(
        &self,
        kind: ResourceKind,
        field: UniqueField,
        value: &str,
        exclude: Option<Uuid>,
    ) -> Result<Option<Uuid>, RepositoryError> {
        // Table and column come from closed enums, never from input.
        if !kind.unique_fields().contains(&field) {
            return Ok(None);
        }

        let sql = format!(
            r"
            SELECT id FROM {table}
            WHERE {column} = $1 AND ($2::uuid IS NULL OR id <> $2)
            ORDER BY created_at ASC
            LIMIT 1
            ",
            table = kind.table(),
            column = field.column(),
        );

        let id = sqlx::query_scalar::<_, Uuid>(&sql)
            .bind(value)
            .bind(exclude)
            .fetch_optional(&self.pool)
            .await?;

        Ok(id)
    }

    #[instrument(skip(self), fields(category_id = %id))]
    async fn find_category(&self, id: CategoryId) -> Result<Option<Category>, RepositoryError> {
        let row = sqlx::query_as::<_, CategoryRow>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM marketplace.categories WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    #[instrument(skip(self))]
    async fn list_categories(&self) -> Result<Vec<Category>, RepositoryError> {
        let rows = sqlx::query_as::<_, CategoryRow>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM marketplace.categories ORDER BY updated_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    #[instrument(skip(self, write), fields(category_id = %write.id))]
    async fn upsert_category(&self, write: &CategoryWrite) -> Result<Category, RepositoryError> {
        let row = sqlx::query_as::<_, CategoryRow>(&format!(
            r"
            INSERT INTO marketplace.categories (id, name, image, url, featured)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                image = EXCLUDED.image,
                url = EXCLUDED.url,
                featured = EXCLUDED.featured,
                updated_at = NOW()
            RETURNING {CATEGORY_COLUMNS}
            "
        ))
        .bind(write.id)
        .bind(&write.name)
        .bind(&write.image)
        .bind(write.url.as_str())
        .bind(write.featured)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from_write)?;

        row.try_into()
    }

    #[instrument(skip(self), fields(category_id = %id))]
    async fn delete_category(&self, id: CategoryId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM marketplace.categories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from_write)?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(sub_category_id = %id))]
    async fn find_sub_category(
        &self,
        id: SubCategoryId,
    ) -> Result<Option<SubCategory>, RepositoryError> {
        let row = sqlx::query_as::<_, SubCategoryRow>(&format!(
            "SELECT {SUB_CATEGORY_COLUMNS} FROM marketplace.sub_categories WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    #[instrument(skip(self))]
    async fn list_sub_categories(&self) -> Result<Vec<SubCategory>, RepositoryError> {
        let rows = sqlx::query_as::<_, SubCategoryRow>(&format!(
            "SELECT {SUB_CATEGORY_COLUMNS} FROM marketplace.sub_categories ORDER BY updated_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    #[instrument(skip(self, write), fields(sub_category_id = %write.id))]
    async fn upsert_sub_category(
        &self,
        write: &SubCategoryWrite,
    ) -> Result<SubCategory, RepositoryError> {
        let row = sqlx::query_as::<_, SubCategoryRow>(&format!(
            r"
            INSERT INTO marketplace.sub_categories (id, name, image, url, featured, category_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                image = EXCLUDED.image,
                url = EXCLUDED.url,
                featured = EXCLUDED.featured,
                category_id = EXCLUDED.category_id,
                updated_at = NOW()
            RETURNING {SUB_CATEGORY_COLUMNS}
            "
        ))
        .bind(write.id)
        .bind(&write.name)
        .bind(&write.image)
        .bind(write.url.as_str())
        .bind(write.featured)
        .bind(write.category_id)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from_write)?;

        row.try_into()
    }

    #[instrument(skip(self), fields(sub_category_id = %id))]
    async fn delete_sub_category(&self, id: SubCategoryId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM marketplace.sub_categories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from_write)?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(store_id = %id))]
    async fn find_store(&self, id: StoreId) -> Result<Option<Store>, RepositoryError> {
        let row = sqlx::query_as::<_, StoreRow>(&format!(
            "SELECT {STORE_COLUMNS} FROM marketplace.stores WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    #[instrument(skip(self), fields(url = %url))]
    async fn find_store_by_url(&self, url: &UrlSlug) -> Result<Option<Store>, RepositoryError> {
        let row = sqlx::query_as::<_, StoreRow>(&format!(
            "SELECT {STORE_COLUMNS} FROM marketplace.stores WHERE url = $1"
        ))
        .bind(url.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    #[instrument(skip(self), fields(owner = %owner))]
    async fn list_stores_by_owner(
        &self,
        owner: &ExternalUserId,
    ) -> Result<Vec<Store>, RepositoryError> {
        let rows = sqlx::query_as::<_, StoreRow>(&format!(
            "SELECT {STORE_COLUMNS} FROM marketplace.stores WHERE user_id = $1 ORDER BY updated_at DESC"
        ))
        .bind(owner.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    #[instrument(skip(self, write), fields(store_id = %write.id))]
    async fn upsert_store(&self, write: &StoreWrite) -> Result<Store, RepositoryError> {
        // user_id is deliberately absent from the SET list.
        let row = sqlx::query_as::<_, StoreRow>(&format!(
            r"
            INSERT INTO marketplace.stores
                (id, name, description, email, phone, url, logo, cover, featured, status, user_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                description = EXCLUDED.description,
                email = EXCLUDED.email,
                phone = EXCLUDED.phone,
                url = EXCLUDED.url,
                logo = EXCLUDED.logo,
                cover = EXCLUDED.cover,
                featured = EXCLUDED.featured,
                status = EXCLUDED.status,
                updated_at = NOW()
            RETURNING {STORE_COLUMNS}
            "
        ))
        .bind(write.id)
        .bind(&write.name)
        .bind(&write.description)
        .bind(write.email.as_str())
        .bind(write.phone.as_str())
        .bind(write.url.as_str())
        .bind(&write.logo)
        .bind(&write.cover)
        .bind(write.featured)
        .bind(write.status)
        .bind(write.owner.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from_write)?;

        row.try_into()
    }
}
