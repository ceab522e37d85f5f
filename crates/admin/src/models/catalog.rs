//! Catalog domain types: categories, sub-categories and stores.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use marketplace_core::{
    CategoryId, Email, ExternalUserId, Phone, StoreId, StoreStatus, SubCategoryId, UrlSlug,
};

use crate::catalog::{Candidate, ResourceKind, UniqueField};

/// A top-level catalog category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub image: String,
    pub url: UrlSlug,
    pub featured: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A category nested under exactly one [`Category`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubCategory {
    pub id: SubCategoryId,
    pub name: String,
    pub image: String,
    pub url: UrlSlug,
    pub featured: bool,
    pub category_id: CategoryId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A seller's storefront.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Store {
    pub id: StoreId,
    pub name: String,
    pub description: String,
    pub email: Email,
    pub phone: Phone,
    pub url: UrlSlug,
    pub logo: String,
    pub cover: String,
    pub featured: bool,
    pub status: StoreStatus,
    /// Owning seller; set at creation and never reassigned.
    pub user_id: ExternalUserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated category payload ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryWrite {
    pub id: CategoryId,
    pub name: String,
    pub image: String,
    pub url: UrlSlug,
    pub featured: bool,
}

/// Validated sub-category payload ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubCategoryWrite {
    pub id: SubCategoryId,
    pub name: String,
    pub image: String,
    pub url: UrlSlug,
    pub featured: bool,
    pub category_id: CategoryId,
}

/// Validated store payload ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreWrite {
    pub id: StoreId,
    pub name: String,
    pub description: String,
    pub email: Email,
    pub phone: Phone,
    pub url: UrlSlug,
    pub logo: String,
    pub cover: String,
    pub featured: bool,
    pub status: StoreStatus,
    /// Owner recorded if this write creates the row; ignored on update.
    pub owner: ExternalUserId,
}

impl Candidate for CategoryWrite {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Category
    }

    fn id(&self) -> Uuid {
        self.id.as_uuid()
    }

    fn unique_value(&self, field: UniqueField) -> Option<&str> {
        match field {
            UniqueField::Name => Some(&self.name),
            UniqueField::Url => Some(self.url.as_str()),
            UniqueField::Email | UniqueField::Phone => None,
        }
    }
}

impl Candidate for SubCategoryWrite {
    fn kind(&self) -> ResourceKind {
        ResourceKind::SubCategory
    }

    fn id(&self) -> Uuid {
        self.id.as_uuid()
    }

    fn unique_value(&self, field: UniqueField) -> Option<&str> {
        match field {
            UniqueField::Name => Some(&self.name),
            UniqueField::Url => Some(self.url.as_str()),
            UniqueField::Email | UniqueField::Phone => None,
        }
    }
}

impl Candidate for StoreWrite {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Store
    }

    fn id(&self) -> Uuid {
        self.id.as_uuid()
    }

    fn unique_value(&self, field: UniqueField) -> Option<&str> {
        Some(match field {
            UniqueField::Name => &self.name,
            UniqueField::Email => self.email.as_str(),
            UniqueField::Phone => self.phone.as_str(),
            UniqueField::Url => self.url.as_str(),
        })
    }
}
