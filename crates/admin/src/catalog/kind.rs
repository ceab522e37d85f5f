//! Catalog resource kinds and their uniqueness configuration.

use core::fmt;

use marketplace_core::Role;
use serde::Serialize;

/// A field that must be unique across all rows of a resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UniqueField {
    Name,
    Email,
    Phone,
    Url,
}

impl UniqueField {
    /// Column holding this field in every catalog table.
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Url => "url",
        }
    }
}

impl fmt::Display for UniqueField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// The catalog resources that go through the gated upsert protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Category,
    SubCategory,
    Store,
}

impl ResourceKind {
    /// Role a caller must hold (exactly) to mutate this kind.
    #[must_use]
    pub const fn required_role(self) -> Role {
        match self {
            Self::Category | Self::SubCategory => Role::Admin,
            Self::Store => Role::Seller,
        }
    }

    /// Unique fields in the order conflicts are reported.
    #[must_use]
    pub const fn unique_fields(self) -> &'static [UniqueField] {
        match self {
            Self::Category | Self::SubCategory => &[UniqueField::Name, UniqueField::Url],
            Self::Store => &[
                UniqueField::Name,
                UniqueField::Email,
                UniqueField::Phone,
                UniqueField::Url,
            ],
        }
    }

    /// Backing table.
    #[must_use]
    pub const fn table(self) -> &'static str {
        match self {
            Self::Category => "marketplace.categories",
            Self::SubCategory => "marketplace.sub_categories",
            Self::Store => "marketplace.stores",
        }
    }

    /// Human-readable name used in error messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Category => "category",
            Self::SubCategory => "sub category",
            Self::Store => "store",
        }
    }

    /// Map a unique-index name from the store back to the field it guards.
    ///
    /// Index names follow `<table>_<column>_key`.
    #[must_use]
    pub fn field_for_constraint(self, constraint: &str) -> Option<UniqueField> {
        self.unique_fields()
            .iter()
            .copied()
            .find(|field| constraint.ends_with(&format!("_{}_key", field.column())))
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
