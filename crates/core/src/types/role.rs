//! Marketplace user roles.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when a string does not name a [`Role`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid role: {0} (expected USER, ADMIN or SELLER)")]
pub struct RoleParseError(pub String);

/// Role of a marketplace user.
///
/// Roles are compared for equality only: an `Admin` does not implicitly hold
/// `Seller` rights, and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "marketplace.user_role", rename_all = "UPPERCASE")
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    /// Regular shopper; the role every account starts with.
    #[default]
    User,
    /// Marketplace operator; manages categories and sub-categories.
    Admin,
    /// Merchant; manages the stores they own.
    Seller,
}

impl Role {
    /// Wire and storage representation (`USER`, `ADMIN`, `SELLER`).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Admin => "ADMIN",
            Self::Seller => "SELLER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USER" => Ok(Self::User),
            "ADMIN" => Ok(Self::Admin),
            "SELLER" => Ok(Self::Seller),
            _ => Err(RoleParseError(s.to_owned())),
        }
    }
}
