//! Store lifecycle status.

use serde::{Deserialize, Serialize};

/// Moderation status of a store.
///
/// New stores start as `Pending` until an operator activates them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "marketplace.store_status", rename_all = "UPPERCASE")
)]
#[serde(rename_all = "UPPERCASE")]
pub enum StoreStatus {
    #[default]
    Pending,
    Active,
    Banned,
    Disabled,
}

impl std::fmt::Display for StoreStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Active => write!(f, "ACTIVE"),
            Self::Banned => write!(f, "BANNED"),
            Self::Disabled => write!(f, "DISABLED"),
        }
    }
}
