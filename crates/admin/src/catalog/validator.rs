//! Pre-flight uniqueness checks for catalog writes.
//!
//! The unique indexes in the store are what actually keep values unique; this
//! check exists so the caller gets a precise error (which field, which row)
//! before a write is attempted.

use std::sync::Arc;
use std::time::Duration;

use tracing::instrument;
use uuid::Uuid;

use super::{ResourceKind, UniqueField};
use crate::db::CatalogRepository;
use crate::error::AppError;
use crate::timeout::bounded;

/// Something that can be checked for uniqueness before it is written.
pub trait Candidate: Send + Sync {
    fn kind(&self) -> ResourceKind;

    /// Id the candidate will be stored under; excluded from conflict checks.
    fn id(&self) -> Uuid;

    /// Value of `field`, or `None` if this kind has no such column.
    fn unique_value(&self, field: UniqueField) -> Option<&str>;
}

/// The first unique field that collides, and the row it collides with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conflict {
    pub field: UniqueField,
    pub existing_id: Uuid,
}

/// Reports uniqueness conflicts in each kind's configured priority order.
#[derive(Clone)]
pub struct UniquenessValidator {
    catalog: Arc<dyn CatalogRepository>,
    timeout: Duration,
}

impl UniquenessValidator {
    #[must_use]
    pub fn new(catalog: Arc<dyn CatalogRepository>, timeout: Duration) -> Self {
        Self { catalog, timeout }
    }

    /// Find the highest-priority field of `candidate` already held by a row
    /// other than `exclude`.
    ///
    /// Fields are checked one at a time in priority order, so the answer does
    /// not depend on how the store orders rows.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Transient` if a lookup fails or times out.
    #[instrument(skip(self, candidate), fields(kind = %candidate.kind()))]
    pub async fn find_conflict(
        &self,
        candidate: &dyn Candidate,
        exclude: Uuid,
    ) -> Result<Option<Conflict>, AppError> {
        let kind = candidate.kind();
        for &field in kind.unique_fields() {
            let Some(value) = candidate.unique_value(field) else {
                continue;
            };
            let found = bounded(
                self.timeout,
                "uniqueness lookup",
                self.catalog
                    .find_first_by_field(kind, field, value, Some(exclude)),
            )
            .await?;

            if let Some(existing_id) = found {
                tracing::debug!(%field, %existing_id, "Uniqueness conflict");
                return Ok(Some(Conflict { field, existing_id }));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use marketplace_core::{Email, ExternalUserId, Phone, StoreId, StoreStatus, UrlSlug};

    use super::*;
    use crate::db::{InMemoryStore, UserRepository};
    use crate::models::{IdentityProfile, StoreWrite};

    fn store_write(name: &str, email: &str, phone: &str, url: &str) -> StoreWrite {
        StoreWrite {
            id: StoreId::generate(),
            name: name.to_owned(),
            description: "A store that sells everything you could need.".to_owned(),
            email: Email::parse(email).unwrap(),
            phone: Phone::parse(phone).unwrap(),
            url: UrlSlug::parse(url).unwrap(),
            logo: "l".to_owned(),
            cover: "c".to_owned(),
            featured: false,
            status: StoreStatus::Pending,
            owner: ExternalUserId::parse("u1").unwrap(),
        }
    }

    async fn seeded() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store
            .upsert_profile(&IdentityProfile {
                id: ExternalUserId::parse("u1").unwrap(),
                name: "Jane".to_owned(),
                email: Email::parse("jane@x.com").unwrap(),
                picture: String::new(),
            })
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_earliest_field_wins() {
        let store = seeded().await;
        // Inserted first, conflicts only on url.
        store
            .upsert_store(&store_write("Other", "o@x.com", "+2", "acme"))
            .await
            .unwrap();
        // Inserted second, conflicts only on name.
        let by_name = store_write("Acme", "n@x.com", "+3", "named");
        store.upsert_store(&by_name).await.unwrap();

        let validator = UniquenessValidator::new(store, Duration::from_secs(1));
        let candidate = store_write("Acme", "new@x.com", "+4", "acme");
        let conflict = validator
            .find_conflict(&candidate, candidate.id.as_uuid())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(conflict.field, UniqueField::Name);
        assert_eq!(conflict.existing_id, by_name.id.as_uuid());
    }

    #[tokio::test]
    async fn test_own_values_do_not_conflict() {
        let store = seeded().await;
        let existing = store_write("Acme", "shop@acme.com", "+1000", "acme");
        store.upsert_store(&existing).await.unwrap();

        let validator = UniquenessValidator::new(store, Duration::from_secs(1));
        let conflict = validator
            .find_conflict(&existing, existing.id.as_uuid())
            .await
            .unwrap();
        assert_eq!(conflict, None);
    }

    #[tokio::test]
    async fn test_store_outage_is_transient() {
        let store = seeded().await;
        store.set_unavailable(true);
        let validator = UniquenessValidator::new(store, Duration::from_secs(1));
        let candidate = store_write("Acme", "shop@acme.com", "+1000", "acme");

        let err = validator
            .find_conflict(&candidate, candidate.id.as_uuid())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
