//! Create-or-replace pipeline for catalog resources.
//!
//! Every write runs the same steps, in order, and stops at the first failure:
//!
//! 1. authorize the caller for the kind's role
//! 2. validate the payload's shape
//! 3. check that referenced rows exist
//! 4. look for uniqueness conflicts
//! 5. upsert keyed by id
//!
//! Step 4 only produces better errors. The unique indexes reject the loser
//! of a concurrent check-then-write race, and that rejection is mapped back
//! into the same `UniquenessConflict` the pre-check would have produced.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::instrument;

use marketplace_core::{CategoryId, Role, StoreId, SubCategoryId, UrlSlug};

use super::{
    Candidate, CategoryInput, Conflict, ResourceKind, StoreInput, SubCategoryInput,
    UniquenessValidator,
};
use crate::authz::{AuthorizationGate, Caller};
use crate::db::{CatalogRepository, RepositoryError};
use crate::error::AppError;
use crate::models::{Category, Store, SubCategory};
use crate::timeout::bounded;

/// A payload for any catalog kind.
#[derive(Debug, Clone)]
pub enum CatalogInput {
    Category(CategoryInput),
    SubCategory(SubCategoryInput),
    Store(StoreInput),
}

impl CatalogInput {
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::Category(_) => ResourceKind::Category,
            Self::SubCategory(_) => ResourceKind::SubCategory,
            Self::Store(_) => ResourceKind::Store,
        }
    }
}

/// A stored catalog row of any kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CatalogResource {
    Category(Category),
    SubCategory(SubCategory),
    Store(Store),
}

fn conflict_error(kind: ResourceKind, conflict: Conflict) -> AppError {
    AppError::UniquenessConflict {
        kind: kind.label(),
        field: conflict.field,
        existing_id: conflict.existing_id.to_string(),
    }
}

/// Runs catalog writes through the gate, the validator and the store.
#[derive(Clone)]
pub struct UpsertEngine {
    gate: AuthorizationGate,
    validator: UniquenessValidator,
    catalog: Arc<dyn CatalogRepository>,
    timeout: Duration,
}

impl UpsertEngine {
    #[must_use]
    pub fn new(
        gate: AuthorizationGate,
        catalog: Arc<dyn CatalogRepository>,
        timeout: Duration,
    ) -> Self {
        Self {
            gate,
            validator: UniquenessValidator::new(Arc::clone(&catalog), timeout),
            catalog,
            timeout,
        }
    }

    /// Create or replace any catalog resource.
    ///
    /// # Errors
    ///
    /// See the kind-specific methods.
    pub async fn upsert(
        &self,
        caller: &Caller,
        input: CatalogInput,
    ) -> Result<CatalogResource, AppError> {
        match input {
            CatalogInput::Category(input) => self
                .upsert_category(caller, input)
                .await
                .map(CatalogResource::Category),
            CatalogInput::SubCategory(input) => self
                .upsert_sub_category(caller, input)
                .await
                .map(CatalogResource::SubCategory),
            CatalogInput::Store(input) => self
                .upsert_store(caller, input)
                .await
                .map(CatalogResource::Store),
        }
    }

    /// Create or replace a category. Requires `ADMIN`.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error: `Unauthenticated`,
    /// `Unauthorized`, `Validation`, `UniquenessConflict` or `Transient`.
    #[instrument(skip(self, caller, input))]
    pub async fn upsert_category(
        &self,
        caller: &Caller,
        input: CategoryInput,
    ) -> Result<Category, AppError> {
        let actor = self
            .gate
            .authorize(caller, ResourceKind::Category.required_role())
            .await?;
        let write = input.validate()?;
        self.check_unique(&write).await?;

        let category = self
            .persist(&write, "category write", self.catalog.upsert_category(&write))
            .await?;
        tracing::info!(category_id = %category.id, user_id = %actor.id, "Category upserted");
        Ok(category)
    }

    /// Create or replace a sub-category. Requires `ADMIN` and an existing
    /// parent category.
    ///
    /// # Errors
    ///
    /// As [`Self::upsert_category`]; a missing parent is a `Validation`
    /// error on `category_id`.
    #[instrument(skip(self, caller, input))]
    pub async fn upsert_sub_category(
        &self,
        caller: &Caller,
        input: SubCategoryInput,
    ) -> Result<SubCategory, AppError> {
        let actor = self
            .gate
            .authorize(caller, ResourceKind::SubCategory.required_role())
            .await?;
        let write = input.validate()?;

        let parent = bounded(
            self.timeout,
            "category lookup",
            self.catalog.find_category(write.category_id),
        )
        .await?;
        if parent.is_none() {
            return Err(missing_parent());
        }

        self.check_unique(&write).await?;

        let sub_category = self
            .persist(
                &write,
                "sub category write",
                self.catalog.upsert_sub_category(&write),
            )
            .await?;
        tracing::info!(
            sub_category_id = %sub_category.id,
            category_id = %sub_category.category_id,
            user_id = %actor.id,
            "Sub category upserted"
        );
        Ok(sub_category)
    }

    /// Create or replace a store. Requires `SELLER`.
    ///
    /// A new store is owned by the caller.
    ///
    /// Any `SELLER` may submit an update for an existing store id, including
    /// one owned by another seller. The update never changes the recorded
    /// owner, and an update by a non-owner is logged. This differs from the
    /// read side: [`Self::stores_of`], [`Self::store_by_url`] and
    /// [`Self::store_by_id`] only ever return the caller's own stores.
    ///
    /// # Errors
    ///
    /// As [`Self::upsert_category`].
    #[instrument(skip(self, caller, input))]
    pub async fn upsert_store(&self, caller: &Caller, input: StoreInput) -> Result<Store, AppError> {
        let actor = self
            .gate
            .authorize(caller, ResourceKind::Store.required_role())
            .await?;
        let write = input.validate(&actor.id)?;
        self.check_unique(&write).await?;

        let store = self
            .persist(&write, "store write", self.catalog.upsert_store(&write))
            .await?;
        if store.user_id != actor.id {
            tracing::info!(
                store_id = %store.id,
                owner = %store.user_id,
                user_id = %actor.id,
                "Store updated by a seller other than its owner"
            );
        }
        tracing::info!(store_id = %store.id, user_id = %actor.id, "Store upserted");
        Ok(store)
    }

    /// Delete a category. Requires `ADMIN`.
    ///
    /// # Errors
    ///
    /// `NotFound` if it does not exist; `Validation` while sub-categories
    /// still reference it.
    #[instrument(skip(self, caller))]
    pub async fn delete_category(&self, caller: &Caller, id: CategoryId) -> Result<(), AppError> {
        self.gate
            .authorize(caller, ResourceKind::Category.required_role())
            .await?;

        let outcome = bounded(self.timeout, "category delete", async {
            Ok::<_, AppError>(self.catalog.delete_category(id).await)
        })
        .await?;

        match outcome {
            Ok(true) => {
                tracing::info!(category_id = %id, "Category deleted");
                Ok(())
            }
            Ok(false) => Err(AppError::NotFound {
                kind: ResourceKind::Category.label(),
                id: id.to_string(),
            }),
            Err(RepositoryError::ForeignKey(_)) => Err(AppError::validation(
                "id",
                "category still has sub categories",
            )),
            Err(err) => Err(err.into()),
        }
    }

    /// Delete a sub-category. Requires `ADMIN`.
    ///
    /// # Errors
    ///
    /// `NotFound` if it does not exist.
    #[instrument(skip(self, caller))]
    pub async fn delete_sub_category(
        &self,
        caller: &Caller,
        id: SubCategoryId,
    ) -> Result<(), AppError> {
        self.gate
            .authorize(caller, ResourceKind::SubCategory.required_role())
            .await?;

        let removed = bounded(
            self.timeout,
            "sub category delete",
            self.catalog.delete_sub_category(id),
        )
        .await?;

        if removed {
            tracing::info!(sub_category_id = %id, "Sub category deleted");
            Ok(())
        } else {
            Err(AppError::NotFound {
                kind: ResourceKind::SubCategory.label(),
                id: id.to_string(),
            })
        }
    }

    /// Stores owned by the calling seller, most recently updated first.
    ///
    /// # Errors
    ///
    /// Authorization errors, or `Transient` if the store fails.
    pub async fn stores_of(&self, caller: &Caller) -> Result<Vec<Store>, AppError> {
        let actor = self.gate.authorize(caller, Role::Seller).await?;
        bounded(
            self.timeout,
            "store list",
            self.catalog.list_stores_by_owner(&actor.id),
        )
        .await
    }

    /// A store by slug, visible only to its owner.
    ///
    /// # Errors
    ///
    /// Authorization errors; `NotFound` if no such store exists or the
    /// caller does not own it.
    pub async fn store_by_url(&self, caller: &Caller, url: &UrlSlug) -> Result<Store, AppError> {
        let actor = self.gate.authorize(caller, Role::Seller).await?;
        let store = bounded(self.timeout, "store lookup", self.catalog.find_store_by_url(url))
            .await?;

        store
            .filter(|store| store.user_id == actor.id)
            .ok_or_else(|| AppError::NotFound {
                kind: ResourceKind::Store.label(),
                id: url.to_string(),
            })
    }

    /// A store by id, visible only to its owner.
    ///
    /// # Errors
    ///
    /// As [`Self::store_by_url`].
    pub async fn store_by_id(&self, caller: &Caller, id: StoreId) -> Result<Store, AppError> {
        let actor = self.gate.authorize(caller, Role::Seller).await?;
        let store = bounded(self.timeout, "store lookup", self.catalog.find_store(id)).await?;

        store
            .filter(|store| store.user_id == actor.id)
            .ok_or_else(|| AppError::NotFound {
                kind: ResourceKind::Store.label(),
                id: id.to_string(),
            })
    }

    /// All categories, most recently updated first. Public.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Transient` if the store fails.
    pub async fn categories(&self) -> Result<Vec<Category>, AppError> {
        bounded(self.timeout, "category list", self.catalog.list_categories()).await
    }

    /// One category. Public.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id, `Transient` if the store fails.
    pub async fn category(&self, id: CategoryId) -> Result<Category, AppError> {
        bounded(self.timeout, "category lookup", self.catalog.find_category(id))
            .await?
            .ok_or_else(|| AppError::NotFound {
                kind: ResourceKind::Category.label(),
                id: id.to_string(),
            })
    }

    /// All sub-categories, most recently updated first. Public.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Transient` if the store fails.
    pub async fn sub_categories(&self) -> Result<Vec<SubCategory>, AppError> {
        bounded(
            self.timeout,
            "sub-category list",
            self.catalog.list_sub_categories(),
        )
        .await
    }

    /// One sub-category. Public.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id, `Transient` if the store fails.
    pub async fn sub_category(&self, id: SubCategoryId) -> Result<SubCategory, AppError> {
        bounded(
            self.timeout,
            "sub-category lookup",
            self.catalog.find_sub_category(id),
        )
        .await?
        .ok_or_else(|| AppError::NotFound {
            kind: ResourceKind::SubCategory.label(),
            id: id.to_string(),
        })
    }

    async fn check_unique(&self, candidate: &dyn Candidate) -> Result<(), AppError> {
        match self
            .validator
            .find_conflict(candidate, candidate.id())
            .await?
        {
            Some(conflict) => Err(conflict_error(candidate.kind(), conflict)),
            None => Ok(()),
        }
    }

    /// Run a bounded write, translating constraint violations.
    async fn persist<T, F>(
        &self,
        candidate: &dyn Candidate,
        what: &'static str,
        write: F,
    ) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, RepositoryError>>,
    {
        let outcome = bounded(self.timeout, what, async { Ok::<_, AppError>(write.await) }).await?;

        match outcome {
            Ok(row) => Ok(row),
            Err(RepositoryError::Conflict(constraint)) => {
                Err(self.resolve_lost_race(candidate, &constraint).await)
            }
            Err(RepositoryError::ForeignKey(constraint)) => {
                tracing::info!(%constraint, "Catalog write hit a foreign key");
                Err(match candidate.kind() {
                    ResourceKind::SubCategory => missing_parent(),
                    ResourceKind::Category | ResourceKind::Store => {
                        AppError::validation("id", constraint)
                    }
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// A unique index rejected the write after the pre-check passed, so a
    /// concurrent writer got there first. Re-run the check to report the
    /// winner.
    async fn resolve_lost_race(&self, candidate: &dyn Candidate, constraint: &str) -> AppError {
        let kind = candidate.kind();
        tracing::warn!(
            %kind,
            constraint,
            field = ?kind.field_for_constraint(constraint),
            "Unique index rejected write after pre-check"
        );

        match self.validator.find_conflict(candidate, candidate.id()).await {
            Ok(Some(conflict)) => conflict_error(kind, conflict),
            Ok(None) => AppError::Transient("conflicting write is no longer visible".to_owned()),
            Err(err) => err,
        }
    }
}

fn missing_parent() -> AppError {
    AppError::validation("category_id", "category does not exist")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use marketplace_core::{Email, ExternalUserId, StoreStatus};

    use super::*;
    use crate::catalog::UniqueField;
    use crate::db::{InMemoryStore, UserRepository};
    use crate::models::IdentityProfile;

    fn uid(s: &str) -> ExternalUserId {
        ExternalUserId::parse(s).unwrap()
    }

    fn admin() -> Caller {
        Caller::with_claim(uid("admin"), Role::Admin)
    }

    fn seller(id: &str) -> Caller {
        Caller::with_claim(uid(id), Role::Seller)
    }

    async fn engine() -> (UpsertEngine, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        for (id, email) in [("u1", "u1@x.com"), ("u2", "u2@x.com")] {
            store
                .upsert_profile(&IdentityProfile {
                    id: uid(id),
                    name: id.to_owned(),
                    email: Email::parse(email).unwrap(),
                    picture: String::new(),
                })
                .await
                .unwrap();
        }
        let gate = AuthorizationGate::new(store.clone(), Duration::from_secs(1), Duration::from_secs(300));
        (
            UpsertEngine::new(gate, store.clone(), Duration::from_secs(1)),
            store,
        )
    }

    fn category(name: &str, url: &str) -> CategoryInput {
        CategoryInput {
            id: None,
            name: name.to_owned(),
            image: "img.png".to_owned(),
            url: url.to_owned(),
            featured: false,
        }
    }

    fn sub_category(name: &str, url: &str, parent: Option<CategoryId>) -> SubCategoryInput {
        SubCategoryInput {
            id: None,
            name: name.to_owned(),
            image: "img.png".to_owned(),
            url: url.to_owned(),
            featured: false,
            category_id: parent,
        }
    }

    fn store_input(name: &str, email: &str, phone: &str, url: &str) -> StoreInput {
        StoreInput {
            id: None,
            name: name.to_owned(),
            description: "Handmade goods shipped from a small workshop.".to_owned(),
            email: email.to_owned(),
            phone: phone.to_owned(),
            url: url.to_owned(),
            logo: "logo.png".to_owned(),
            cover: "cover.png".to_owned(),
            featured: false,
            status: None,
        }
    }

    #[tokio::test]
    async fn test_denied_caller_never_reaches_uniqueness_check() {
        let (engine, store) = engine().await;

        let err = engine
            .upsert_category(&seller("u1"), category("Shoes", "shoes"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(Role::Admin)));

        let err = engine
            .upsert_store(&Caller::anonymous(), store_input("Acme", "a@x.com", "+1", "acme"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated));

        assert_eq!(store.uniqueness_lookups(), 0);
    }

    #[tokio::test]
    async fn test_validation_runs_before_uniqueness() {
        let (engine, store) = engine().await;
        let err = engine
            .upsert_category(&admin(), category("S", "shoes"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { field: "name", .. }));
        assert_eq!(store.uniqueness_lookups(), 0);
    }

    #[tokio::test]
    async fn test_category_conflict_reports_existing_row() {
        let (engine, _) = engine().await;
        let first = engine
            .upsert_category(&admin(), category("Shoes", "shoes"))
            .await
            .unwrap();

        let err = engine
            .upsert_category(&admin(), category("Shoes", "footwear"))
            .await
            .unwrap_err();
        match err {
            AppError::UniquenessConflict {
                kind,
                field,
                existing_id,
            } => {
                assert_eq!(kind, "category");
                assert_eq!(field, UniqueField::Name);
                assert_eq!(existing_id, first.id.to_string());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_sub_category_requires_existing_parent() {
        let (engine, _) = engine().await;
        let err = engine
            .upsert_sub_category(
                &admin(),
                sub_category("Boots", "boots", Some(CategoryId::generate())),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { field: "category_id", .. }));

        let parent = engine
            .upsert_category(&admin(), category("Shoes", "shoes"))
            .await
            .unwrap();
        let child = engine
            .upsert_sub_category(&admin(), sub_category("Boots", "boots", Some(parent.id)))
            .await
            .unwrap();
        assert_eq!(child.category_id, parent.id);
    }

    #[tokio::test]
    async fn test_store_owner_is_caller_and_survives_updates() {
        let (engine, _) = engine().await;
        let created = engine
            .upsert_store(&seller("u1"), store_input("Acme", "a@x.com", "+1555", "acme"))
            .await
            .unwrap();
        assert_eq!(created.user_id, uid("u1"));
        assert_eq!(created.status, StoreStatus::Pending);

        let mut update = store_input("Acme Goods", "a@x.com", "+1555", "acme");
        update.id = Some(created.id);
        let updated = engine.upsert_store(&seller("u2"), update).await.unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.name, "Acme Goods");
        assert_eq!(updated.user_id, uid("u1"));
    }

    #[tokio::test]
    async fn test_store_update_with_own_values_is_not_a_conflict() {
        let (engine, _) = engine().await;
        let created = engine
            .upsert_store(&seller("u1"), store_input("Acme", "a@x.com", "+1555", "acme"))
            .await
            .unwrap();

        let mut same = store_input("Acme", "a@x.com", "+1555", "acme");
        same.id = Some(created.id);
        same.featured = true;
        let updated = engine.upsert_store(&seller("u1"), same).await.unwrap();
        assert!(updated.featured);
    }

    #[tokio::test]
    async fn test_lost_race_maps_to_uniqueness_conflict() {
        let (engine, store) = engine().await;
        let winner = engine
            .upsert_category(&admin(), category("Shoes", "shoes"))
            .await
            .unwrap();

        // Pre-check looks up name and url and sees neither.
        store.blind_next_lookups(2);
        let err = engine
            .upsert_category(&admin(), category("Shoes", "shoes-two"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AppError::UniquenessConflict { field: UniqueField::Name, ref existing_id, .. }
                if *existing_id == winner.id.to_string()
        ));
    }

    #[tokio::test]
    async fn test_lost_race_with_vanished_winner_is_transient() {
        let (engine, store) = engine().await;
        engine
            .upsert_category(&admin(), category("Shoes", "shoes"))
            .await
            .unwrap();

        // Blind both the pre-check and the re-check.
        store.blind_next_lookups(4);
        let err = engine
            .upsert_category(&admin(), category("Shoes", "shoes-two"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_delete_category_with_children_is_rejected() {
        let (engine, _) = engine().await;
        let parent = engine
            .upsert_category(&admin(), category("Shoes", "shoes"))
            .await
            .unwrap();
        let child = engine
            .upsert_sub_category(&admin(), sub_category("Boots", "boots", Some(parent.id)))
            .await
            .unwrap();

        let err = engine.delete_category(&admin(), parent.id).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));

        engine.delete_sub_category(&admin(), child.id).await.unwrap();
        engine.delete_category(&admin(), parent.id).await.unwrap();

        let err = engine.delete_category(&admin(), parent.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_store_lookup_is_owner_only() {
        let (engine, _) = engine().await;
        let created = engine
            .upsert_store(&seller("u1"), store_input("Acme", "a@x.com", "+1555", "acme"))
            .await
            .unwrap();
        let url = UrlSlug::parse("acme").unwrap();

        let found = engine.store_by_url(&seller("u1"), &url).await.unwrap();
        assert_eq!(found.id, created.id);

        let err = engine.store_by_url(&seller("u2"), &url).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));

        assert_eq!(engine.stores_of(&seller("u1")).await.unwrap().len(), 1);
        assert!(engine.stores_of(&seller("u2")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_generic_upsert_dispatches_by_kind() {
        let (engine, _) = engine().await;
        let input = CatalogInput::Category(category("Shoes", "shoes"));
        assert_eq!(input.kind(), ResourceKind::Category);

        let resource = engine.upsert(&admin(), input).await.unwrap();
        assert!(matches!(resource, CatalogResource::Category(c) if c.name == "Shoes"));
    }
}
