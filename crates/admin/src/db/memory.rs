//! In-memory implementation of the repository traits.
//!
//! Enforces the same unique and foreign key constraints as the SQL schema,
//! reporting violations with the same constraint names, so the services above
//! it behave identically against either backend. A few knobs let tests
//! simulate an unavailable or slow store and a writer that commits between a
//! uniqueness pre-check and the write.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use marketplace_core::{
    CategoryId, Email, ExternalUserId, Role, StoreId, SubCategoryId, UrlSlug,
};

use super::{CatalogRepository, RepositoryError, UserRepository};
use crate::catalog::{ResourceKind, UniqueField};
use crate::models::{
    Category, CategoryWrite, IdentityProfile, Store, StoreWrite, SubCategory, SubCategoryWrite,
    User,
};

#[derive(Debug, Default)]
struct Tables {
    // Vecs keep creation order, which is what "first" means for lookups.
    users: Vec<User>,
    categories: Vec<Category>,
    sub_categories: Vec<SubCategory>,
    stores: Vec<Store>,
}

/// Repository backend holding everything in process memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    uniqueness_lookups: AtomicUsize,
    blind_lookups: AtomicUsize,
    unavailable: AtomicBool,
    latency_ms: AtomicU64,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `find_first_by_field` calls served so far.
    #[must_use]
    pub fn uniqueness_lookups(&self) -> usize {
        self.uniqueness_lookups.load(Ordering::SeqCst)
    }

    /// Make the next `n` field lookups report no match, as if a concurrent
    /// writer committed right after them.
    pub fn blind_next_lookups(&self, n: usize) {
        self.blind_lookups.store(n, Ordering::SeqCst);
    }

    /// Fail every call with a database error while `unavailable` is set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(millis, Ordering::SeqCst);
    }

    async fn enter(&self) -> Result<(), RepositoryError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    fn take_blind_lookup(&self) -> bool {
        self.blind_lookups
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

// =============================================================================
// Constraint helpers
// =============================================================================

fn constraint_name(kind: ResourceKind, field: UniqueField) -> String {
    let table = kind.table().trim_start_matches("marketplace.");
    format!("{table}_{}_key", field.column())
}

fn category_value(row: &Category, field: UniqueField) -> Option<&str> {
    match field {
        UniqueField::Name => Some(&row.name),
        UniqueField::Url => Some(row.url.as_str()),
        UniqueField::Email | UniqueField::Phone => None,
    }
}

fn sub_category_value(row: &SubCategory, field: UniqueField) -> Option<&str> {
    match field {
        UniqueField::Name => Some(&row.name),
        UniqueField::Url => Some(row.url.as_str()),
        UniqueField::Email | UniqueField::Phone => None,
    }
}

fn store_value(row: &Store, field: UniqueField) -> Option<&str> {
    Some(match field {
        UniqueField::Name => &row.name,
        UniqueField::Email => row.email.as_str(),
        UniqueField::Phone => row.phone.as_str(),
        UniqueField::Url => row.url.as_str(),
    })
}

fn first_match<T>(
    rows: &[T],
    id_of: fn(&T) -> Uuid,
    value_of: for<'a> fn(&'a T, UniqueField) -> Option<&'a str>,
    field: UniqueField,
    value: &str,
    exclude: Option<Uuid>,
) -> Option<Uuid> {
    rows.iter()
        .filter(|row| Some(id_of(row)) != exclude)
        .find(|row| value_of(row, field) == Some(value))
        .map(id_of)
}

/// Reject a write whose unique values collide with another row.
fn check_unique<T>(
    kind: ResourceKind,
    rows: &[T],
    id_of: fn(&T) -> Uuid,
    value_of: for<'a> fn(&'a T, UniqueField) -> Option<&'a str>,
    candidate: &T,
) -> Result<(), RepositoryError> {
    let own_id = id_of(candidate);
    for &field in kind.unique_fields() {
        let Some(value) = value_of(candidate, field) else {
            continue;
        };
        if first_match(rows, id_of, value_of, field, value, Some(own_id)).is_some() {
            return Err(RepositoryError::Conflict(constraint_name(kind, field)));
        }
    }
    Ok(())
}

fn replace_or_push<T>(rows: &mut Vec<T>, id_of: fn(&T) -> Uuid, row: T) {
    let id = id_of(&row);
    match rows.iter_mut().find(|existing| id_of(existing) == id) {
        Some(existing) => *existing = row,
        None => rows.push(row),
    }
}

fn remove_by_id<T>(rows: &mut Vec<T>, id_of: fn(&T) -> Uuid, id: Uuid) -> bool {
    let before = rows.len();
    rows.retain(|row| id_of(row) != id);
    rows.len() != before
}

fn newest_first<T: Clone>(rows: &[T], updated_at: fn(&T) -> chrono::DateTime<Utc>) -> Vec<T> {
    let mut out = rows.to_vec();
    out.sort_by_key(|row| std::cmp::Reverse(updated_at(row)));
    out
}

const fn category_id(row: &Category) -> Uuid {
    row.id.as_uuid()
}

const fn sub_category_id(row: &SubCategory) -> Uuid {
    row.id.as_uuid()
}

const fn store_id(row: &Store) -> Uuid {
    row.id.as_uuid()
}

// =============================================================================
// UserRepository
// =============================================================================

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn find_by_id(&self, id: &ExternalUserId) -> Result<Option<User>, RepositoryError> {
        self.enter().await?;
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| &u.id == id).cloned())
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        self.enter().await?;
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| &u.email == email).cloned())
    }

    async fn upsert_profile(&self, profile: &IdentityProfile) -> Result<User, RepositoryError> {
        self.enter().await?;
        let mut tables = self.tables.write().await;

        if tables
            .users
            .iter()
            .any(|u| u.email == profile.email && u.id != profile.id)
        {
            return Err(RepositoryError::Conflict("users_email_key".to_owned()));
        }

        let now = Utc::now();
        if let Some(user) = tables.users.iter_mut().find(|u| u.id == profile.id) {
            user.name.clone_from(&profile.name);
            user.email = profile.email.clone();
            user.picture.clone_from(&profile.picture);
            user.updated_at = now;
            return Ok(user.clone());
        }

        let user = User {
            id: profile.id.clone(),
            name: profile.name.clone(),
            email: profile.email.clone(),
            picture: profile.picture.clone(),
            role: Role::User,
            created_at: now,
            updated_at: now,
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn set_role(&self, id: &ExternalUserId, role: Role) -> Result<User, RepositoryError> {
        self.enter().await?;
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .iter_mut()
            .find(|u| &u.id == id)
            .ok_or(RepositoryError::NotFound)?;
        user.role = role;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn delete(&self, id: &ExternalUserId) -> Result<bool, RepositoryError> {
        self.enter().await?;
        let mut tables = self.tables.write().await;
        let before = tables.users.len();
        tables.users.retain(|u| &u.id != id);
        // Stores keep their `user_id`; nothing cascades.
        Ok(tables.users.len() != before)
    }
}

// =============================================================================
// CatalogRepository
// =============================================================================

#[async_trait]
impl CatalogRepository for InMemoryStore {
    async fn find_first_by_field(
        &self,
        kind: ResourceKind,
        field: UniqueField,
        value: &str,
        exclude: Option<Uuid>,
    ) -> Result<Option<Uuid>, RepositoryError> {
        self.enter().await?;
        self.uniqueness_lookups.fetch_add(1, Ordering::SeqCst);
        if self.take_blind_lookup() {
            return Ok(None);
        }

        let tables = self.tables.read().await;
        Ok(match kind {
            ResourceKind::Category => first_match(
                &tables.categories,
                category_id,
                category_value,
                field,
                value,
                exclude,
            ),
            ResourceKind::SubCategory => first_match(
                &tables.sub_categories,
                sub_category_id,
                sub_category_value,
                field,
                value,
                exclude,
            ),
            ResourceKind::Store => {
                first_match(&tables.stores, store_id, store_value, field, value, exclude)
            }
        })
    }

    async fn find_category(&self, id: CategoryId) -> Result<Option<Category>, RepositoryError> {
        self.enter().await?;
        let tables = self.tables.read().await;
        Ok(tables.categories.iter().find(|c| c.id == id).cloned())
    }

    async fn list_categories(&self) -> Result<Vec<Category>, RepositoryError> {
        self.enter().await?;
        let tables = self.tables.read().await;
        Ok(newest_first(&tables.categories, |c| c.updated_at))
    }

    async fn upsert_category(&self, write: &CategoryWrite) -> Result<Category, RepositoryError> {
        self.enter().await?;
        let mut tables = self.tables.write().await;

        let now = Utc::now();
        let created_at = tables
            .categories
            .iter()
            .find(|c| c.id == write.id)
            .map_or(now, |c| c.created_at);
        let row = Category {
            id: write.id,
            name: write.name.clone(),
            image: write.image.clone(),
            url: write.url.clone(),
            featured: write.featured,
            created_at,
            updated_at: now,
        };

        check_unique(
            ResourceKind::Category,
            &tables.categories,
            category_id,
            category_value,
            &row,
        )?;
        replace_or_push(&mut tables.categories, category_id, row.clone());
        Ok(row)
    }

    async fn delete_category(&self, id: CategoryId) -> Result<bool, RepositoryError> {
        self.enter().await?;
        let mut tables = self.tables.write().await;
        if tables.sub_categories.iter().any(|s| s.category_id == id) {
            return Err(RepositoryError::ForeignKey(
                "sub_categories_category_id_fkey".to_owned(),
            ));
        }
        Ok(remove_by_id(&mut tables.categories, category_id, id.as_uuid()))
    }

    async fn find_sub_category(
        &self,
        id: SubCategoryId,
    ) -> Result<Option<SubCategory>, RepositoryError> {
        self.enter().await?;
        let tables = self.tables.read().await;
        Ok(tables.sub_categories.iter().find(|s| s.id == id).cloned())
    }

    async fn list_sub_categories(&self) -> Result<Vec<SubCategory>, RepositoryError> {
        self.enter().await?;
        let tables = self.tables.read().await;
        Ok(newest_first(&tables.sub_categories, |s| s.updated_at))
    }

    async fn upsert_sub_category(
        &self,
        write: &SubCategoryWrite,
    ) -> Result<SubCategory, RepositoryError> {
        self.enter().await?;
        let mut tables = self.tables.write().await;

        if !tables.categories.iter().any(|c| c.id == write.category_id) {
            return Err(RepositoryError::ForeignKey(
                "sub_categories_category_id_fkey".to_owned(),
            ));
        }

        let now = Utc::now();
        let created_at = tables
            .sub_categories
            .iter()
            .find(|s| s.id == write.id)
            .map_or(now, |s| s.created_at);
        let row = SubCategory {
            id: write.id,
            name: write.name.clone(),
            image: write.image.clone(),
            url: write.url.clone(),
            featured: write.featured,
            category_id: write.category_id,
            created_at,
            updated_at: now,
        };

        check_unique(
            ResourceKind::SubCategory,
            &tables.sub_categories,
            sub_category_id,
            sub_category_value,
            &row,
        )?;
        replace_or_push(&mut tables.sub_categories, sub_category_id, row.clone());
        Ok(row)
    }

    async fn delete_sub_category(&self, id: SubCategoryId) -> Result<bool, RepositoryError> {
        self.enter().await?;
        let mut tables = self.tables.write().await;
        Ok(remove_by_id(
            &mut tables.sub_categories,
            sub_category_id,
            id.as_uuid(),
        ))
    }

    async fn find_store(&self, id: StoreId) -> Result<Option<Store>, RepositoryError> {
        self.enter().await?;
        let tables = self.tables.read().await;
        Ok(tables.stores.iter().find(|s| s.id == id).cloned())
    }

    async fn find_store_by_url(&self, url: &UrlSlug) -> Result<Option<Store>, RepositoryError> {
        self.enter().await?;
        let tables = self.tables.read().await;
        Ok(tables.stores.iter().find(|s| &s.url == url).cloned())
    }

    async fn list_stores_by_owner(
        &self,
        owner: &ExternalUserId,
    ) -> Result<Vec<Store>, RepositoryError> {
        self.enter().await?;
        let tables = self.tables.read().await;
        let owned: Vec<Store> = tables
            .stores
            .iter()
            .filter(|s| &s.user_id == owner)
            .cloned()
            .collect();
        Ok(newest_first(&owned, |s| s.updated_at))
    }

    async fn upsert_store(&self, write: &StoreWrite) -> Result<Store, RepositoryError> {
        self.enter().await?;
        let mut tables = self.tables.write().await;

        let now = Utc::now();
        let existing = tables.stores.iter().find(|s| s.id == write.id);
        let (user_id, created_at) = match existing {
            Some(stored) => (stored.user_id.clone(), stored.created_at),
            None => (write.owner.clone(), now),
        };
        let row = Store {
            id: write.id,
            name: write.name.clone(),
            description: write.description.clone(),
            email: write.email.clone(),
            phone: write.phone.clone(),
            url: write.url.clone(),
            logo: write.logo.clone(),
            cover: write.cover.clone(),
            featured: write.featured,
            status: write.status,
            user_id,
            created_at,
            updated_at: now,
        };

        check_unique(
            ResourceKind::Store,
            &tables.stores,
            store_id,
            store_value,
            &row,
        )?;
        replace_or_push(&mut tables.stores, store_id, row.clone());
        Ok(row)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use marketplace_core::{Email, Phone, StoreStatus};

    use super::*;

    fn profile(id: &str, email: &str) -> IdentityProfile {
        IdentityProfile {
            id: ExternalUserId::parse(id).unwrap(),
            name: "Jane".to_owned(),
            email: Email::parse(email).unwrap(),
            picture: String::new(),
        }
    }

    fn category(name: &str, url: &str) -> CategoryWrite {
        CategoryWrite {
            id: CategoryId::generate(),
            name: name.to_owned(),
            image: "https://img/x.png".to_owned(),
            url: UrlSlug::parse(url).unwrap(),
            featured: false,
        }
    }

    #[tokio::test]
    async fn test_profile_upsert_keeps_role() {
        let store = InMemoryStore::new();
        let id = ExternalUserId::parse("u1").unwrap();
        store.upsert_profile(&profile("u1", "a@x.com")).await.unwrap();
        store.set_role(&id, Role::Seller).await.unwrap();

        let user = store.upsert_profile(&profile("u1", "b@x.com")).await.unwrap();
        assert_eq!(user.role, Role::Seller);
        assert_eq!(user.email.as_str(), "b@x.com");
    }

    #[tokio::test]
    async fn test_user_delete_leaves_stores_in_place() {
        let store = InMemoryStore::new();
        let owner = ExternalUserId::parse("u1").unwrap();
        store.upsert_profile(&profile("u1", "a@x.com")).await.unwrap();
        let shop = store
            .upsert_store(&StoreWrite {
                id: StoreId::generate(),
                name: "Acme".to_owned(),
                description: "Handmade goods shipped from a small workshop.".to_owned(),
                email: Email::parse("shop@acme.com").unwrap(),
                phone: Phone::parse("+1000").unwrap(),
                url: UrlSlug::parse("acme").unwrap(),
                logo: "logo.png".to_owned(),
                cover: "cover.png".to_owned(),
                featured: false,
                status: StoreStatus::Pending,
                owner: owner.clone(),
            })
            .await
            .unwrap();

        assert!(store.delete(&owner).await.unwrap());

        assert!(store.find_by_id(&owner).await.unwrap().is_none());
        let kept = store.find_store(shop.id).await.unwrap().unwrap();
        assert_eq!(kept.user_id, owner);
    }

    #[tokio::test]
    async fn test_duplicate_email_reports_constraint() {
        let store = InMemoryStore::new();
        store.upsert_profile(&profile("u1", "a@x.com")).await.unwrap();
        let err = store
            .upsert_profile(&profile("u2", "a@x.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(name) if name == "users_email_key"));
    }

    #[tokio::test]
    async fn test_category_unique_constraint_names() {
        let store = InMemoryStore::new();
        store.upsert_category(&category("Shoes", "shoes")).await.unwrap();

        let err = store
            .upsert_category(&category("Boots", "shoes"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(name) if name == "categories_url_key"));
    }

    #[tokio::test]
    async fn test_delete_category_with_children_is_restricted() {
        let store = InMemoryStore::new();
        let parent = category("Shoes", "shoes");
        store.upsert_category(&parent).await.unwrap();
        store
            .upsert_sub_category(&SubCategoryWrite {
                id: SubCategoryId::generate(),
                name: "Boots".to_owned(),
                image: "https://img/b.png".to_owned(),
                url: UrlSlug::parse("boots").unwrap(),
                featured: false,
                category_id: parent.id,
            })
            .await
            .unwrap();

        let err = store.delete_category(parent.id).await.unwrap_err();
        assert!(matches!(err, RepositoryError::ForeignKey(_)));
    }

    #[tokio::test]
    async fn test_blind_lookups_then_visible() {
        let store = InMemoryStore::new();
        let written = category("Shoes", "shoes");
        store.upsert_category(&written).await.unwrap();

        store.blind_next_lookups(1);
        let first = store
            .find_first_by_field(ResourceKind::Category, UniqueField::Name, "Shoes", None)
            .await
            .unwrap();
        let second = store
            .find_first_by_field(ResourceKind::Category, UniqueField::Name, "Shoes", None)
            .await
            .unwrap();
        assert_eq!(first, None);
        assert_eq!(second, Some(written.id.as_uuid()));
        assert_eq!(store.uniqueness_lookups(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_store_errors() {
        let store = InMemoryStore::new();
        store.set_unavailable(true);
        let err = store
            .find_by_id(&ExternalUserId::parse("u1").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Database(_)));
    }
}
