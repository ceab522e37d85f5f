//! Gated catalog upserts against the in-memory store.

#![allow(clippy::unwrap_used)]

use chrono::{Duration, Utc};

use marketplace_admin::authz::Caller;
use marketplace_admin::catalog::{
    CatalogInput, CatalogResource, CategoryInput, StoreInput, SubCategoryInput, UniqueField,
};
use marketplace_admin::db::{CatalogRepository, UserRepository};
use marketplace_admin::error::AppError;
use marketplace_admin::models::{IdentityProfile, Store};
use marketplace_core::{Email, Role};
use marketplace_integration_tests::{TestContext, uid};

async fn with_users(users: &[(&str, Role)]) -> TestContext {
    let ctx = TestContext::new();
    for (id, role) in users {
        ctx.store
            .upsert_profile(&IdentityProfile {
                id: uid(id),
                name: (*id).to_owned(),
                email: Email::parse(&format!("{id}@users.example")).unwrap(),
                picture: String::new(),
            })
            .await
            .unwrap();
        ctx.store.set_role(&uid(id), *role).await.unwrap();
    }
    ctx
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

async fn create_store(ctx: &TestContext, owner: &str, input: StoreInput) -> Store {
    ctx.state
        .engine()
        .upsert_store(&Caller::authenticated(uid(owner)), input)
        .await
        .unwrap()
}

fn conflict_of(err: &AppError) -> (UniqueField, String) {
    match err {
        AppError::UniquenessConflict {
            field, existing_id, ..
        } => (*field, existing_id.clone()),
        other => panic!("expected a uniqueness conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn test_conflicts_report_earliest_configured_field() {
    let ctx = with_users(&[("s1", Role::Seller), ("s2", Role::Seller), ("s3", Role::Seller)]).await;
    let first = create_store(
        &ctx,
        "s1",
        store_input("First Shop", "first@x.com", "+1001", "first-shop"),
    )
    .await;
    let second = create_store(
        &ctx,
        "s2",
        store_input("Second Shop", "second@x.com", "+1002", "second-shop"),
    )
    .await;
    let caller = Caller::authenticated(uid("s3"));

    // url matches `second`, email matches `first`: email comes first.
    let err = ctx
        .state
        .engine()
        .upsert_store(
            &caller,
            store_input("Third Shop", "first@x.com", "+1003", "second-shop"),
        )
        .await
        .unwrap_err();
    assert_eq!(conflict_of(&err), (UniqueField::Email, first.id.to_string()));

    // Same inputs, repeated: same answer.
    for _ in 0..3 {
        let err = ctx
            .state
            .engine()
            .upsert_store(
                &caller,
                store_input("Third Shop", "third@x.com", "+1002", "first-shop"),
            )
            .await
            .unwrap_err();
        assert_eq!(
            conflict_of(&err),
            (UniqueField::Phone, second.id.to_string())
        );
    }
}

#[tokio::test]
async fn test_resubmitting_a_store_unchanged_succeeds() {
    let ctx = with_users(&[("s1", Role::Seller)]).await;
    let created = create_store(
        &ctx,
        "s1",
        store_input("First Shop", "first@x.com", "+1001", "first-shop"),
    )
    .await;

    let mut resubmit = store_input("First Shop", "first@x.com", "+1001", "first-shop");
    resubmit.id = Some(created.id);
    let updated = create_store(&ctx, "s1", resubmit).await;

    assert_eq!(updated.id, created.id);
    assert_eq!(updated.created_at, created.created_at);
    assert!(updated.updated_at >= created.updated_at);
}

#[tokio::test]
async fn test_denied_callers_never_reach_the_store() {
    let ctx = with_users(&[("u1", Role::User), ("a1", Role::Admin)]).await;
    let engine = ctx.state.engine();
    let input = || store_input("First Shop", "first@x.com", "+1001", "first-shop");

    let anonymous = engine
        .upsert_store(&Caller::anonymous(), input())
        .await
        .unwrap_err();
    assert!(matches!(anonymous, AppError::Unauthenticated));

    let user = engine
        .upsert_store(&Caller::authenticated(uid("u1")), input())
        .await
        .unwrap_err();
    assert!(matches!(user, AppError::Unauthorized(Role::Seller)));

    // ADMIN is not a superset of SELLER.
    let admin = engine
        .upsert_store(&Caller::authenticated(uid("a1")), input())
        .await
        .unwrap_err();
    assert!(matches!(admin, AppError::Unauthorized(Role::Seller)));

    let seller_on_category = engine
        .upsert(
            &Caller::with_claim(uid("u1"), Role::Seller),
            CatalogInput::Category(CategoryInput {
                id: None,
                name: "Shoes".to_owned(),
                image: "img.png".to_owned(),
                url: "shoes".to_owned(),
                featured: false,
            }),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        seller_on_category,
        AppError::Unauthorized(Role::Admin)
    ));

    assert_eq!(ctx.store.uniqueness_lookups(), 0);
}

#[tokio::test]
async fn test_claim_is_trusted_over_store() {
    // The store says USER; the session claim says SELLER and wins.
    let ctx = with_users(&[("u1", Role::User)]).await;

    let store = ctx
        .state
        .engine()
        .upsert_store(
            &Caller::with_claim(uid("u1"), Role::Seller),
            store_input("First Shop", "first@x.com", "+1001", "first-shop"),
        )
        .await
        .unwrap();
    assert_eq!(store.user_id, uid("u1"));
}

#[tokio::test]
async fn test_demoted_admin_with_old_claim_is_denied() {
    // Signed in as ADMIN two hours ago, demoted to USER since.
    let ctx = with_users(&[("u1", Role::User)]).await;
    let caller = Caller::with_claim_at(uid("u1"), Role::Admin, Utc::now() - Duration::hours(2));

    let err = ctx
        .state
        .engine()
        .upsert(
            &caller,
            CatalogInput::Category(CategoryInput {
                id: None,
                name: "Shoes".to_owned(),
                image: "img.png".to_owned(),
                url: "shoes".to_owned(),
                featured: false,
            }),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Unauthorized(Role::Admin)));
    assert_eq!(ctx.store.uniqueness_lookups(), 0);
    assert!(ctx.store.list_categories().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_store_owner_is_never_reassigned() {
    let ctx = with_users(&[("s1", Role::Seller), ("s2", Role::Seller)]).await;
    let created = create_store(
        &ctx,
        "s1",
        store_input("First Shop", "first@x.com", "+1001", "first-shop"),
    )
    .await;

    let mut takeover = store_input("Renamed Shop", "first@x.com", "+1001", "first-shop");
    takeover.id = Some(created.id);
    let updated = create_store(&ctx, "s2", takeover).await;

    assert_eq!(updated.name, "Renamed Shop");
    assert_eq!(updated.user_id, uid("s1"));
    assert_eq!(
        ctx.store.list_stores_by_owner(&uid("s1")).await.unwrap().len(),
        1
    );
    assert!(
        ctx.store
            .list_stores_by_owner(&uid("s2"))
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_lost_race_reports_the_winner() {
    let ctx = with_users(&[("s1", Role::Seller), ("s2", Role::Seller)]).await;
    let winner = create_store(
        &ctx,
        "s1",
        store_input("First Shop", "first@x.com", "+1001", "first-shop"),
    )
    .await;

    // The pre-check misses the winner; the unique index does not.
    ctx.store.blind_next_lookups(4);
    let err = ctx
        .state
        .engine()
        .upsert_store(
            &Caller::authenticated(uid("s2")),
            store_input("Other Shop", "other@x.com", "+1009", "first-shop"),
        )
        .await
        .unwrap_err();

    assert_eq!(conflict_of(&err), (UniqueField::Url, winner.id.to_string()));
    assert!(
        ctx.store
            .list_stores_by_owner(&uid("s2"))
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_category_tree_lifecycle() {
    let ctx = with_users(&[("a1", Role::Admin)]).await;
    let admin = Caller::authenticated(uid("a1"));
    let engine = ctx.state.engine();

    let CatalogResource::Category(shoes) = engine
        .upsert(
            &admin,
            CatalogInput::Category(CategoryInput {
                id: None,
                name: "Shoes".to_owned(),
                image: "img.png".to_owned(),
                url: "shoes".to_owned(),
                featured: true,
            }),
        )
        .await
        .unwrap()
    else {
        panic!("expected a category");
    };

    let sneakers = engine
        .upsert_sub_category(
            &admin,
            SubCategoryInput {
                id: None,
                name: "Sneakers".to_owned(),
                image: "img.png".to_owned(),
                url: "sneakers".to_owned(),
                featured: false,
                category_id: Some(shoes.id),
            },
        )
        .await
        .unwrap();
    assert_eq!(sneakers.category_id, shoes.id);

    let blocked = engine.delete_category(&admin, shoes.id).await.unwrap_err();
    assert!(matches!(blocked, AppError::Validation { field: "id", .. }));

    engine.delete_sub_category(&admin, sneakers.id).await.unwrap();
    engine.delete_category(&admin, shoes.id).await.unwrap();

    let gone = engine.delete_category(&admin, shoes.id).await.unwrap_err();
    assert!(matches!(gone, AppError::NotFound { .. }));
    assert!(engine.categories().await.unwrap().is_empty());
}
