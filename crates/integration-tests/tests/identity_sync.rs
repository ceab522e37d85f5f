//! Identity webhook ingestion and role propagation, end to end.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use marketplace_admin::authz::Caller;
use marketplace_admin::catalog::StoreInput;
use marketplace_admin::db::{CatalogRepository, UserRepository};
use marketplace_admin::error::AppError;
use marketplace_admin::idp::IdentityMetadata;
use marketplace_admin::propagation::RoleBridge;
use marketplace_core::{Email, Role};
use marketplace_integration_tests::{TestContext, test_sync_config, uid, user_event};

fn shop_input() -> StoreInput {
    StoreInput {
        id: None,
        name: "Jane Goods".to_owned(),
        description: "Handmade goods shipped from a small workshop.".to_owned(),
        email: "shop@x.com".to_owned(),
        phone: "+15551234567".to_owned(),
        url: "jane-goods".to_owned(),
        logo: "logo.png".to_owned(),
        cover: "cover.png".to_owned(),
        featured: false,
        status: None,
    }
}

/// created -> updated -> store denied as USER -> role set to SELLER ->
/// store created and owned by the user.
#[tokio::test]
async fn test_seller_onboarding_flow() {
    let ctx = TestContext::new();

    let created = ctx
        .deliver("msg_1", &user_event("user.created", "u1", "Jane", "a@x.com", None))
        .await;
    assert_eq!(created.status, StatusCode::OK);

    let user = ctx.store.find_by_id(&uid("u1")).await.unwrap().unwrap();
    assert_eq!(user.role, Role::User);
    assert_eq!(user.name, "Jane");
    ctx.wait_for_provider_role("u1", Role::User).await;

    let updated = ctx
        .deliver(
            "msg_2",
            &user_event("user.updated", "u1", "Janet", "a@x.com", Some("USER")),
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    let user = ctx.store.find_by_id(&uid("u1")).await.unwrap().unwrap();
    assert_eq!(user.name, "Janet");
    assert_eq!(user.role, Role::User);

    // Still a USER: the claim read at sign-in says so.
    let claim = ctx.idp.read_role(&uid("u1")).await.unwrap().unwrap();
    let caller = Caller::with_claim(uid("u1"), claim);
    let denied = ctx
        .state
        .engine()
        .upsert_store(&caller, shop_input())
        .await
        .unwrap_err();
    assert!(matches!(denied, AppError::Unauthorized(Role::Seller)));
    assert!(
        ctx.store
            .list_stores_by_owner(&uid("u1"))
            .await
            .unwrap()
            .is_empty()
    );

    // Role management: local write first, then propagation.
    ctx.store.set_role(&uid("u1"), Role::Seller).await.unwrap();
    let bridge = RoleBridge::new(
        ctx.idp.clone(),
        test_sync_config().retry,
        test_sync_config().idp_timeout,
    );
    bridge
        .propagate_with_retry(&uid("u1"), Role::Seller)
        .await
        .unwrap();

    let claim = ctx.idp.read_role(&uid("u1")).await.unwrap().unwrap();
    assert_eq!(claim, Role::Seller);
    let store = ctx
        .state
        .engine()
        .upsert_store(&Caller::with_claim(uid("u1"), claim), shop_input())
        .await
        .unwrap();
    assert_eq!(store.user_id, uid("u1"));
}

#[tokio::test]
async fn test_replayed_deliveries_leave_one_row() {
    let ctx = TestContext::new();
    let event = user_event("user.created", "u1", "Jane", "a@x.com", None);

    for _ in 0..3 {
        let response = ctx.deliver("msg_1", &event).await;
        assert_eq!(response.status, StatusCode::OK);
    }
    let last = user_event("user.updated", "u1", "Jane", "jane@x.com", None);
    for _ in 0..2 {
        ctx.deliver("msg_2", &last).await;
    }

    let user = ctx.store.find_by_id(&uid("u1")).await.unwrap().unwrap();
    assert_eq!(user.email.as_str(), "jane@x.com");
    assert!(
        ctx.store
            .find_by_email(&Email::parse("a@x.com").unwrap())
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_update_never_touches_stored_role() {
    let ctx = TestContext::new();
    ctx.deliver("msg_1", &user_event("user.created", "u1", "Jane", "a@x.com", None))
        .await;
    ctx.wait_for_provider_role("u1", Role::User).await;
    ctx.store.set_role(&uid("u1"), Role::Admin).await.unwrap();

    // A stale claim in the event must not downgrade the stored role.
    ctx.deliver(
        "msg_2",
        &user_event("user.updated", "u1", "Jane", "a@x.com", Some("USER")),
    )
    .await;

    let user = ctx.store.find_by_id(&uid("u1")).await.unwrap().unwrap();
    assert_eq!(user.role, Role::Admin);
    // The stale claim differs from the stored role, so the stored one is pushed.
    ctx.wait_for_provider_role("u1", Role::Admin).await;
}

#[tokio::test]
async fn test_propagation_retries_until_provider_accepts() {
    let ctx = TestContext::new();
    ctx.idp.fail_next_writes(2);

    let response = ctx
        .deliver("msg_1", &user_event("user.created", "u1", "Jane", "a@x.com", None))
        .await;

    // Acknowledged before propagation has finished.
    assert_eq!(response.status, StatusCode::OK);
    ctx.wait_for_provider_role("u1", Role::User).await;
    assert_eq!(ctx.idp.write_attempts(), 3);
}

#[tokio::test]
async fn test_metadata_echo_does_not_propagate_again() {
    let ctx = TestContext::new();
    ctx.deliver("msg_1", &user_event("user.created", "u1", "Jane", "a@x.com", None))
        .await;
    ctx.wait_for_provider_role("u1", Role::User).await;
    let writes = ctx.idp.write_attempts();

    // The provider's own echo of the metadata write.
    ctx.deliver(
        "msg_2",
        &user_event("user.updated", "u1", "Jane", "a@x.com", Some("USER")),
    )
    .await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert_eq!(ctx.idp.write_attempts(), writes);
}

#[tokio::test]
async fn test_delete_removes_user_but_keeps_their_stores() {
    let ctx = TestContext::new();
    ctx.deliver("msg_1", &user_event("user.created", "u1", "Jane", "a@x.com", None))
        .await;
    ctx.store.set_role(&uid("u1"), Role::Seller).await.unwrap();
    let shop = ctx
        .state
        .engine()
        .upsert_store(&Caller::authenticated(uid("u1")), shop_input())
        .await
        .unwrap();

    let deleted = serde_json::json!({ "type": "user.deleted", "data": { "id": "u1", "deleted": true } });
    assert_eq!(ctx.deliver("msg_2", &deleted).await.status, StatusCode::OK);
    // Unknown users are acknowledged too.
    assert_eq!(ctx.deliver("msg_3", &deleted).await.status, StatusCode::OK);

    assert!(ctx.store.find_by_id(&uid("u1")).await.unwrap().is_none());
    // Catalog rows are only ever removed explicitly.
    let kept = ctx.store.find_store(shop.id).await.unwrap().unwrap();
    assert_eq!(kept.user_id, uid("u1"));
    assert_eq!(
        ctx.store.list_stores_by_owner(&uid("u1")).await.unwrap(),
        vec![kept]
    );
}

#[tokio::test]
async fn test_store_outage_asks_for_redelivery() {
    let ctx = TestContext::new();
    ctx.store.set_unavailable(true);

    let response = ctx
        .deliver("msg_1", &user_event("user.created", "u1", "Jane", "a@x.com", None))
        .await;
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(ctx.idp.write_attempts(), 0);

    ctx.store.set_unavailable(false);
    let response = ctx
        .deliver("msg_1", &user_event("user.created", "u1", "Jane", "a@x.com", None))
        .await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_email_taken_by_another_account_is_conflict() {
    let ctx = TestContext::new();
    ctx.deliver("msg_1", &user_event("user.created", "u1", "Jane", "a@x.com", None))
        .await;

    let response = ctx
        .deliver("msg_2", &user_event("user.created", "u2", "John", "a@x.com", None))
        .await;

    assert_eq!(response.status, StatusCode::CONFLICT);
    assert!(ctx.store.find_by_id(&uid("u2")).await.unwrap().is_none());
}
