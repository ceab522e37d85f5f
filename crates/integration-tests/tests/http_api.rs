//! Routes, status codes and session handoff through the full router.

#![allow(clippy::unwrap_used)]

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::json;

use marketplace_admin::db::{CatalogRepository, UserRepository};
use marketplace_admin::models::IdentityProfile;
use marketplace_core::{Email, Role};
use marketplace_integration_tests::{
    TestContext, empty_request, json_request, store_body, uid, user_event,
};

async fn with_user(ctx: &TestContext, id: &str, role: Role) {
    ctx.store
        .upsert_profile(&IdentityProfile {
            id: uid(id),
            name: id.to_owned(),
            email: Email::parse(&format!("{id}@users.example")).unwrap(),
            picture: String::new(),
        })
        .await
        .unwrap();
    ctx.store.set_role(&uid(id), role).await.unwrap();
}

#[tokio::test]
async fn test_webhook_with_bad_signature_is_rejected() {
    let ctx = TestContext::new();
    let event = user_event("user.created", "u1", "Jane", "a@x.com", None);

    let mut request = ctx.signed_webhook("msg_1", &event);
    request.headers_mut().insert(
        "svix-signature",
        "v1,aW52YWxpZC1zaWduYXR1cmU=".parse().unwrap(),
    );
    let response = ctx.send(request).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(ctx.store.find_by_id(&uid("u1")).await.unwrap().is_none());
    assert_eq!(ctx.idp.write_attempts(), 0);
}

#[tokio::test]
async fn test_webhook_without_headers_is_rejected() {
    let ctx = TestContext::new();
    let event = user_event("user.created", "u1", "Jane", "a@x.com", None);

    let request = Request::post("/api/webhooks/identity")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(event.to_string()))
        .unwrap();
    let response = ctx.send(request).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(ctx.store.find_by_id(&uid("u1")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_unhandled_event_types_are_acknowledged() {
    let ctx = TestContext::new();
    let event = json!({ "type": "session.created", "data": { "id": "sess_1" } });

    let response = ctx.deliver("msg_1", &event).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text, "Webhook received");
}

#[tokio::test]
async fn test_store_owner_comes_from_the_session() {
    let ctx = TestContext::new();
    with_user(&ctx, "u1", Role::Seller).await;
    with_user(&ctx, "u2", Role::Seller).await;
    let cookie = ctx.login("u1").await;

    let mut body = store_body("Jane Goods", "shop@x.com", "+15551234567", "jane-goods");
    body["user_id"] = json!("u2");
    let response = ctx
        .send(json_request("POST", "/api/stores", Some(&cookie), &body))
        .await;

    assert_eq!(response.status, StatusCode::OK, "{}", response.text);
    assert_eq!(response.body["user_id"], "u1");
    assert_eq!(response.body["status"], "PENDING");
    assert!(
        ctx.store
            .list_stores_by_owner(&uid("u2"))
            .await
            .unwrap()
            .is_empty()
    );

    let mine = ctx
        .send(empty_request("GET", "/api/stores/mine", Some(&cookie)))
        .await;
    assert_eq!(mine.status, StatusCode::OK);
    assert_eq!(mine.body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_duplicate_store_url_is_conflict() {
    let ctx = TestContext::new();
    with_user(&ctx, "u1", Role::Seller).await;
    let cookie = ctx.login("u1").await;

    let first = store_body("Jane Goods", "shop@x.com", "+15551234567", "jane-goods");
    let response = ctx
        .send(json_request("POST", "/api/stores", Some(&cookie), &first))
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let second = store_body("Other Goods", "other@x.com", "+15557654321", "jane-goods");
    let response = ctx
        .send(json_request("POST", "/api/stores", Some(&cookie), &second))
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(response.text, "A store with same url already exists");
}

#[tokio::test]
async fn test_category_writes_are_admin_only() {
    let ctx = TestContext::new();
    with_user(&ctx, "s1", Role::Seller).await;
    with_user(&ctx, "a1", Role::Admin).await;
    let category = json!({ "name": "Shoes", "image": "img.png", "url": "shoes" });

    let anonymous = ctx
        .send(json_request("POST", "/api/categories", None, &category))
        .await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let seller = ctx.login("s1").await;
    let denied = ctx
        .send(json_request("POST", "/api/categories", Some(&seller), &category))
        .await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);
    assert_eq!(
        denied.text,
        "Unauthorized Access: Admin privileges required for entry"
    );
    assert_eq!(ctx.store.uniqueness_lookups(), 0);

    let admin = ctx.login("a1").await;
    let created = ctx
        .send(json_request("POST", "/api/categories", Some(&admin), &category))
        .await;
    assert_eq!(created.status, StatusCode::OK, "{}", created.text);
    let id = created.body["id"].as_str().unwrap().to_owned();

    // Reads are public.
    let listed = ctx
        .send(empty_request("GET", "/api/categories", None))
        .await;
    assert_eq!(listed.status, StatusCode::OK);
    assert_eq!(listed.body.as_array().unwrap().len(), 1);

    let fetched = ctx
        .send(empty_request("GET", &format!("/api/categories/{id}"), None))
        .await;
    assert_eq!(fetched.status, StatusCode::OK);
    assert_eq!(fetched.body["url"], "shoes");

    let deleted = ctx
        .send(empty_request(
            "DELETE",
            &format!("/api/categories/{id}"),
            Some(&admin),
        ))
        .await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_sub_category_needs_an_existing_parent() {
    let ctx = TestContext::new();
    with_user(&ctx, "a1", Role::Admin).await;
    let admin = ctx.login("a1").await;

    let body = json!({
        "name": "Sneakers",
        "image": "img.png",
        "url": "sneakers",
        "category_id": "00000000-0000-4000-8000-000000000000",
    });
    let response = ctx
        .send(json_request("POST", "/api/sub-categories", Some(&admin), &body))
        .await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(ctx.store.list_sub_categories().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_store_by_url_is_owner_only() {
    let ctx = TestContext::new();
    with_user(&ctx, "u1", Role::Seller).await;
    with_user(&ctx, "u2", Role::Seller).await;

    let owner = ctx.login("u1").await;
    let body = store_body("Jane Goods", "shop@x.com", "+15551234567", "jane-goods");
    let created = ctx
        .send(json_request("POST", "/api/stores", Some(&owner), &body))
        .await;
    assert_eq!(created.status, StatusCode::OK);

    let found = ctx
        .send(empty_request(
            "GET",
            "/api/stores/by-url/jane-goods",
            Some(&owner),
        ))
        .await;
    assert_eq!(found.status, StatusCode::OK);
    assert_eq!(found.body["id"], created.body["id"]);

    let other = ctx.login("u2").await;
    let hidden = ctx
        .send(empty_request(
            "GET",
            "/api/stores/by-url/jane-goods",
            Some(&other),
        ))
        .await;
    assert_eq!(hidden.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_logout_ends_the_session() {
    let ctx = TestContext::new();
    with_user(&ctx, "u1", Role::User).await;
    let cookie = ctx.login("u1").await;

    let me = ctx
        .send(empty_request("GET", "/auth/me", Some(&cookie)))
        .await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["external_id"], "u1");

    let logout = ctx
        .send(empty_request("POST", "/auth/logout", Some(&cookie)))
        .await;
    assert_eq!(logout.status, StatusCode::NO_CONTENT);

    let me = ctx
        .send(empty_request("GET", "/auth/me", Some(&cookie)))
        .await;
    assert_eq!(me.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_path_like_session_id_is_rejected() {
    let ctx = TestContext::new();
    with_user(&ctx, "u1", Role::Admin).await;
    // Even a provider that would answer for it is never asked.
    ctx.idp.insert_session("../users/u1", uid("u1")).await;

    for session_id in ["../users/u1", "a/b", "x?y", ""] {
        let response = ctx
            .send(json_request(
                "POST",
                "/auth/session",
                None,
                &json!({ "session_id": session_id }),
            ))
            .await;

        assert_eq!(response.status, StatusCode::UNAUTHORIZED, "{session_id:?}");
        assert!(response.set_cookie.is_none());
    }
}

#[tokio::test]
async fn test_unknown_provider_session_is_unauthenticated() {
    let ctx = TestContext::new();

    let response = ctx
        .send(json_request(
            "POST",
            "/auth/session",
            None,
            &json!({ "session_id": "sess_missing" }),
        ))
        .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert!(response.set_cookie.is_none());
}
