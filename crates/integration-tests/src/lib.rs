//! Integration tests for the marketplace admin backend.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p marketplace-integration-tests
//! ```
//!
//! Everything runs in process: the in-memory store and identity provider
//! stand in for `PostgreSQL` and the provider's API, and HTTP tests drive the
//! router directly with `tower::ServiceExt::oneshot`.
//!
//! # Test Categories
//!
//! - `identity_sync` - Webhook ingestion, role propagation, the onboarding flow
//! - `catalog_upserts` - Authorization, uniqueness and ownership rules
//! - `http_api` - Routes, status codes and session handoff

#![allow(clippy::expect_used, clippy::missing_panics_doc)]

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use secrecy::SecretString;
use serde_json::{Value, json};
use tower::ServiceExt;
use tower_sessions::MemoryStore;

use marketplace_admin::config::SyncConfig;
use marketplace_admin::db::InMemoryStore;
use marketplace_admin::identity::WebhookVerifier;
use marketplace_admin::idp::InMemoryIdentityProvider;
use marketplace_admin::middleware::session_layer;
use marketplace_admin::propagation::RetryPolicy;
use marketplace_admin::routes;
use marketplace_admin::state::{AppState, Backends};
use marketplace_core::{ExternalUserId, Role};

/// base64("test-signing-key-0123456789")
pub const WEBHOOK_SECRET: &str = "whsec_dGVzdC1zaWduaW5nLWtleS0wMTIzNDU2Nzg5";

/// Session cookie name set by the admin session layer.
pub const SESSION_COOKIE: &str = "mp_admin_session";

/// Settings with short backoff so retry tests finish quickly.
#[must_use]
pub fn test_sync_config() -> SyncConfig {
    SyncConfig {
        store_timeout: Duration::from_secs(2),
        idp_timeout: Duration::from_secs(2),
        retry: RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(5),
        },
        webhook_tolerance: Duration::from_secs(300),
        claim_ttl: Duration::from_secs(300),
    }
}

#[must_use]
pub fn uid(id: &str) -> ExternalUserId {
    ExternalUserId::parse(id).expect("valid external id")
}

/// A `user.*` webhook body in the identity provider's shape.
#[must_use]
pub fn user_event(event_type: &str, id: &str, first_name: &str, email: &str, role: Option<&str>) -> Value {
    let mut metadata = serde_json::Map::new();
    if let Some(role) = role {
        metadata.insert("role".to_owned(), json!(role));
    }

    json!({
        "type": event_type,
        "data": {
            "id": id,
            "first_name": first_name,
            "last_name": "",
            "image_url": "https://img.example/avatar.png",
            "primary_email_address_id": "idn_1",
            "email_addresses": [{ "id": "idn_1", "email_address": email }],
            "private_metadata": metadata,
        }
    })
}

/// A response collected into status, headers and JSON (or `Null`).
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub set_cookie: Option<String>,
    pub body: Value,
    pub text: String,
}

/// One in-process admin backend.
pub struct TestContext {
    pub store: Arc<InMemoryStore>,
    pub idp: Arc<InMemoryIdentityProvider>,
    pub state: AppState,
    app: Router,
    signer: WebhookVerifier,
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TestContext {
    #[must_use]
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let idp = Arc::new(InMemoryIdentityProvider::new());
        let sync = test_sync_config();

        let backends = Backends {
            pool: None,
            users: store.clone(),
            catalog: store.clone(),
            metadata: idp.clone(),
            sessions: idp.clone(),
        };
        let secret = SecretString::from(WEBHOOK_SECRET);
        let verifier =
            WebhookVerifier::new(&secret, sync.webhook_tolerance).expect("valid webhook secret");
        let signer =
            WebhookVerifier::new(&secret, sync.webhook_tolerance).expect("valid webhook secret");

        let state = AppState::from_backends(backends, verifier, sync);
        // One router, cloned per request, so the session store is shared.
        let app = routes::routes()
            .layer(session_layer(MemoryStore::default(), false))
            .with_state(state.clone());

        Self {
            store,
            idp,
            state,
            app,
            signer,
        }
    }

    /// Send a request through the full router.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        let status = response.status();
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(str::to_owned);
        let bytes = to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("readable body");
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse {
            status,
            set_cookie,
            body,
            text,
        }
    }

    /// A webhook request signed with the shared secret.
    #[must_use]
    pub fn signed_webhook(&self, msg_id: &str, body: &Value) -> Request<Body> {
        let body = body.to_string();
        let timestamp = now_secs().to_string();
        let signature = self
            .signer
            .sign(msg_id, &timestamp, body.as_bytes())
            .expect("signable");

        Request::post("/api/webhooks/identity")
            .header(header::CONTENT_TYPE, "application/json")
            .header("svix-id", msg_id)
            .header("svix-timestamp", timestamp)
            .header("svix-signature", format!("v1,{signature}"))
            .body(Body::from(body))
            .expect("valid request")
    }

    /// Deliver a signed webhook and return the response.
    pub async fn deliver(&self, msg_id: &str, body: &Value) -> TestResponse {
        self.send(self.signed_webhook(msg_id, body)).await
    }

    /// Hand off a provider session for `user` and return the session cookie.
    pub async fn login(&self, user: &str) -> String {
        let session_id = format!("sess_{user}");
        self.idp.insert_session(&session_id, uid(user)).await;

        let response = self
            .send(json_request(
                "POST",
                "/auth/session",
                None,
                &json!({ "session_id": session_id }),
            ))
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.text);
        response.set_cookie.expect("session cookie")
    }

    /// Wait until the provider holds `role` for `user`.
    pub async fn wait_for_provider_role(&self, user: &str, role: Role) {
        let id = uid(user);
        for _ in 0..200 {
            if self.idp.role_of(&id).await == Some(role) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("provider never saw {role} for {user}");
    }
}

/// A JSON request, optionally carrying a session cookie.
#[must_use]
pub fn json_request(method: &str, uri: &str, cookie: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("valid request")
}

/// A bodyless request, optionally carrying a session cookie.
#[must_use]
pub fn empty_request(method: &str, uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).expect("valid request")
}

/// A store payload with a valid description.
#[must_use]
pub fn store_body(name: &str, email: &str, phone: &str, url: &str) -> Value {
    json!({
        "name": name,
        "description": "Handmade goods shipped from a small workshop.",
        "email": email,
        "phone": phone,
        "url": url,
        "logo": "logo.png",
        "cover": "cover.png",
    })
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock after epoch")
        .as_secs()
}
