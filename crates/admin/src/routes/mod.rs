//! HTTP route handlers for admin.
//!
//! # Route Structure
//!
//! ```text
//! # Identity webhooks (signature-verified, no session)
//! POST   /api/webhooks/identity       - Identity provider lifecycle events
//!
//! # Session handoff
//! POST   /auth/session                - Exchange a provider session for a local one
//! POST   /auth/logout                 - Clear the local session
//! GET    /auth/me                     - Current session identity
//!
//! # Categories (ADMIN writes, public reads)
//! GET    /api/categories              - List categories
//! POST   /api/categories              - Create or replace a category
//! GET    /api/categories/{id}         - Category detail
//! DELETE /api/categories/{id}         - Delete a category without children
//!
//! # Sub-categories (ADMIN writes, public reads)
//! GET    /api/sub-categories          - List sub-categories
//! POST   /api/sub-categories          - Create or replace a sub-category
//! GET    /api/sub-categories/{id}     - Sub-category detail
//! DELETE /api/sub-categories/{id}     - Delete a sub-category
//!
//! # Stores (SELLER, owner-scoped)
//! POST   /api/stores                  - Create or replace a store
//! GET    /api/stores/mine             - Stores owned by the caller
//! GET    /api/stores/by-url/{url}     - Owned store by slug
//! GET    /api/stores/{id}             - Owned store by id
//! ```
//!
//! Health checks are mounted by the binary.

pub mod auth;
pub mod catalog;
pub mod webhooks;

use axum::Router;

use crate::state::AppState;

/// All application routes. The caller adds the session layer and state.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(webhooks::router())
        .merge(auth::router())
        .merge(catalog::router())
}
