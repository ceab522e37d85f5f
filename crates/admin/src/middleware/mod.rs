//! HTTP middleware for admin.
//!
//! - [`session`] - tower-sessions layer backed by `PostgreSQL`
//! - [`auth`] - [`Caller`](crate::authz::Caller) extraction from the session

pub mod auth;
pub mod session;

pub use auth::{clear_current_user, set_current_user};
pub use session::{create_session_layer, session_layer};
