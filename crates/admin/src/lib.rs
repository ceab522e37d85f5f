//! Marketplace admin library.
//!
//! Keeps the local user table in step with the identity provider, pushes
//! authoritative roles back to it, and gates catalog writes on those roles.
//!
//! # Modules
//!
//! - [`identity`] - Signed webhook ingestion into the user table
//! - [`propagation`] - Role writes into identity provider metadata
//! - [`authz`] - Exact-role authorization with claim-first lookup
//! - [`catalog`] - Uniqueness checks and the gated upsert pipeline
//! - [`routes`] - HTTP surface
//!
//! # Security
//!
//! Holds the identity provider's backend secret key, which can rewrite any
//! user's metadata. Never expose it to browsers.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod authz;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod idp;
pub mod middleware;
pub mod models;
pub mod propagation;
pub mod routes;
pub mod state;
pub mod timeout;
