//! Domain models for the marketplace admin backend.
//!
//! Records read from the store (`User`, `Category`, ...) are separate from the
//! validated write payloads (`CategoryWrite`, ...) handed to the repositories.

pub mod catalog;
pub mod session;
pub mod user;

pub use catalog::{Category, CategoryWrite, Store, StoreWrite, SubCategory, SubCategoryWrite};
pub use session::{CurrentUser, keys as session_keys};
pub use user::{IdentityProfile, User};
