//! Role-gated, uniqueness-checked catalog writes.
//!
//! - [`kind`] - resource kinds, their required roles and unique fields
//! - [`input`] - request payloads and shape validation
//! - [`validator`] - pre-flight uniqueness checks
//! - [`engine`] - the authorize, validate, check, write pipeline

pub mod engine;
pub mod input;
pub mod kind;
pub mod validator;

pub use engine::{CatalogInput, CatalogResource, UpsertEngine};
pub use input::{CategoryInput, StoreInput, SubCategoryInput};
pub use kind::{ResourceKind, UniqueField};
pub use validator::{Candidate, Conflict, UniquenessValidator};
