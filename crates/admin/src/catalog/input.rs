//! Raw catalog payloads and their shape validation.
//!
//! Inputs deserialize leniently (unknown fields such as a spoofed `user_id`
//! are dropped) and are turned into the typed `*Write` records only by
//! `validate`, which reports the first offending field.

use serde::Deserialize;

use marketplace_core::{
    CategoryId, Email, ExternalUserId, Phone, StoreId, StoreStatus, SubCategoryId, UrlSlug,
};

use crate::error::AppError;
use crate::models::{CategoryWrite, StoreWrite, SubCategoryWrite};

const NAME_MIN: usize = 2;
const NAME_MAX: usize = 50;
const DESCRIPTION_MIN: usize = 30;
const DESCRIPTION_MAX: usize = 500;

/// Category create-or-replace payload.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryInput {
    /// Absent on creation.
    #[serde(default)]
    pub id: Option<CategoryId>,
    pub name: String,
    pub image: String,
    pub url: String,
    #[serde(default)]
    pub featured: bool,
}

/// Sub-category create-or-replace payload.
#[derive(Debug, Clone, Deserialize)]
pub struct SubCategoryInput {
    #[serde(default)]
    pub id: Option<SubCategoryId>,
    pub name: String,
    pub image: String,
    pub url: String,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
}

/// Store create-or-replace payload. Carries no owner: it always comes from
/// the authenticated caller.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreInput {
    #[serde(default)]
    pub id: Option<StoreId>,
    pub name: String,
    pub description: String,
    pub email: String,
    pub phone: String,
    pub url: String,
    pub logo: String,
    pub cover: String,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub status: Option<StoreStatus>,
}

impl CategoryInput {
    /// Check the payload's shape and assign an id if it has none.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` naming the first invalid field.
    pub fn validate(self) -> Result<CategoryWrite, AppError> {
        let name = validate_category_name(&self.name)?;
        let image = require_present("image", &self.image)?;
        let url = validate_url(&self.url)?;

        Ok(CategoryWrite {
            id: self.id.unwrap_or_else(CategoryId::generate),
            name,
            image,
            url,
            featured: self.featured,
        })
    }
}

impl SubCategoryInput {
    /// Check the payload's shape and assign an id if it has none.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` naming the first invalid field.
    pub fn validate(self) -> Result<SubCategoryWrite, AppError> {
        let name = validate_category_name(&self.name)?;
        let image = require_present("image", &self.image)?;
        let url = validate_url(&self.url)?;
        let category_id = self
            .category_id
            .ok_or_else(|| AppError::validation("category_id", "a parent category is required"))?;

        Ok(SubCategoryWrite {
            id: self.id.unwrap_or_else(SubCategoryId::generate),
            name,
            image,
            url,
            featured: self.featured,
            category_id,
        })
    }
}

impl StoreInput {
    /// Check the payload's shape, assign an id if it has none and bind the
    /// owner to `actor`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` naming the first invalid field.
    pub fn validate(self, actor: &ExternalUserId) -> Result<StoreWrite, AppError> {
        let name = validate_store_name(&self.name)?;

        let description_len = self.description.chars().count();
        if !(DESCRIPTION_MIN..=DESCRIPTION_MAX).contains(&description_len) {
            return Err(AppError::validation(
                "description",
                format!(
                    "must be between {DESCRIPTION_MIN} and {DESCRIPTION_MAX} characters long"
                ),
            ));
        }

        let email =
            Email::parse(&self.email).map_err(|e| AppError::validation("email", e.to_string()))?;
        let phone =
            Phone::parse(&self.phone).map_err(|e| AppError::validation("phone", e.to_string()))?;
        let url = validate_url(&self.url)?;
        let logo = require_present("logo", &self.logo)?;
        let cover = require_present("cover", &self.cover)?;

        Ok(StoreWrite {
            id: self.id.unwrap_or_else(StoreId::generate),
            name,
            description: self.description,
            email,
            phone,
            url,
            logo,
            cover,
            featured: self.featured,
            status: self.status.unwrap_or_default(),
            owner: actor.clone(),
        })
    }
}

fn validate_url(url: &str) -> Result<UrlSlug, AppError> {
    UrlSlug::parse(url).map_err(|e| AppError::validation("url", e.to_string()))
}

fn require_present(field: &'static str, value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation(field, "an image is required"));
    }
    Ok(trimmed.to_owned())
}

fn check_name_length(name: &str) -> Result<(), AppError> {
    let len = name.chars().count();
    if len < NAME_MIN {
        return Err(AppError::validation(
            "name",
            format!("must be at least {NAME_MIN} characters long"),
        ));
    }
    if len > NAME_MAX {
        return Err(AppError::validation(
            "name",
            format!("cannot exceed {NAME_MAX} characters"),
        ));
    }
    Ok(())
}

/// Category and sub-category names: letters, digits, spaces, `'`, `&`, `-`.
fn validate_category_name(name: &str) -> Result<String, AppError> {
    check_name_length(name)?;
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '\'' | '&' | '-'))
    {
        return Err(AppError::validation(
            "name",
            "only letters, numbers, and spaces are allowed",
        ));
    }
    Ok(name.to_owned())
}

/// Store names: letters, digits and single separators among `- _ & space`.
fn validate_store_name(name: &str) -> Result<String, AppError> {
    check_name_length(name)?;
    let is_sep = |c: char| matches!(c, '-' | '_' | '&' | ' ');
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || is_sep(c)) {
        return Err(AppError::validation(
            "name",
            "only letters, numbers, space, hyphen, and underscore are allowed",
        ));
    }
    if name
        .chars()
        .zip(name.chars().skip(1))
        .any(|(a, b)| is_sep(a) && is_sep(b))
    {
        return Err(AppError::validation(
            "name",
            "consecutive hyphens, underscores, or spaces are not permitted",
        ));
    }
    Ok(name.to_owned())
}
