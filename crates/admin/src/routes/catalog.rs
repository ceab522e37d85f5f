//! Catalog JSON API.
//!
//! Handlers only translate HTTP to engine calls; role checks, validation
//! and ownership all happen in [`crate::catalog::UpsertEngine`].

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use tracing::instrument;

use marketplace_core::{CategoryId, StoreId, SubCategoryId, UrlSlug};

use crate::authz::Caller;
use crate::catalog::{CategoryInput, ResourceKind, StoreInput, SubCategoryInput};
use crate::error::AppError;
use crate::models::{Category, Store, SubCategory};
use crate::state::AppState;

/// Build the catalog router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/categories",
            get(list_categories).post(upsert_category),
        )
        .route(
            "/api/categories/{id}",
            get(get_category).delete(delete_category),
        )
        .route(
            "/api/sub-categories",
            get(list_sub_categories).post(upsert_sub_category),
        )
        .route(
            "/api/sub-categories/{id}",
            get(get_sub_category).delete(delete_sub_category),
        )
        .route("/api/stores", post(upsert_store))
        .route("/api/stores/mine", get(my_stores))
        .route("/api/stores/by-url/{url}", get(store_by_url))
        .route("/api/stores/{id}", get(store_by_id))
}

/// GET /api/categories
async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>, AppError> {
    Ok(Json(state.engine().categories().await?))
}

/// POST /api/categories
#[instrument(skip(state, caller, input))]
async fn upsert_category(
    State(state): State<AppState>,
    caller: Caller,
    Json(input): Json<CategoryInput>,
) -> Result<Json<Category>, AppError> {
    Ok(Json(state.engine().upsert_category(&caller, input).await?))
}

/// GET /api/categories/{id}
async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<CategoryId>,
) -> Result<Json<Category>, AppError> {
    Ok(Json(state.engine().category(id).await?))
}

/// DELETE /api/categories/{id}
#[instrument(skip(state, caller))]
async fn delete_category(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<CategoryId>,
) -> Result<StatusCode, AppError> {
    state.engine().delete_category(&caller, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/sub-categories
async fn list_sub_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<SubCategory>>, AppError> {
    Ok(Json(state.engine().sub_categories().await?))
}

/// POST /api/sub-categories
#[instrument(skip(state, caller, input))]
async fn upsert_sub_category(
    State(state): State<AppState>,
    caller: Caller,
    Json(input): Json<SubCategoryInput>,
) -> Result<Json<SubCategory>, AppError> {
    Ok(Json(
        state.engine().upsert_sub_category(&caller, input).await?,
    ))
}

/// GET /api/sub-categories/{id}
async fn get_sub_category(
    State(state): State<AppState>,
    Path(id): Path<SubCategoryId>,
) -> Result<Json<SubCategory>, AppError> {
    Ok(Json(state.engine().sub_category(id).await?))
}

/// DELETE /api/sub-categories/{id}
#[instrument(skip(state, caller))]
async fn delete_sub_category(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<SubCategoryId>,
) -> Result<StatusCode, AppError> {
    state.engine().delete_sub_category(&caller, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/stores
///
/// Any `user_id` in the body is ignored; the owner is the caller.
#[instrument(skip(state, caller, input))]
async fn upsert_store(
    State(state): State<AppState>,
    caller: Caller,
    Json(input): Json<StoreInput>,
) -> Result<Json<Store>, AppError> {
    Ok(Json(state.engine().upsert_store(&caller, input).await?))
}

/// GET /api/stores/mine
async fn my_stores(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Vec<Store>>, AppError> {
    Ok(Json(state.engine().stores_of(&caller).await?))
}

/// GET /api/stores/by-url/{url}
async fn store_by_url(
    State(state): State<AppState>,
    caller: Caller,
    Path(url): Path<String>,
) -> Result<Json<Store>, AppError> {
    // A malformed slug cannot name a stored row.
    let slug = UrlSlug::parse(&url).map_err(|_| AppError::NotFound {
        kind: ResourceKind::Store.label(),
        id: url.clone(),
    })?;
    Ok(Json(state.engine().store_by_url(&caller, &slug).await?))
}

/// GET /api/stores/{id}
async fn store_by_id(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<StoreId>,
) -> Result<Json<Store>, AppError> {
    Ok(Json(state.engine().store_by_id(&caller, id).await?))
}
