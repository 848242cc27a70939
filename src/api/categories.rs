use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_length, validate_optional_length, validate_slug};
use crate::db::{
    Category, CategoryDetail, CategoryTree, CreateCategoryRequest, SuccessResponse,
    UpdateCategoryRequest,
};
use crate::services::categories;
use crate::AppState;

/// GET /categories
pub async fn list_top_level(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CategoryTree>>, ApiError> {
    Ok(Json(categories::list_top_level(&state.db).await?))
}

/// GET /categories/:slug
pub async fn get_by_slug(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<CategoryDetail>, ApiError> {
    Ok(Json(categories::get_by_slug(&state.db, &slug).await?))
}

/// GET /admin/categories
pub async fn list_all(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CategoryTree>>, ApiError> {
    Ok(Json(categories::list_all(&state.db).await?))
}

/// POST /admin/categories
pub async fn create_category(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check("name", validate_length(&req.name, "Name", 2, 100));
    if let Some(slug) = &req.slug {
        errors.check("slug", validate_slug(slug));
    }
    errors.finish()?;

    let category = categories::create(&state.db, &req).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// PUT /admin/categories/:id
pub async fn update_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateCategoryRequest>,
) -> Result<Json<Category>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check("name", validate_optional_length(&req.name, "Name", 2, 100));
    if let Some(slug) = &req.slug {
        errors.check("slug", validate_slug(slug));
    }
    errors.finish()?;

    Ok(Json(categories::update(&state.db, id, &req).await?))
}

/// DELETE /admin/categories/:id
pub async fn delete_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse>, ApiError> {
    categories::delete(&state.db, id).await?;
    Ok(Json(SuccessResponse::ok()))
}
