//! Admin account management.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::auth::CurrentUser;
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{
    normalize_email, validate_email, validate_optional_length, validate_password,
};
use crate::db::{
    AdminCreateUserRequest, AdminUserQuery, Paginated, SuccessResponse, UpdateRoleRequest,
    UpdateStatusRequest, UserResponse,
};
use crate::services::admin;
use crate::AppState;

/// GET /admin/users?q&page&pageSize&sortBy&sortDir
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminUserQuery>,
) -> Result<Json<Paginated<UserResponse>>, ApiError> {
    Ok(Json(admin::list_users(&state.db, &query).await?))
}

/// POST /admin/users
pub async fn create_admin(
    State(state): State<Arc<AppState>>,
    actor: CurrentUser,
    Json(mut req): Json<AdminCreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    req.email = normalize_email(&req.email);

    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("email", validate_email(&req.email))
        .check("password", validate_password(&req.password))
        .check("name", validate_optional_length(&req.name, "Name", 1, 100));
    errors.finish()?;

    let user = admin::create_admin(&state.db, &req).await?;
    tracing::info!(admin_id = %actor.id, user_id = %user.id, "Admin created another admin");
    Ok((StatusCode::CREATED, Json(user)))
}

/// PATCH /admin/users/:id/role
pub async fn update_role(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateRoleRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    Ok(Json(admin::set_role(&state.db, &id, req.role).await?))
}

/// PATCH /admin/users/:id/status
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    actor: CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    Ok(Json(
        admin::set_status(&state.db, &actor.id, &id, req.status).await?,
    ))
}

/// DELETE /admin/users/:id
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    actor: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    admin::delete_user(&state.db, &actor.id, &id).await?;
    Ok(Json(SuccessResponse::ok()))
}
