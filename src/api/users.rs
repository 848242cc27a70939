//! The signed-in user's own account and customer profile.

use axum::{extract::State, Json};
use std::sync::Arc;

use super::auth::CurrentUser;
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_date, validate_http_url, validate_optional_length, validate_phone};
use crate::db::{ProfileResponse, UpdateMeRequest, UpdateProfileRequest, UserResponse};
use crate::services::{profiles, users};
use crate::AppState;

fn check_contact(errors: &mut ValidationErrorBuilder, name: &Option<String>, phone: &Option<String>) {
    errors
        .check("name", validate_optional_length(name, "Name", 1, 100))
        .check("phone", validate_phone(phone, 7, 20));
}

/// GET /users/me
pub async fn get_me(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<Json<UserResponse>, ApiError> {
    Ok(Json(users::get_me(&state.db, &user.id).await?))
}

/// PATCH /users/me
pub async fn update_me(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(req): Json<UpdateMeRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    check_contact(&mut errors, &req.name, &req.phone);
    errors.finish()?;

    Ok(Json(users::update_me(&state.db, &user.id, &req).await?))
}

/// GET /profile
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<Json<ProfileResponse>, ApiError> {
    Ok(Json(profiles::get_profile(&state.db, &user.id).await?))
}

/// PATCH /profile
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    check_contact(&mut errors, &req.name, &req.phone);
    errors
        .check("dateOfBirth", validate_date(&req.date_of_birth))
        .check("avatarUrl", validate_http_url(&req.avatar_url))
        .check("notes", validate_optional_length(&req.notes, "Notes", 0, 1000));
    errors.finish()?;

    Ok(Json(profiles::update_profile(&state.db, &user.id, &req).await?))
}
