use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::auth::CurrentUser;
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_length, validate_optional_length, validate_phone};
use crate::db::{
    Address, AdminAddressQuery, CreateAddressRequest, SuccessResponse, UpdateAddressRequest,
};
use crate::services::addresses;
use crate::AppState;

fn check_optional_fields(
    errors: &mut ValidationErrorBuilder,
    line2: &Option<String>,
    state: &Option<String>,
    postal_code: &Option<String>,
    phone: &Option<String>,
) {
    errors
        .check("line2", validate_optional_length(line2, "Address line 2", 0, 200))
        .check("state", validate_optional_length(state, "State", 0, 100))
        .check("postalCode", validate_optional_length(postal_code, "Postal code", 0, 20))
        .check("phone", validate_phone(phone, 6, 20));
}

/// GET /addresses
pub async fn list_addresses(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<Json<Vec<Address>>, ApiError> {
    Ok(Json(addresses::list_mine(&state.db, &user.id).await?))
}

/// POST /addresses
pub async fn create_address(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(req): Json<CreateAddressRequest>,
) -> Result<(StatusCode, Json<Address>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("line1", validate_length(&req.line1, "Address line 1", 3, 200))
        .check("city", validate_length(&req.city, "City", 2, 100))
        .check("country", validate_length(&req.country, "Country", 2, 3));
    check_optional_fields(&mut errors, &req.line2, &req.state, &req.postal_code, &req.phone);
    errors.finish()?;

    let address = addresses::create(&state.db, &user.id, &req).await?;
    Ok((StatusCode::CREATED, Json(address)))
}

/// PATCH /addresses/:id
pub async fn update_address(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateAddressRequest>,
) -> Result<Json<Address>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("line1", validate_optional_length(&req.line1, "Address line 1", 3, 200))
        .check("city", validate_optional_length(&req.city, "City", 2, 100))
        .check("country", validate_optional_length(&req.country, "Country", 2, 3));
    check_optional_fields(&mut errors, &req.line2, &req.state, &req.postal_code, &req.phone);
    errors.finish()?;

    Ok(Json(addresses::update(&state.db, &user.id, &id, &req).await?))
}

/// DELETE /addresses/:id
pub async fn delete_address(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    addresses::delete(&state.db, &user.id, &id).await?;
    Ok(Json(SuccessResponse::ok()))
}

/// PATCH /addresses/:id/default
pub async fn set_default_address(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Address>, ApiError> {
    Ok(Json(addresses::set_default(&state.db, &user.id, &id).await?))
}

/// GET /admin/addresses?userId=
pub async fn admin_list_addresses(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminAddressQuery>,
) -> Result<Json<Vec<Address>>, ApiError> {
    Ok(Json(
        addresses::admin_list(&state.db, query.user_id.as_deref()).await?,
    ))
}
