use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::auth::CurrentUser;
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_amount, validate_optional_length, validate_uuid};
use crate::db::{
    AdminOrderQuery, OrderDetail, Paginated, PlaceOrderRequest, UpdateOrderStatusRequest,
};
use crate::services::orders;
use crate::AppState;

/// POST /orders
pub async fn place_order(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<OrderDetail>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("addressId", validate_uuid(&req.address_id, "address id"))
        .check("shippingFee", validate_amount(req.shipping_fee, "Shipping fee"))
        .check("discount", validate_amount(req.discount, "Discount"))
        .check("paymentRef", validate_optional_length(&req.payment_ref, "Payment reference", 0, 200));
    errors.finish()?;

    let order = orders::place(&state.db, &user.id, &req).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /orders
pub async fn list_my_orders(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<Json<Vec<OrderDetail>>, ApiError> {
    Ok(Json(orders::list_mine(&state.db, &user.id).await?))
}

/// GET /orders/:id
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<OrderDetail>, ApiError> {
    Ok(Json(
        orders::get_for_user(&state.db, &user.id, user.is_admin(), &id).await?,
    ))
}

/// GET /admin/orders
pub async fn admin_list_orders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminOrderQuery>,
) -> Result<Json<Paginated<OrderDetail>>, ApiError> {
    Ok(Json(orders::admin_list(&state.db, &query).await?))
}

/// GET /admin/orders/:id
pub async fn admin_get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderDetail>, ApiError> {
    Ok(Json(orders::get(&state.db, &id).await?))
}

/// PUT /admin/orders/:id/status
pub async fn update_order_status(
    State(state): State<Arc<AppState>>,
    admin: CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateOrderStatusRequest>,
) -> Result<Json<OrderDetail>, ApiError> {
    let order = orders::update_status(&state.db, &id, req.status).await?;
    tracing::info!(order_id = %id, admin_id = %admin.id, status = %req.status, "Admin updated order status");
    Ok(Json(order))
}
