use axum::{extract::State, Json};
use std::sync::Arc;

use super::auth::CurrentUser;
use super::error::ApiError;
use crate::db::{AddToCartRequest, CartView, RemoveCartItemRequest, UpdateCartItemRequest};
use crate::services::cart;
use crate::AppState;

/// GET /cart
pub async fn get_cart(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<Json<CartView>, ApiError> {
    Ok(Json(cart::view(&state.db, &user.id).await?))
}

/// POST /cart/add
pub async fn add_to_cart(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(req): Json<AddToCartRequest>,
) -> Result<Json<CartView>, ApiError> {
    Ok(Json(cart::add(&state.db, &user.id, &req).await?))
}

/// PATCH /cart/update
pub async fn update_cart_item(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(req): Json<UpdateCartItemRequest>,
) -> Result<Json<CartView>, ApiError> {
    Ok(Json(
        cart::update_item(&state.db, &user.id, req.item_id, req.quantity).await?,
    ))
}

/// DELETE /cart/remove
pub async fn remove_cart_item(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(req): Json<RemoveCartItemRequest>,
) -> Result<Json<CartView>, ApiError> {
    Ok(Json(cart::remove_item(&state.db, &user.id, req.item_id).await?))
}
