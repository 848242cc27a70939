//! The signed-in user's shopping cart. One cart per user, created on first use.

use sqlx::SqlitePool;

use crate::api::error::ApiError;
use crate::db::{AddToCartRequest, Cart, CartItem, CartLine, CartView, Product, ProductVariant};

async fn get_or_create(db: &SqlitePool, user_id: &str) -> Result<Cart, ApiError> {
    sqlx::query("INSERT INTO carts (user_id) VALUES (?) ON CONFLICT(user_id) DO NOTHING")
        .bind(user_id)
        .execute(db)
        .await?;
    let cart = sqlx::query_as::<_, Cart>("SELECT * FROM carts WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(db)
        .await?;
    Ok(cart)
}

pub async fn view(db: &SqlitePool, user_id: &str) -> Result<CartView, ApiError> {
    let cart = get_or_create(db, user_id).await?;

    let items = sqlx::query_as::<_, CartItem>(
        "SELECT * FROM cart_items WHERE cart_id = ? ORDER BY id ASC",
    )
    .bind(cart.id)
    .fetch_all(db)
    .await?;

    let mut lines = Vec::with_capacity(items.len());
    for item in items {
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?")
            .bind(item.product_id)
            .fetch_one(db)
            .await?;
        let variant = sqlx::query_as::<_, ProductVariant>("SELECT * FROM product_variants WHERE id = ?")
            .bind(item.variant_id)
            .fetch_one(db)
            .await?;
        lines.push(CartLine {
            id: item.id,
            quantity: item.quantity,
            product,
            variant,
        });
    }

    Ok(CartView {
        id: cart.id,
        user_id: cart.user_id,
        items: lines,
    })
}

/// Add a variant; adding one already in the cart increases its quantity.
pub async fn add(db: &SqlitePool, user_id: &str, req: &AddToCartRequest) -> Result<CartView, ApiError> {
    let quantity = req.quantity.unwrap_or(1);
    if quantity < 1 {
        return Err(ApiError::validation_field("quantity", "Quantity must be at least 1"));
    }

    let variant: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM product_variants WHERE id = ? AND product_id = ?")
            .bind(req.variant_id)
            .bind(req.product_id)
            .fetch_optional(db)
            .await?;
    if variant.is_none() {
        return Err(ApiError::not_found("Variant not found for this product"));
    }

    let cart = get_or_create(db, user_id).await?;
    sqlx::query(
        r#"
        INSERT INTO cart_items (cart_id, product_id, variant_id, quantity) VALUES (?, ?, ?, ?)
        ON CONFLICT(cart_id, variant_id) DO UPDATE SET quantity = cart_items.quantity + excluded.quantity
        "#,
    )
    .bind(cart.id)
    .bind(req.product_id)
    .bind(req.variant_id)
    .bind(quantity)
    .execute(db)
    .await?;

    view(db, user_id).await
}

pub async fn update_item(
    db: &SqlitePool,
    user_id: &str,
    item_id: i64,
    quantity: i64,
) -> Result<CartView, ApiError> {
    if quantity < 1 {
        return Err(ApiError::validation_field("quantity", "Quantity must be at least 1"));
    }
    let result = sqlx::query(
        "UPDATE cart_items SET quantity = ? WHERE id = ? AND cart_id IN (SELECT id FROM carts WHERE user_id = ?)",
    )
    .bind(quantity)
    .bind(item_id)
    .bind(user_id)
    .execute(db)
    .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Cart item not found"));
    }
    view(db, user_id).await
}

pub async fn remove_item(db: &SqlitePool, user_id: &str, item_id: i64) -> Result<CartView, ApiError> {
    let result = sqlx::query(
        "DELETE FROM cart_items WHERE id = ? AND cart_id IN (SELECT id FROM carts WHERE user_id = ?)",
    )
    .bind(item_id)
    .bind(user_id)
    .execute(db)
    .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Cart item not found"));
    }
    view(db, user_id).await
}
