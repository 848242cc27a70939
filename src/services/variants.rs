use sqlx::SqlitePool;

use crate::api::error::ApiError;
use crate::db::{begin_write, CreateVariantRequest, ProductVariant, UpdateVariantRequest, VariantWithImages};

use super::products::{insert_images, insert_variant, variant_with_images};

async fn fetch(db: &SqlitePool, id: i64) -> Result<ProductVariant, ApiError> {
    sqlx::query_as::<_, ProductVariant>("SELECT * FROM product_variants WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::not_found("Variant not found"))
}

pub async fn create(db: &SqlitePool, req: &CreateVariantRequest) -> Result<VariantWithImages, ApiError> {
    let product: Option<(i64,)> = sqlx::query_as("SELECT id FROM products WHERE id = ?")
        .bind(req.product_id)
        .fetch_optional(db)
        .await?;
    if product.is_none() {
        return Err(ApiError::not_found("Product not found"));
    }

    let mut tx = begin_write(db).await?;
    let variant_id = insert_variant(&mut tx, req.product_id, &req.variant).await?;
    tx.commit().await?;

    variant_with_images(db, fetch(db, variant_id).await?).await
}

/// Update a variant of a given product, replacing its images when provided.
pub async fn update(
    db: &SqlitePool,
    product_id: i64,
    variant_id: i64,
    req: &UpdateVariantRequest,
) -> Result<VariantWithImages, ApiError> {
    let mut tx = begin_write(db).await?;

    let owner: Option<(i64,)> = sqlx::query_as("SELECT product_id FROM product_variants WHERE id = ?")
        .bind(variant_id)
        .fetch_optional(&mut *tx)
        .await?;
    match owner {
        Some((owner,)) if owner == product_id => {}
        _ => return Err(ApiError::not_found("Variant not found for this product")),
    }

    sqlx::query(
        r#"
        UPDATE product_variants SET
            size = COALESCE(?, size),
            color = COALESCE(?, color),
            price = COALESCE(?, price),
            quantity = COALESCE(?, quantity),
            status = COALESCE(?, status)
        WHERE id = ?
        "#,
    )
    .bind(req.size.as_deref().map(str::trim))
    .bind(req.color.as_deref().map(str::trim))
    .bind(req.price)
    .bind(req.quantity)
    .bind(req.status)
    .bind(variant_id)
    .execute(&mut *tx)
    .await?;

    if let Some(images) = &req.images {
        sqlx::query("DELETE FROM product_images WHERE variant_id = ?")
            .bind(variant_id)
            .execute(&mut *tx)
            .await?;
        insert_images(&mut tx, variant_id, images).await?;
    }

    tx.commit().await?;
    variant_with_images(db, fetch(db, variant_id).await?).await
}

pub async fn delete(db: &SqlitePool, id: i64) -> Result<(), ApiError> {
    let result = sqlx::query("DELETE FROM product_variants WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Variant not found"));
    }
    Ok(())
}
