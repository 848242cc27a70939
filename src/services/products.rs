//! Products and their nested variants and images.

use sqlx::{SqliteConnection, SqlitePool};

use crate::api::error::ApiError;
use crate::db::{
    begin_write, now_timestamp, Category, CreateProductRequest, NewVariant, Product, ProductDetail, ProductFilter,
    ProductImage, ProductVariant, StockStatus, UpdateProductRequest, VariantWithImages,
};

/// Insert a variant and its images; returns the variant id.
pub(crate) async fn insert_variant(
    conn: &mut SqliteConnection,
    product_id: i64,
    variant: &NewVariant,
) -> Result<i64, ApiError> {
    let variant_id = sqlx::query(
        "INSERT INTO product_variants (product_id, size, color, price, quantity, status) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(product_id)
    .bind(variant.size.trim())
    .bind(variant.color.trim())
    .bind(variant.price)
    .bind(variant.quantity)
    .bind(variant.status.unwrap_or(StockStatus::InStock))
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    insert_images(conn, variant_id, &variant.images).await?;
    Ok(variant_id)
}

pub(crate) async fn insert_images(
    conn: &mut SqliteConnection,
    variant_id: i64,
    urls: &[String],
) -> Result<(), ApiError> {
    for url in urls {
        sqlx::query("INSERT INTO product_images (variant_id, url) VALUES (?, ?)")
            .bind(variant_id)
            .bind(url)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

pub(crate) async fn variant_with_images(
    db: &SqlitePool,
    variant: ProductVariant,
) -> Result<VariantWithImages, ApiError> {
    let images = sqlx::query_as::<_, ProductImage>(
        "SELECT * FROM product_images WHERE variant_id = ? ORDER BY id ASC",
    )
    .bind(variant.id)
    .fetch_all(db)
    .await?;
    Ok(VariantWithImages { variant, images })
}

async fn detail(db: &SqlitePool, product: Product) -> Result<ProductDetail, ApiError> {
    let category = sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = ?")
        .bind(product.category_id)
        .fetch_optional(db)
        .await?;

    let variants = sqlx::query_as::<_, ProductVariant>(
        "SELECT * FROM product_variants WHERE product_id = ? ORDER BY id ASC",
    )
    .bind(product.id)
    .fetch_all(db)
    .await?;

    let mut with_images = Vec::with_capacity(variants.len());
    for variant in variants {
        with_images.push(variant_with_images(db, variant).await?);
    }

    Ok(ProductDetail {
        product,
        category,
        variants: with_images,
    })
}

pub(crate) async fn load_details(
    db: &SqlitePool,
    products: Vec<Product>,
) -> Result<Vec<ProductDetail>, ApiError> {
    let mut details = Vec::with_capacity(products.len());
    for product in products {
        details.push(detail(db, product).await?);
    }
    Ok(details)
}

pub async fn get(db: &SqlitePool, id: i64) -> Result<ProductDetail, ApiError> {
    let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::not_found("Product not found"))?;
    detail(db, product).await
}

pub async fn get_by_slug(db: &SqlitePool, slug: &str) -> Result<ProductDetail, ApiError> {
    let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE slug = ?")
        .bind(slug)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::not_found("Product not found"))?;
    detail(db, product).await
}

/// Create a product with its variants and images in one transaction.
pub async fn create(db: &SqlitePool, req: &CreateProductRequest) -> Result<ProductDetail, ApiError> {
    let mut tx = begin_write(db).await?;

    let product_id = sqlx::query(
        "INSERT INTO products (name, description, slug, category_id) VALUES (?, ?, ?, ?)",
    )
    .bind(req.name.trim())
    .bind(&req.description)
    .bind(&req.slug)
    .bind(req.category_id)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    for variant in &req.variants {
        insert_variant(&mut tx, product_id, variant).await?;
    }

    tx.commit().await?;

    tracing::info!(product_id, slug = %req.slug, variants = req.variants.len(), "Created product");
    get(db, product_id).await
}

pub async fn update(db: &SqlitePool, id: i64, req: &UpdateProductRequest) -> Result<ProductDetail, ApiError> {
    let result = sqlx::query(
        r#"
        UPDATE products SET
            name = COALESCE(?, name),
            description = COALESCE(?, description),
            slug = COALESCE(?, slug),
            category_id = COALESCE(?, category_id),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(req.name.as_deref().map(str::trim))
    .bind(&req.description)
    .bind(&req.slug)
    .bind(req.category_id)
    .bind(now_timestamp())
    .bind(id)
    .execute(db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Product not found"));
    }
    get(db, id).await
}

/// Delete a product; variants, images and cart lines cascade. Past orders
/// keep their copied names and prices.
pub async fn delete(db: &SqlitePool, id: i64) -> Result<(), ApiError> {
    let result = sqlx::query("DELETE FROM products WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Product not found"));
    }
    tracing::info!(product_id = id, "Deleted product");
    Ok(())
}

pub async fn list_all(db: &SqlitePool) -> Result<Vec<ProductDetail>, ApiError> {
    let products = sqlx::query_as::<_, Product>("SELECT * FROM products ORDER BY created_at DESC, id DESC")
        .fetch_all(db)
        .await?;
    load_details(db, products).await
}

/// Products in an optional category having at least one variant that
/// matches every given variant criterion.
pub async fn filter(db: &SqlitePool, filter: &ProductFilter) -> Result<Vec<ProductDetail>, ApiError> {
    let mut conditions = Vec::new();
    let mut text_bindings: Vec<String> = Vec::new();
    let mut price_bindings: Vec<f64> = Vec::new();

    if let Some(category) = &filter.category {
        conditions.push("p.category_id IN (SELECT id FROM categories WHERE slug = ?)");
        text_bindings.push(category.clone());
    }

    let mut variant_conditions = Vec::new();
    if let Some(size) = &filter.size {
        variant_conditions.push("v.size = ?");
        text_bindings.push(size.clone());
    }
    if let Some(color) = &filter.color {
        variant_conditions.push("v.color = ?");
        text_bindings.push(color.clone());
    }
    if let Some(min_price) = filter.min_price {
        variant_conditions.push("v.price >= ?");
        price_bindings.push(min_price);
    }
    if let Some(max_price) = filter.max_price {
        variant_conditions.push("v.price <= ?");
        price_bindings.push(max_price);
    }

    let variant_clause = std::iter::once("v.product_id = p.id")
        .chain(variant_conditions.iter().copied())
        .collect::<Vec<_>>()
        .join(" AND ");
    let exists = format!(
        "EXISTS (SELECT 1 FROM product_variants v WHERE {})",
        variant_clause
    );
    conditions.push(&exists);

    let sql = format!(
        "SELECT p.* FROM products p WHERE {} ORDER BY p.created_at DESC, p.id DESC",
        conditions.join(" AND ")
    );

    // Text placeholders all precede the price ones in the generated SQL
    let mut query = sqlx::query_as::<_, Product>(&sql);
    for binding in &text_bindings {
        query = query.bind(binding);
    }
    for binding in &price_bindings {
        query = query.bind(binding);
    }

    let products = query.fetch_all(db).await?;
    load_details(db, products).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support;
    use axum::http::StatusCode;

    async fn category(db: &SqlitePool, slug: &str) -> i64 {
        sqlx::query("INSERT INTO categories (name, slug) VALUES (?, ?)")
            .bind(slug)
            .bind(slug)
            .execute(db)
            .await
            .unwrap()
            .last_insert_rowid()
    }

    fn variant(size: &str, color: &str, price: f64, images: &[&str]) -> NewVariant {
        NewVariant {
            size: size.to_string(),
            color: color.to_string(),
            price,
            quantity: 10,
            status: None,
            images: images.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn product(slug: &str, category_id: i64, variants: Vec<NewVariant>) -> CreateProductRequest {
        CreateProductRequest {
            name: format!("Product {}", slug),
            description: "Soft cotton".to_string(),
            slug: slug.to_string(),
            category_id,
            variants,
        }
    }

    #[tokio::test]
    async fn test_create_with_variants_and_images() {
        let db = test_support::pool().await;
        let shirts = category(&db, "shirts").await;
        let created = create(
            &db,
            &product(
                "oxford",
                shirts,
                vec![
                    variant("M", "White", 25.99, &["https://img.example.com/1.jpg"]),
                    variant("L", "Blue", 27.5, &[]),
                ],
            ),
        )
        .await
        .unwrap();

        assert_eq!(created.variants.len(), 2);
        assert_eq!(created.variants[0].variant.status, StockStatus::InStock);
        assert_eq!(created.variants[0].images.len(), 1);
        assert_eq!(created.category.unwrap().slug, "shirts");

        let by_slug = get_by_slug(&db, "oxford").await.unwrap();
        assert_eq!(by_slug.product.id, created.product.id);
    }

    #[tokio::test]
    async fn test_failed_create_leaves_nothing_behind() {
        let db = test_support::pool().await;
        let err = create(&db, &product("ghost", 999, vec![variant("M", "Red", 1.0, &[])]))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let variants: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM product_variants")
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(variants, 0);
    }

    #[tokio::test]
    async fn test_filter_by_category_and_variant_fields() {
        let db = test_support::pool().await;
        let shirts = category(&db, "shirts").await;
        let dresses = category(&db, "dresses").await;
        create(&db, &product("oxford", shirts, vec![variant("M", "White", 25.99, &[])]))
            .await
            .unwrap();
        create(&db, &product("linen", shirts, vec![variant("L", "Blue", 45.0, &[])]))
            .await
            .unwrap();
        create(&db, &product("maxi", dresses, vec![variant("M", "Blue", 60.0, &[])]))
            .await
            .unwrap();

        let in_shirts = filter(
            &db,
            &ProductFilter {
                category: Some("shirts".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(in_shirts.len(), 2);

        let blue_under_50 = filter(
            &db,
            &ProductFilter {
                color: Some("Blue".to_string()),
                max_price: Some(50.0),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(blue_under_50.len(), 1);
        assert_eq!(blue_under_50[0].product.slug, "linen");

        let medium_in_dresses = filter(
            &db,
            &ProductFilter {
                category: Some("dresses".to_string()),
                size: Some("M".to_string()),
                min_price: Some(10.0),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(medium_in_dresses.len(), 1);

        assert_eq!(filter(&db, &ProductFilter::default()).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let db = test_support::pool().await;
        let (product_id, _) = test_support::product(&db, "tee", 12.0, 4).await;

        let updated = update(
            &db,
            product_id,
            &UpdateProductRequest {
                name: Some("Basic Tee".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.product.name, "Basic Tee");
        assert_eq!(updated.product.slug, "tee");

        delete(&db, product_id).await.unwrap();
        let err = get(&db, product_id).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        let err = delete(&db, product_id).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
