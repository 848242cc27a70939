use sqlx::SqlitePool;

use crate::api::error::ApiError;
use crate::api::validation::slugify;
use crate::db::{Category, CategoryDetail, CategoryTree, CreateCategoryRequest, UpdateCategoryRequest};

use super::products::load_details;

async fn children_of(db: &SqlitePool, parent_id: i64) -> Result<Vec<Category>, ApiError> {
    let children = sqlx::query_as::<_, Category>(
        "SELECT * FROM categories WHERE parent_id = ? ORDER BY name ASC",
    )
    .bind(parent_id)
    .fetch_all(db)
    .await?;
    Ok(children)
}

async fn with_children(db: &SqlitePool, categories: Vec<Category>) -> Result<Vec<CategoryTree>, ApiError> {
    let mut trees = Vec::with_capacity(categories.len());
    for category in categories {
        let children = children_of(db, category.id).await?;
        trees.push(CategoryTree { category, children });
    }
    Ok(trees)
}

pub async fn get(db: &SqlitePool, id: i64) -> Result<Category, ApiError> {
    sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::not_found("Category not found"))
}

async fn ensure_parent(db: &SqlitePool, parent_id: Option<i64>, own_id: Option<i64>) -> Result<(), ApiError> {
    let Some(parent_id) = parent_id else {
        return Ok(());
    };
    if Some(parent_id) == own_id {
        return Err(ApiError::bad_request("A category cannot be its own parent"));
    }
    get(db, parent_id)
        .await
        .map_err(|_| ApiError::bad_request("Parent category does not exist"))?;
    Ok(())
}

pub async fn create(db: &SqlitePool, req: &CreateCategoryRequest) -> Result<Category, ApiError> {
    ensure_parent(db, req.parent_id, None).await?;

    let name = req.name.trim();
    let slug = req
        .slug
        .as_deref()
        .map(str::to_string)
        .unwrap_or_else(|| slugify(name));

    let id = sqlx::query("INSERT INTO categories (name, slug, parent_id) VALUES (?, ?, ?)")
        .bind(name)
        .bind(&slug)
        .bind(req.parent_id)
        .execute(db)
        .await?
        .last_insert_rowid();

    tracing::info!(category_id = id, slug = %slug, "Created category");
    get(db, id).await
}

pub async fn update(db: &SqlitePool, id: i64, req: &UpdateCategoryRequest) -> Result<Category, ApiError> {
    get(db, id).await?;
    ensure_parent(db, req.parent_id, Some(id)).await?;

    sqlx::query(
        "UPDATE categories SET name = COALESCE(?, name), slug = COALESCE(?, slug), parent_id = COALESCE(?, parent_id) WHERE id = ?",
    )
    .bind(req.name.as_deref().map(str::trim))
    .bind(&req.slug)
    .bind(req.parent_id)
    .bind(id)
    .execute(db)
    .await?;

    get(db, id).await
}

/// Delete a category. Subcategories become top-level; a category that still
/// holds products is refused by the foreign key.
pub async fn delete(db: &SqlitePool, id: i64) -> Result<(), ApiError> {
    let result = sqlx::query("DELETE FROM categories WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Category not found"));
    }
    Ok(())
}

/// Every category with its direct children.
pub async fn list_all(db: &SqlitePool) -> Result<Vec<CategoryTree>, ApiError> {
    let categories = sqlx::query_as::<_, Category>("SELECT * FROM categories ORDER BY name ASC")
        .fetch_all(db)
        .await?;
    with_children(db, categories).await
}

/// Top-level categories with their children, for navigation.
pub async fn list_top_level(db: &SqlitePool) -> Result<Vec<CategoryTree>, ApiError> {
    let categories = sqlx::query_as::<_, Category>(
        "SELECT * FROM categories WHERE parent_id IS NULL ORDER BY name ASC",
    )
    .fetch_all(db)
    .await?;
    with_children(db, categories).await
}

pub async fn get_by_slug(db: &SqlitePool, slug: &str) -> Result<CategoryDetail, ApiError> {
    let category = sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE slug = ?")
        .bind(slug)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::not_found("Category not found"))?;

    let children = children_of(db, category.id).await?;
    let products = sqlx::query_as::<_, crate::db::Product>(
        "SELECT * FROM products WHERE category_id = ? ORDER BY created_at DESC",
    )
    .bind(category.id)
    .fetch_all(db)
    .await?;
    let products = load_details(db, products).await?;

    Ok(CategoryDetail {
        category,
        children,
        products,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support;
    use axum::http::StatusCode;

    fn request(name: &str, parent_id: Option<i64>) -> CreateCategoryRequest {
        CreateCategoryRequest {
            name: name.to_string(),
            slug: None,
            parent_id,
        }
    }

    #[tokio::test]
    async fn test_create_derives_slug_and_nests() {
        let db = test_support::pool().await;
        let men = create(&db, &request("Men", None)).await.unwrap();
        assert_eq!(men.slug, "men");
        let shirts = create(&db, &request("Casual Shirts", Some(men.id))).await.unwrap();
        assert_eq!(shirts.slug, "casual-shirts");

        let top = list_top_level(&db).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].children.len(), 1);
        assert_eq!(top[0].children[0].id, shirts.id);

        let all = list_all(&db).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_slug_conflicts() {
        let db = test_support::pool().await;
        create(&db, &request("Men", None)).await.unwrap();
        let err = create(&db, &request("men", None)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_slug_lookup_and_missing_parent() {
        let db = test_support::pool().await;
        let err = get_by_slug(&db, "nothing").await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err = create(&db, &request("Orphan", Some(999))).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let (_, _) = test_support::product(&db, "tee", 10.0, 3).await;
        let detail = get_by_slug(&db, "test").await.unwrap();
        assert_eq!(detail.products.len(), 1);
        assert_eq!(detail.products[0].variants.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_category_in_use_is_refused() {
        let db = test_support::pool().await;
        test_support::product(&db, "tee", 10.0, 3).await;
        let category = get_by_slug(&db, "test").await.unwrap().category;

        let err = delete(&db, category.id).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        let err = delete(&db, 4242).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
