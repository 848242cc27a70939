//! Catalog models: categories, products, variants and their images.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub parent_id: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryTree {
    #[serde(flatten)]
    pub category: Category,
    pub children: Vec<Category>,
}

/// Category page: subcategories plus the products filed directly under it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryDetail {
    #[serde(flatten)]
    pub category: Category,
    pub children: Vec<Category>,
    pub products: Vec<ProductDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCategoryRequest {
    pub name: String,
    pub slug: Option<String>,
    pub parent_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub parent_id: Option<i64>,
}

/// Availability shown on the storefront, independent of the stock count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockStatus {
    InStock,
    PreOrder,
    OutOfStock,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub slug: String,
    pub category_id: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProductVariant {
    pub id: i64,
    pub product_id: i64,
    pub size: String,
    pub color: String,
    pub price: f64,
    pub quantity: i64,
    pub status: StockStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProductImage {
    pub id: i64,
    pub variant_id: i64,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantWithImages {
    #[serde(flatten)]
    pub variant: ProductVariant,
    pub images: Vec<ProductImage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub category: Option<Category>,
    pub variants: Vec<VariantWithImages>,
}

/// Variant payload nested in product creation.
#[derive(Debug, Clone, Deserialize)]
pub struct NewVariant {
    pub size: String,
    pub color: String,
    pub price: f64,
    pub quantity: i64,
    pub status: Option<StockStatus>,
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub slug: String,
    pub category_id: i64,
    #[serde(default)]
    pub variants: Vec<NewVariant>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub slug: Option<String>,
    pub category_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVariantRequest {
    pub product_id: i64,
    #[serde(flatten)]
    pub variant: NewVariant,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateVariantRequest {
    pub size: Option<String>,
    pub color: Option<String>,
    pub price: Option<f64>,
    pub quantity: Option<i64>,
    pub status: Option<StockStatus>,
    /// Replaces every image of the variant when present
    pub images: Option<Vec<String>>,
}

/// Query string of `GET /filteredProducts`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductFilter {
    /// Category slug
    pub category: Option<String>,
    pub size: Option<String>,
    pub color: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}
