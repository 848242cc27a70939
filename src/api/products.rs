//! Catalog endpoints: products (public and admin) and their variants.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{
    validate_amount, validate_http_url, validate_length, validate_optional_length, validate_price,
    validate_slug, validate_stock,
};
use crate::db::{
    CreateProductRequest, CreateVariantRequest, NewVariant, ProductDetail, ProductFilter,
    SuccessResponse, UpdateProductRequest, UpdateVariantRequest, VariantWithImages,
};
use crate::services::{products, variants};
use crate::AppState;

fn check_images(errors: &mut ValidationErrorBuilder, field: &str, images: &[String]) {
    for url in images {
        errors.check(field, validate_http_url(&Some(url.clone())));
    }
}

fn check_new_variant(errors: &mut ValidationErrorBuilder, prefix: &str, variant: &NewVariant) {
    errors
        .check(&format!("{}size", prefix), validate_length(&variant.size, "Size", 1, 20))
        .check(&format!("{}color", prefix), validate_length(&variant.color, "Color", 1, 40))
        .check(&format!("{}price", prefix), validate_price(variant.price))
        .check(&format!("{}quantity", prefix), validate_stock(variant.quantity));
    check_images(errors, &format!("{}images", prefix), &variant.images);
}

/// GET /products
pub async fn list_products(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ProductDetail>>, ApiError> {
    Ok(Json(products::list_all(&state.db).await?))
}

/// GET /filteredProducts?category&size&color&minPrice&maxPrice
pub async fn filter_products(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<ProductFilter>,
) -> Result<Json<Vec<ProductDetail>>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("minPrice", validate_amount(filter.min_price, "Minimum price"))
        .check("maxPrice", validate_amount(filter.max_price, "Maximum price"));
    if let (Some(min), Some(max)) = (filter.min_price, filter.max_price) {
        if min > max {
            errors.add("minPrice", "Minimum price must not exceed maximum price");
        }
    }
    errors.finish()?;

    Ok(Json(products::filter(&state.db, &filter).await?))
}

/// GET /products/:slug
pub async fn get_by_slug(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<ProductDetail>, ApiError> {
    Ok(Json(products::get_by_slug(&state.db, &slug).await?))
}

/// POST /admin/products
pub async fn create_product(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductDetail>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("name", validate_length(&req.name, "Name", 2, 200))
        .check("description", validate_length(&req.description, "Description", 0, 5000))
        .check("slug", validate_slug(&req.slug));
    for (i, variant) in req.variants.iter().enumerate() {
        check_new_variant(&mut errors, &format!("variants[{}].", i), variant);
    }
    errors.finish()?;

    let product = products::create(&state.db, &req).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// GET /admin/products
pub async fn admin_list_products(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ProductDetail>>, ApiError> {
    Ok(Json(products::list_all(&state.db).await?))
}

/// PUT /admin/products/:id
pub async fn update_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateProductRequest>,
) -> Result<Json<ProductDetail>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("name", validate_optional_length(&req.name, "Name", 2, 200))
        .check(
            "description",
            validate_optional_length(&req.description, "Description", 0, 5000),
        );
    if let Some(slug) = &req.slug {
        errors.check("slug", validate_slug(slug));
    }
    errors.finish()?;

    Ok(Json(products::update(&state.db, id, &req).await?))
}

/// DELETE /admin/products/:id
pub async fn delete_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse>, ApiError> {
    products::delete(&state.db, id).await?;
    Ok(Json(SuccessResponse::ok()))
}

/// POST /admin/variants
pub async fn create_variant(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateVariantRequest>,
) -> Result<(StatusCode, Json<VariantWithImages>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    check_new_variant(&mut errors, "", &req.variant);
    errors.finish()?;

    let variant = variants::create(&state.db, &req).await?;
    Ok((StatusCode::CREATED, Json(variant)))
}

/// PUT /admin/products/:id/variants/:variantId
pub async fn update_variant(
    State(state): State<Arc<AppState>>,
    Path((product_id, variant_id)): Path<(i64, i64)>,
    Json(req): Json<UpdateVariantRequest>,
) -> Result<Json<VariantWithImages>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("size", validate_optional_length(&req.size, "Size", 1, 20))
        .check("color", validate_optional_length(&req.color, "Color", 1, 40));
    if let Some(price) = req.price {
        errors.check("price", validate_price(price));
    }
    if let Some(quantity) = req.quantity {
        errors.check("quantity", validate_stock(quantity));
    }
    if let Some(images) = &req.images {
        check_images(&mut errors, "images", images);
    }
    errors.finish()?;

    Ok(Json(
        variants::update(&state.db, product_id, variant_id, &req).await?,
    ))
}

/// DELETE /admin/variants/:id
pub async fn delete_variant(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse>, ApiError> {
    variants::delete(&state.db, id).await?;
    Ok(Json(SuccessResponse::ok()))
}
