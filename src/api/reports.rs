use axum::{
    extract::{Query, State},
    Json,
};
use std::sync::Arc;

use super::error::ApiError;
use crate::db::{
    CategorySales, DailySales, DateRangeQuery, DaysQuery, LowStockQuery, LowStockVariant,
    Overview, StatusCount, TopProduct, TopProductsQuery, WeeklySignups,
};
use crate::services::reports;
use crate::AppState;

/// GET /admin/reports/overview
pub async fn overview(
    State(state): State<Arc<AppState>>,
    Query(q): Query<DateRangeQuery>,
) -> Result<Json<Overview>, ApiError> {
    Ok(Json(
        reports::overview(&state.db, q.from.as_deref(), q.to.as_deref()).await?,
    ))
}

/// GET /admin/reports/sales-by-day
pub async fn sales_by_day(
    State(state): State<Arc<AppState>>,
    Query(q): Query<DaysQuery>,
) -> Result<Json<Vec<DailySales>>, ApiError> {
    Ok(Json(reports::sales_by_day(&state.db, q.days).await?))
}

/// GET /admin/reports/sales-by-category
pub async fn sales_by_category(
    State(state): State<Arc<AppState>>,
    Query(q): Query<DateRangeQuery>,
) -> Result<Json<Vec<CategorySales>>, ApiError> {
    Ok(Json(
        reports::sales_by_category(&state.db, q.from.as_deref(), q.to.as_deref()).await?,
    ))
}

/// GET /admin/reports/top-products
pub async fn top_products(
    State(state): State<Arc<AppState>>,
    Query(q): Query<TopProductsQuery>,
) -> Result<Json<Vec<TopProduct>>, ApiError> {
    Ok(Json(
        reports::top_products(&state.db, q.from.as_deref(), q.to.as_deref(), q.limit).await?,
    ))
}

/// GET /admin/reports/order-status-breakdown
pub async fn order_status_breakdown(
    State(state): State<Arc<AppState>>,
    Query(q): Query<DateRangeQuery>,
) -> Result<Json<Vec<StatusCount>>, ApiError> {
    Ok(Json(
        reports::order_status_breakdown(&state.db, q.from.as_deref(), q.to.as_deref()).await?,
    ))
}

/// GET /admin/reports/new-users-by-week
pub async fn new_users_by_week(
    State(state): State<Arc<AppState>>,
    Query(q): Query<DaysQuery>,
) -> Result<Json<Vec<WeeklySignups>>, ApiError> {
    Ok(Json(reports::new_users_by_week(&state.db, q.days).await?))
}

/// GET /admin/reports/low-stock
pub async fn low_stock(
    State(state): State<Arc<AppState>>,
    Query(q): Query<LowStockQuery>,
) -> Result<Json<Vec<LowStockVariant>>, ApiError> {
    Ok(Json(reports::low_stock(&state.db, q.threshold).await?))
}
