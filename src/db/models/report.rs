//! Admin dashboard report rows and their query parameters.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::OrderStatus;

#[derive(Debug, Default, Deserialize)]
pub struct DateRangeQuery {
    /// `YYYY-MM-DD` or RFC 3339
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DaysQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TopProductsQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LowStockQuery {
    pub threshold: Option<i64>,
}

/// Half-open `[from, to)` window in stored timestamp format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRange {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub range: ReportRange,
    pub revenue: f64,
    pub orders_count: i64,
    pub items_sold: i64,
    pub aov: f64,
    pub new_users: i64,
    pub distinct_buyer_count: i64,
    pub repeat_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailySales {
    pub date: String,
    pub revenue: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CategorySales {
    pub category_id: i64,
    pub category: String,
    pub revenue: f64,
    pub qty: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TopProduct {
    pub product_id: i64,
    pub product_name: String,
    pub revenue: f64,
    pub qty: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StatusCount {
    pub status: OrderStatus,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklySignups {
    /// ISO week label, `YYYY-Www`
    pub week: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LowStockVariant {
    pub variant_id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub size: String,
    pub color: String,
    pub quantity: i64,
    pub price: f64,
}
