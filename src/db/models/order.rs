//! Orders, their line items and the address snapshot taken at checkout.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Processing,
    Fulfilled,
    Cancelled,
}

impl OrderStatus {
    /// Statuses that count as sales in reports.
    pub const ACTIVE: [OrderStatus; 2] = [OrderStatus::Processing, OrderStatus::Fulfilled];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Fulfilled => "FULFILLED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Card,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub address_snapshot_id: String,
    pub status: OrderStatus,
    pub items_total: f64,
    pub shipping_fee: f64,
    pub discount: f64,
    pub total_amount: f64,
    pub paid_amount: f64,
    pub paid_at: Option<String>,
    pub payment_method: PaymentMethod,
    pub payment_ref: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: i64,
    pub order_id: String,
    pub product_id: i64,
    pub variant_id: i64,
    pub product_name: String,
    pub variant_size: String,
    pub variant_color: String,
    pub unit_price: f64,
    pub quantity: i64,
    pub line_total: f64,
}

/// Immutable copy of an address made when the order was placed.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AddressSnapshot {
    pub id: String,
    pub user_id: String,
    pub original_address_id: Option<String>,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: String,
    pub phone: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub address_snapshot: AddressSnapshot,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    pub address_id: String,
    pub payment_ref: Option<String>,
    pub shipping_fee: Option<f64>,
    pub discount: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminOrderQuery {
    pub status: Option<OrderStatus>,
    pub user_id: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}
