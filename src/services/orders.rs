//! Checkout and order management.
//!
//! Placing an order reads the cart, checks stock, snapshots the address,
//! writes the order, decrements stock and empties the cart in a single
//! transaction. Any failure leaves every table as it was.

use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::info;

use crate::api::error::ApiError;
use crate::db::{
    begin_write, now_timestamp, page_window, Address, AddressSnapshot, AdminOrderQuery, Order, OrderDetail,
    OrderItem, OrderStatus, Paginated, PaymentMethod, PlaceOrderRequest,
};

use super::round2;

/// Cart line joined with the current variant and product.
#[derive(Debug, FromRow)]
struct CheckoutLine {
    product_id: i64,
    product_name: String,
    variant_id: i64,
    size: String,
    color: String,
    price: f64,
    stock: i64,
    quantity: i64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderTotals {
    pub items_total: f64,
    pub shipping_fee: f64,
    pub discount: f64,
    pub total_amount: f64,
}

/// Every amount is rounded to cents once: `items_total` over the raw line
/// sum, then `total_amount = items_total + shipping_fee - discount`, never
/// below zero. The stored parts always add up to the stored total.
pub fn compute_totals(lines: &[(f64, i64)], shipping_fee: f64, discount: f64) -> OrderTotals {
    let items_total = round2(
        lines
            .iter()
            .map(|(unit_price, quantity)| unit_price * *quantity as f64)
            .sum(),
    );
    let shipping_fee = round2(shipping_fee);
    let discount = round2(discount);
    let total_amount = round2((items_total + shipping_fee - discount).max(0.0));
    OrderTotals {
        items_total,
        shipping_fee,
        discount,
        total_amount,
    }
}

async fn load_detail(conn: &mut SqliteConnection, order: Order) -> Result<OrderDetail, ApiError> {
    let items = sqlx::query_as::<_, OrderItem>(
        "SELECT * FROM order_items WHERE order_id = ? ORDER BY id ASC",
    )
    .bind(&order.id)
    .fetch_all(&mut *conn)
    .await?;
    let address_snapshot = sqlx::query_as::<_, AddressSnapshot>(
        "SELECT * FROM address_snapshots WHERE id = ?",
    )
    .bind(&order.address_snapshot_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(OrderDetail {
        order,
        items,
        address_snapshot,
    })
}

async fn load_details(db: &SqlitePool, orders: Vec<Order>) -> Result<Vec<OrderDetail>, ApiError> {
    let mut conn = db.acquire().await?;
    let mut details = Vec::with_capacity(orders.len());
    for order in orders {
        details.push(load_detail(&mut conn, order).await?);
    }
    Ok(details)
}

async fn find(conn: &mut SqliteConnection, id: &str) -> Result<Order, ApiError> {
    sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| ApiError::not_found("Order not found"))
}

pub async fn place(
    db: &SqlitePool,
    user_id: &str,
    req: &PlaceOrderRequest,
) -> Result<OrderDetail, ApiError> {
    let shipping_fee = req.shipping_fee.unwrap_or(0.0);
    let discount = req.discount.unwrap_or(0.0);

    let mut tx = begin_write(db).await?;

    let lines = sqlx::query_as::<_, CheckoutLine>(
        r#"
        SELECT p.id AS product_id, p.name AS product_name, v.id AS variant_id,
               v.size, v.color, v.price, v.quantity AS stock, ci.quantity
        FROM carts c
        JOIN cart_items ci ON ci.cart_id = c.id
        JOIN product_variants v ON v.id = ci.variant_id
        JOIN products p ON p.id = ci.product_id
        WHERE c.user_id = ?
        ORDER BY ci.id ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(&mut *tx)
    .await?;
    if lines.is_empty() {
        return Err(ApiError::bad_request("Cart is empty"));
    }

    let address = sqlx::query_as::<_, Address>("SELECT * FROM addresses WHERE id = ? AND user_id = ?")
        .bind(&req.address_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::not_found("Address not found"))?;

    for line in &lines {
        if line.quantity > line.stock {
            return Err(ApiError::bad_request(format!(
                "Insufficient stock for {} ({}/{})",
                line.product_name, line.color, line.size
            )));
        }
    }

    let priced: Vec<(f64, i64)> = lines.iter().map(|l| (l.price, l.quantity)).collect();
    let totals = compute_totals(&priced, shipping_fee, discount);
    let now = now_timestamp();

    let snapshot_id = uuid::Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO address_snapshots (id, user_id, original_address_id, line1, line2, city, state, postal_code, country, phone)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&snapshot_id)
    .bind(user_id)
    .bind(&address.id)
    .bind(&address.line1)
    .bind(&address.line2)
    .bind(&address.city)
    .bind(&address.state)
    .bind(&address.postal_code)
    .bind(&address.country)
    .bind(&address.phone)
    .execute(&mut *tx)
    .await?;

    let order_id = uuid::Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO orders (id, user_id, address_snapshot_id, status, items_total, shipping_fee, discount,
                            total_amount, paid_amount, paid_at, payment_method, payment_ref, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&order_id)
    .bind(user_id)
    .bind(&snapshot_id)
    .bind(OrderStatus::Processing)
    .bind(totals.items_total)
    .bind(totals.shipping_fee)
    .bind(totals.discount)
    .bind(totals.total_amount)
    .bind(totals.total_amount)
    .bind(&now)
    .bind(PaymentMethod::Card)
    .bind(&req.payment_ref)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    for line in &lines {
        sqlx::query(
            r#"
            INSERT INTO order_items (order_id, product_id, variant_id, product_name, variant_size, variant_color,
                                     unit_price, quantity, line_total)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&order_id)
        .bind(line.product_id)
        .bind(line.variant_id)
        .bind(&line.product_name)
        .bind(&line.size)
        .bind(&line.color)
        .bind(line.price)
        .bind(line.quantity)
        .bind(round2(line.price * line.quantity as f64))
        .execute(&mut *tx)
        .await?;

        let decremented = sqlx::query(
            "UPDATE product_variants SET quantity = quantity - ? WHERE id = ? AND quantity >= ?",
        )
        .bind(line.quantity)
        .bind(line.variant_id)
        .bind(line.quantity)
        .execute(&mut *tx)
        .await?;
        if decremented.rows_affected() != 1 {
            return Err(ApiError::conflict(format!(
                "Stock for {} ({}/{}) changed during checkout",
                line.product_name, line.color, line.size
            )));
        }
    }

    sqlx::query("DELETE FROM cart_items WHERE cart_id IN (SELECT id FROM carts WHERE user_id = ?)")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    let order = find(&mut tx, &order_id).await?;
    let detail = load_detail(&mut tx, order).await?;
    tx.commit().await?;

    info!(
        order_id = %order_id,
        user_id = %user_id,
        total = totals.total_amount,
        lines = lines.len(),
        "Order placed"
    );
    Ok(detail)
}

/// An order visible to the requester. Other users' orders read as missing.
pub async fn get_for_user(
    db: &SqlitePool,
    requester_id: &str,
    is_admin: bool,
    id: &str,
) -> Result<OrderDetail, ApiError> {
    let mut conn = db.acquire().await?;
    let order = find(&mut conn, id).await?;
    if !is_admin && order.user_id != requester_id {
        return Err(ApiError::not_found("Order not found"));
    }
    load_detail(&mut conn, order).await
}

pub async fn get(db: &SqlitePool, id: &str) -> Result<OrderDetail, ApiError> {
    let mut conn = db.acquire().await?;
    let order = find(&mut conn, id).await?;
    load_detail(&mut conn, order).await
}

pub async fn list_mine(db: &SqlitePool, user_id: &str) -> Result<Vec<OrderDetail>, ApiError> {
    let orders = sqlx::query_as::<_, Order>(
        "SELECT * FROM orders WHERE user_id = ? ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;
    load_details(db, orders).await
}

pub async fn admin_list(
    db: &SqlitePool,
    query: &AdminOrderQuery,
) -> Result<Paginated<OrderDetail>, ApiError> {
    let (page, page_size, offset) = page_window(query.page, query.page_size, 20);

    let mut conditions = Vec::new();
    let mut bindings: Vec<String> = Vec::new();

    if let Some(status) = query.status {
        conditions.push("status = ?");
        bindings.push(status.as_str().to_string());
    }
    if let Some(user_id) = &query.user_id {
        conditions.push("user_id = ?");
        bindings.push(user_id.clone());
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(*) FROM orders {}", where_clause);
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for binding in &bindings {
        count_query = count_query.bind(binding);
    }
    let total = count_query.fetch_one(db).await?;

    let sql = format!(
        "SELECT * FROM orders {} ORDER BY created_at DESC LIMIT ? OFFSET ?",
        where_clause
    );
    let mut list_query = sqlx::query_as::<_, Order>(&sql);
    for binding in &bindings {
        list_query = list_query.bind(binding);
    }
    let orders = list_query.bind(page_size).bind(offset).fetch_all(db).await?;

    Ok(Paginated {
        items: load_details(db, orders).await?,
        total,
        page,
        page_size,
    })
}

/// Move an order to a new status. Cancelling puts every line back in stock;
/// a cancelled order is final.
pub async fn update_status(
    db: &SqlitePool,
    id: &str,
    status: OrderStatus,
) -> Result<OrderDetail, ApiError> {
    let mut tx = begin_write(db).await?;
    let order = find(&mut tx, id).await?;

    if order.status == status {
        return load_detail(&mut tx, order).await;
    }
    if order.status == OrderStatus::Cancelled {
        return Err(ApiError::conflict("Cancelled orders cannot change status"));
    }

    if status == OrderStatus::Cancelled {
        let items = sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = ?")
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;
        for item in &items {
            sqlx::query("UPDATE product_variants SET quantity = quantity + ? WHERE id = ?")
                .bind(item.quantity)
                .bind(item.variant_id)
                .execute(&mut *tx)
                .await?;
        }
    }

    sqlx::query("UPDATE orders SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status)
        .bind(now_timestamp())
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let order = find(&mut tx, id).await?;
    let detail = load_detail(&mut tx, order).await?;
    tx.commit().await?;

    info!(order_id = %id, status = %status, "Order status changed");
    Ok(detail)
}
