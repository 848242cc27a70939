//! Admin dashboard aggregates.
//!
//! Sales figures only count orders in an active status (processing or
//! fulfilled). Date ranges are whole UTC days and half-open: `from` is the
//! start of its day and `to` is the start of the day after.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use sqlx::SqlitePool;

use crate::api::error::ApiError;
use crate::db::{
    format_timestamp, CategorySales, DailySales, LowStockVariant, OrderStatus, Overview,
    ReportRange, StatusCount, TopProduct, WeeklySignups,
};

use super::round2;

const DEFAULT_DAYS: i64 = 30;
const DEFAULT_WEEKS: i64 = 12;
const MAX_DAYS: i64 = 366;
const LOW_STOCK_LIMIT: i64 = 50;

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

fn parse_day(value: &str, field: &'static str) -> Result<NaiveDate, ApiError> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc).date_naive())
        .map_err(|_| ApiError::validation_field(field, "Expected YYYY-MM-DD or an RFC 3339 timestamp"))
}

/// Resolve optional bounds into `[startOfDay(from), startOfDay(to) + 1d)`.
/// A missing `to` is today; a missing `from` covers `fallback_days` days
/// ending at `to`.
pub fn resolve_range(
    from: Option<&str>,
    to: Option<&str>,
    fallback_days: i64,
    now: DateTime<Utc>,
) -> Result<(DateTime<Utc>, DateTime<Utc>), ApiError> {
    let end = match to {
        Some(to) => parse_day(to, "to")?,
        None => now.date_naive(),
    };
    let start = match from {
        Some(from) => parse_day(from, "from")?,
        None => end - Duration::days(fallback_days.max(1) - 1),
    };
    if start > end {
        return Err(ApiError::validation_field("from", "Must not be after 'to'"));
    }
    Ok((start_of_day(start), start_of_day(end) + Duration::days(1)))
}

fn range_strings(range: &(DateTime<Utc>, DateTime<Utc>)) -> (String, String) {
    (format_timestamp(range.0), format_timestamp(range.1))
}

/// `status IN (...)` over the active statuses. Values come from the enum.
fn active_filter(column: &str) -> String {
    let statuses: Vec<String> = OrderStatus::ACTIVE
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect();
    format!("{} IN ({})", column, statuses.join(", "))
}

fn iso_week_label(timestamp: &str) -> Option<String> {
    let dt = DateTime::parse_from_rfc3339(timestamp).ok()?;
    let week = dt.with_timezone(&Utc).iso_week();
    Some(format!("{}-W{:02}", week.year(), week.week()))
}

pub async fn overview(db: &SqlitePool, from: Option<&str>, to: Option<&str>) -> Result<Overview, ApiError> {
    let range = resolve_range(from, to, DEFAULT_DAYS, Utc::now())?;
    let (from, to) = range_strings(&range);
    let active = active_filter("status");

    let (orders_count, revenue, distinct_buyer_count): (i64, f64, i64) = sqlx::query_as(&format!(
        "SELECT COUNT(*), COALESCE(SUM(paid_amount), 0.0), COUNT(DISTINCT user_id) FROM orders \
         WHERE created_at >= ? AND created_at < ? AND {}",
        active
    ))
    .bind(&from)
    .bind(&to)
    .fetch_one(db)
    .await?;

    let items_sold: i64 = sqlx::query_scalar(&format!(
        "SELECT COALESCE(SUM(oi.quantity), 0) FROM order_items oi JOIN orders o ON o.id = oi.order_id \
         WHERE o.created_at >= ? AND o.created_at < ? AND {}",
        active_filter("o.status")
    ))
    .bind(&from)
    .bind(&to)
    .fetch_one(db)
    .await?;

    let new_users: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE created_at >= ? AND created_at < ?")
            .bind(&from)
            .bind(&to)
            .fetch_one(db)
            .await?;

    // Buyers in range whose lifetime active orders number two or more
    let repeat_buyers: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM ( \
            SELECT user_id FROM orders WHERE {active} AND user_id IN ( \
                SELECT DISTINCT user_id FROM orders WHERE created_at >= ? AND created_at < ? AND {active} \
            ) GROUP BY user_id HAVING COUNT(*) >= 2 \
         )",
        active = active
    ))
    .bind(&from)
    .bind(&to)
    .fetch_one(db)
    .await?;

    let aov = if orders_count > 0 {
        round2(revenue / orders_count as f64)
    } else {
        0.0
    };
    let repeat_rate = if distinct_buyer_count > 0 {
        repeat_buyers as f64 / distinct_buyer_count as f64
    } else {
        0.0
    };

    Ok(Overview {
        range: ReportRange { from, to },
        revenue: round2(revenue),
        orders_count,
        items_sold,
        aov,
        new_users,
        distinct_buyer_count,
        repeat_rate,
    })
}

/// Revenue per day for the last `days` days, including days without sales.
pub async fn sales_by_day(db: &SqlitePool, days: Option<i64>) -> Result<Vec<DailySales>, ApiError> {
    let days = days.unwrap_or(DEFAULT_DAYS).clamp(1, MAX_DAYS);
    let range = resolve_range(None, None, days, Utc::now())?;
    let (from, to) = range_strings(&range);

    let rows: Vec<(String, f64)> = sqlx::query_as(&format!(
        "SELECT substr(created_at, 1, 10) AS day, COALESCE(SUM(paid_amount), 0.0) FROM orders \
         WHERE created_at >= ? AND created_at < ? AND {} GROUP BY day",
        active_filter("status")
    ))
    .bind(&from)
    .bind(&to)
    .fetch_all(db)
    .await?;

    let mut buckets: BTreeMap<String, f64> = BTreeMap::new();
    let mut day = range.0;
    while day < range.1 {
        buckets.insert(day.format("%Y-%m-%d").to_string(), 0.0);
        day += Duration::days(1);
    }
    for (date, revenue) in rows {
        if let Some(total) = buckets.get_mut(&date) {
            *total = round2(*total + revenue);
        }
    }

    Ok(buckets
        .into_iter()
        .map(|(date, revenue)| DailySales { date, revenue })
        .collect())
}

pub async fn sales_by_category(
    db: &SqlitePool,
    from: Option<&str>,
    to: Option<&str>,
) -> Result<Vec<CategorySales>, ApiError> {
    let range = resolve_range(from, to, DEFAULT_DAYS, Utc::now())?;
    let (from, to) = range_strings(&range);

    let rows = sqlx::query_as::<_, CategorySales>(&format!(
        r#"
        SELECT p.category_id AS category_id,
               COALESCE(c.name, 'Unknown') AS category,
               COALESCE(SUM(oi.line_total), 0.0) AS revenue,
               COALESCE(SUM(oi.quantity), 0) AS qty
        FROM order_items oi
        JOIN orders o ON o.id = oi.order_id
        JOIN products p ON p.id = oi.product_id
        LEFT JOIN categories c ON c.id = p.category_id
        WHERE o.created_at >= ? AND o.created_at < ? AND {}
        GROUP BY p.category_id
        ORDER BY revenue DESC
        "#,
        active_filter("o.status")
    ))
    .bind(&from)
    .bind(&to)
    .fetch_all(db)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| CategorySales {
            revenue: round2(row.revenue),
            ..row
        })
        .collect())
}

pub async fn top_products(
    db: &SqlitePool,
    from: Option<&str>,
    to: Option<&str>,
    limit: Option<i64>,
) -> Result<Vec<TopProduct>, ApiError> {
    let limit = limit.filter(|n| *n > 0).unwrap_or(10).min(100);
    let range = resolve_range(from, to, DEFAULT_DAYS, Utc::now())?;
    let (from, to) = range_strings(&range);

    // Falls back to the name captured on the order line for deleted products
    let rows = sqlx::query_as::<_, TopProduct>(&format!(
        r#"
        SELECT oi.product_id AS product_id,
               COALESCE(p.name, MAX(oi.product_name)) AS product_name,
               COALESCE(SUM(oi.line_total), 0.0) AS revenue,
               COALESCE(SUM(oi.quantity), 0) AS qty
        FROM order_items oi
        JOIN orders o ON o.id = oi.order_id
        LEFT JOIN products p ON p.id = oi.product_id
        WHERE o.created_at >= ? AND o.created_at < ? AND {}
        GROUP BY oi.product_id
        ORDER BY revenue DESC
        LIMIT ?
        "#,
        active_filter("o.status")
    ))
    .bind(&from)
    .bind(&to)
    .bind(limit)
    .fetch_all(db)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| TopProduct {
            revenue: round2(row.revenue),
            ..row
        })
        .collect())
}

/// Order counts per status, cancelled orders included.
pub async fn order_status_breakdown(
    db: &SqlitePool,
    from: Option<&str>,
    to: Option<&str>,
) -> Result<Vec<StatusCount>, ApiError> {
    let range = resolve_range(from, to, DEFAULT_DAYS, Utc::now())?;
    let (from, to) = range_strings(&range);

    let rows = sqlx::query_as::<_, StatusCount>(
        "SELECT status, COUNT(*) AS count FROM orders WHERE created_at >= ? AND created_at < ? GROUP BY status ORDER BY status",
    )
    .bind(&from)
    .bind(&to)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Signups bucketed by ISO week. `days` is converted to whole weeks.
pub async fn new_users_by_week(db: &SqlitePool, days: Option<i64>) -> Result<Vec<WeeklySignups>, ApiError> {
    let weeks = days
        .map(|d| (d / 7).max(1))
        .unwrap_or(DEFAULT_WEEKS)
        .min(MAX_DAYS / 7 + 1);
    let range = resolve_range(None, None, weeks * 7, Utc::now())?;
    let (from, to) = range_strings(&range);

    let created: Vec<String> =
        sqlx::query_scalar("SELECT created_at FROM users WHERE created_at >= ? AND created_at < ?")
            .bind(&from)
            .bind(&to)
            .fetch_all(db)
            .await?;

    let mut buckets: BTreeMap<String, i64> = BTreeMap::new();
    for timestamp in &created {
        match iso_week_label(timestamp) {
            Some(week) => *buckets.entry(week).or_insert(0) += 1,
            None => tracing::warn!(created_at = %timestamp, "Skipping unparseable signup timestamp"),
        }
    }

    Ok(buckets
        .into_iter()
        .map(|(week, count)| WeeklySignups { week, count })
        .collect())
}

pub async fn low_stock(db: &SqlitePool, threshold: Option<i64>) -> Result<Vec<LowStockVariant>, ApiError> {
    let threshold = threshold.unwrap_or(5).max(0);
    let rows = sqlx::query_as::<_, LowStockVariant>(
        r#"
        SELECT v.id AS variant_id, v.product_id, p.name AS product_name, v.size, v.color, v.quantity, v.price
        FROM product_variants v
        JOIN products p ON p.id = v.product_id
        WHERE v.quantity <= ?
        ORDER BY v.quantity ASC, v.id ASC
        LIMIT ?
        "#,
    )
    .bind(threshold)
    .bind(LOW_STOCK_LIMIT)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{AddToCartRequest, AddressType, CreateAddressRequest, PlaceOrderRequest, Role};
    use crate::services::{addresses, cart, orders, test_support};
    use axum::http::StatusCode;

    fn at(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).unwrap().with_timezone(&Utc)
    }

    async fn buy(db: &SqlitePool, user: &str, product: i64, variant: i64, quantity: i64) -> String {
        let address = addresses::create(
            db,
            user,
            &CreateAddressRequest {
                address_type: AddressType::Shipping,
                line1: "1 Main St".to_string(),
                line2: None,
                city: "Kumasi".to_string(),
                state: None,
                postal_code: None,
                country: "GH".to_string(),
                phone: None,
                is_default: false,
            },
        )
        .await
        .unwrap();
        cart::add(
            db,
            user,
            &AddToCartRequest {
                product_id: product,
                variant_id: variant,
                quantity: Some(quantity),
            },
        )
        .await
        .unwrap();
        orders::place(
            db,
            user,
            &PlaceOrderRequest {
                address_id: address.id,
                payment_ref: None,
                shipping_fee: None,
                discount: None,
            },
        )
        .await
        .unwrap()
        .order
        .id
    }

    #[test]
    fn test_resolve_range_defaults_and_bounds() {
        let now = at("2026-03-15T17:45:00Z");

        let (from, to) = resolve_range(None, None, 30, now).unwrap();
        assert_eq!(from, at("2026-02-14T00:00:00Z"));
        assert_eq!(to, at("2026-03-16T00:00:00Z"));

        let (from, to) = resolve_range(Some("2026-01-01"), Some("2026-01-31T10:00:00Z"), 30, now).unwrap();
        assert_eq!(from, at("2026-01-01T00:00:00Z"));
        assert_eq!(to, at("2026-02-01T00:00:00Z"));

        let err = resolve_range(Some("yesterday"), None, 30, now).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(resolve_range(Some("2026-02-01"), Some("2026-01-01"), 30, now).is_err());
    }

    #[test]
    fn test_iso_week_label() {
        assert_eq!(iso_week_label("2026-01-01T08:00:00.000Z").as_deref(), Some("2026-W01"));
        // Belongs to the last ISO week of the previous year
        assert_eq!(iso_week_label("2027-01-01T08:00:00.000Z").as_deref(), Some("2026-W53"));
        assert_eq!(iso_week_label("garbage"), None);
    }

    #[tokio::test]
    async fn test_overview_counts_active_orders() {
        let db = test_support::pool().await;
        let jane = test_support::user(&db, "jane@example.com", Role::Customer).await;
        let john = test_support::user(&db, "john@example.com", Role::Customer).await;
        let (product, variant) = test_support::product(&db, "tee", 10.0, 100).await;

        buy(&db, &jane, product, variant, 2).await;
        buy(&db, &jane, product, variant, 1).await;
        let cancelled = buy(&db, &john, product, variant, 4).await;
        orders::update_status(&db, &cancelled, OrderStatus::Cancelled).await.unwrap();

        let report = overview(&db, None, None).await.unwrap();
        assert_eq!(report.orders_count, 2);
        assert_eq!(report.revenue, 30.0);
        assert_eq!(report.items_sold, 3);
        assert_eq!(report.aov, 15.0);
        assert_eq!(report.new_users, 2);
        assert_eq!(report.distinct_buyer_count, 1);
        assert_eq!(report.repeat_rate, 1.0);

        let breakdown = order_status_breakdown(&db, None, None).await.unwrap();
        let cancelled_count = breakdown
            .iter()
            .find(|row| row.status == OrderStatus::Cancelled)
            .map(|row| row.count);
        assert_eq!(cancelled_count, Some(1));
    }

    #[tokio::test]
    async fn test_sales_series_and_rankings() {
        let db = test_support::pool().await;
        let jane = test_support::user(&db, "jane@example.com", Role::Customer).await;
        let (tee, tee_variant) = test_support::product(&db, "tee", 10.0, 100).await;
        let (polo, polo_variant) = test_support::product(&db, "polo", 25.0, 100).await;

        buy(&db, &jane, tee, tee_variant, 3).await;
        buy(&db, &jane, polo, polo_variant, 2).await;

        let days = sales_by_day(&db, Some(7)).await.unwrap();
        assert_eq!(days.len(), 7);
        let today = Utc::now().format("%Y-%m-%d").to_string();
        assert_eq!(days.last().unwrap().date, today);
        assert_eq!(days.last().unwrap().revenue, 80.0);
        assert!(days[..6].iter().all(|d| d.revenue == 0.0));

        let top = top_products(&db, None, None, Some(1)).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].product_id, polo);
        assert_eq!(top[0].revenue, 50.0);
        assert_eq!(top[0].qty, 2);

        let categories = sales_by_category(&db, None, None).await.unwrap();
        assert_eq!(categories.len(), 1);
        assert_eq!(categories[0].category, "Test");
        assert_eq!(categories[0].revenue, 80.0);
        assert_eq!(categories[0].qty, 5);
    }

    #[tokio::test]
    async fn test_new_users_and_low_stock() {
        let db = test_support::pool().await;
        test_support::user(&db, "a@example.com", Role::Customer).await;
        test_support::user(&db, "b@example.com", Role::Customer).await;

        let weeks = new_users_by_week(&db, Some(14)).await.unwrap();
        assert_eq!(weeks.iter().map(|w| w.count).sum::<i64>(), 2);
        assert!(weeks.iter().all(|w| w.week.contains("-W")));

        test_support::product(&db, "scarce", 9.0, 1).await;
        test_support::product(&db, "empty", 9.0, 0).await;
        test_support::product(&db, "plenty", 9.0, 40).await;
        let low = low_stock(&db, Some(5)).await.unwrap();
        assert_eq!(low.len(), 2);
        assert_eq!(low[0].quantity, 0);
        assert_eq!(low[1].product_name, "Product scarce");
    }
}
