//! End-to-end checks through the full router against an in-memory database.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use storefront::api::create_router;
use storefront::config::Config;
use storefront::db::{self, DbPool};
use storefront::AppState;

async fn setup() -> (Router, DbPool) {
    let mut config = Config::default();
    config.rate_limit.enabled = false;
    setup_with(config).await
}

async fn setup_with(config: Config) -> (Router, DbPool) {
    let pool = db::init_in_memory().await.unwrap();
    let state = Arc::new(AppState::new(config, pool.clone()));
    (create_router(state), pool)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn register(app: &Router, email: &str) -> Value {
    let (status, body) = send(
        app,
        Method::POST,
        "/auth/register",
        None,
        Some(json!({ "email": email, "password": "Passw0rd!", "name": "Test Shopper" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body
}

#[tokio::test]
async fn health_reports_ok() {
    let (app, _) = setup().await;
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn checkout_places_order_and_reserves_stock() {
    let (app, pool) = setup().await;
    db::seed_catalog(&pool).await.unwrap();

    let auth = register(&app, "Shopper@Example.com").await;
    assert_eq!(auth["user"]["email"], "shopper@example.com");
    let token = auth["accessToken"].as_str().unwrap().to_string();

    let (product_id, variant_id): (i64, i64) = sqlx::query_as(
        "SELECT p.id, v.id FROM products p JOIN product_variants v ON v.product_id = p.id
         WHERE p.slug = 'classic-cotton-shirt' AND v.color = 'Blue'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();

    let (status, address) = send(
        &app,
        Method::POST,
        "/addresses",
        Some(&token),
        Some(json!({
            "type": "SHIPPING",
            "line1": "12 Market Street",
            "city": "Accra",
            "country": "GH",
            "isDefault": true
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", address);
    let address_id = address["id"].as_str().unwrap().to_string();

    let (status, cart) = send(
        &app,
        Method::POST,
        "/cart/add",
        Some(&token),
        Some(json!({ "productId": product_id, "variantId": variant_id, "quantity": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", cart);
    assert_eq!(cart["items"].as_array().unwrap().len(), 1);

    let (status, order) = send(
        &app,
        Method::POST,
        "/orders",
        Some(&token),
        Some(json!({ "addressId": address_id, "shippingFee": 5.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", order);
    assert_eq!(order["status"], "PROCESSING");
    assert_eq!(order["itemsTotal"].as_f64(), Some(51.98));
    assert_eq!(order["totalAmount"].as_f64(), Some(56.98));
    assert_eq!(order["items"].as_array().unwrap().len(), 1);
    assert_eq!(order["addressSnapshot"]["city"], "Accra");

    let remaining: i64 = sqlx::query_scalar("SELECT quantity FROM product_variants WHERE id = ?")
        .bind(variant_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(remaining, 48);

    let (status, cart) = send(&app, Method::GET, "/cart", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(cart["items"].as_array().unwrap().is_empty());

    // Ordering again with an empty cart is rejected
    let (status, _) = send(
        &app,
        Method::POST,
        "/orders",
        Some(&token),
        Some(json!({ "addressId": address_id })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Another customer cannot see the order
    let other = register(&app, "other@example.com").await;
    let other_token = other["accessToken"].as_str().unwrap();
    let order_uri = format!("/orders/{}", order["id"].as_str().unwrap());
    let (status, _) = send(&app, Method::GET, &order_uri, Some(other_token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn refresh_token_cannot_be_reused() {
    let (app, _) = setup().await;
    let auth = register(&app, "rotate@example.com").await;
    let first_token = auth["refreshToken"].as_str().unwrap().to_string();

    let (status, rotated) = send(
        &app,
        Method::POST,
        "/auth/refresh",
        None,
        Some(json!({ "refreshToken": first_token })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", rotated);
    assert_ne!(rotated["refreshToken"].as_str().unwrap(), first_token);

    let (status, _) = send(
        &app,
        Method::POST,
        "/auth/refresh",
        None,
        Some(json!({ "refreshToken": first_token })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_routes_require_admin_role() {
    let (app, _) = setup().await;

    let (status, _) = send(&app, Method::GET, "/admin/users", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let auth = register(&app, "customer@example.com").await;
    let token = auth["accessToken"].as_str().unwrap();
    let (status, _) = send(&app, Method::GET, "/admin/users", Some(token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, Method::GET, "/users/me", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn bootstrap_admin_can_read_reports() {
    let (app, pool) = setup().await;
    let bootstrap = storefront::config::BootstrapConfig {
        admin_email: Some("admin@example.com".to_string()),
        admin_password: Some("Adm1nPassw0rd".to_string()),
    };
    db::ensure_admin_user(&pool, &bootstrap).await.unwrap();

    let (status, auth) = send(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "email": "admin@example.com", "password": "Adm1nPassw0rd" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", auth);
    assert_eq!(auth["user"]["role"], "ADMIN");
    let token = auth["accessToken"].as_str().unwrap();

    let (status, overview) =
        send(&app, Method::GET, "/admin/reports/overview", Some(token), None).await;
    assert_eq!(status, StatusCode::OK, "{}", overview);

    let (status, days) = send(
        &app,
        Method::GET,
        "/admin/reports/sales-by-day?days=7",
        Some(token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(days.as_array().unwrap().len(), 7);
}

#[tokio::test]
async fn login_limit_ignores_spoofed_forwarded_for() {
    let mut config = Config::default();
    config.rate_limit.login_requests_per_window = 3;
    let (app, _) = setup_with(config).await;

    let mut statuses = Vec::new();
    for i in 0..6 {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/auth/login")
            .header("x-forwarded-for", format!("203.0.113.{}", i))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({ "email": "nobody@example.com", "password": "Passw0rd!" }).to_string(),
            ))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        statuses.push(response.status());
    }

    assert!(statuses[..3].iter().all(|s| *s == StatusCode::UNAUTHORIZED));
    assert!(statuses[3..].iter().all(|s| *s == StatusCode::TOO_MANY_REQUESTS));
}
