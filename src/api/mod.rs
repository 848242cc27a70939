mod addresses;
mod admin;
pub mod auth;
mod cart;
mod categories;
pub mod error;
mod orders;
mod products;
pub mod rate_limit;
mod reports;
mod users;
pub mod validation;

use axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    middleware,
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::CorsConfig;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Auth routes (public, login and register get their own rate tiers)
    let register_routes = Router::new()
        .route("/register", post(auth::register))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_register,
        ));
    let login_routes = Router::new()
        .route("/login", post(auth::login))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_login,
        ));
    let auth_routes = Router::new()
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .route("/logout-all", post(auth::logout_all))
        .route("/request-password-reset", post(auth::request_password_reset))
        .route("/reset-password", post(auth::reset_password))
        .merge(register_routes)
        .merge(login_routes);

    // Public catalog
    let catalog_routes = Router::new()
        .route("/categories", get(categories::list_top_level))
        .route("/categories/:slug", get(categories::get_by_slug))
        .route("/products", get(products::list_products))
        .route("/products/:slug", get(products::get_by_slug))
        .route("/filteredProducts", get(products::filter_products));

    // Signed-in customers
    let account_routes = Router::new()
        .route("/users/me", get(users::get_me).patch(users::update_me))
        .route("/profile", get(users::get_profile).patch(users::update_profile))
        // Addresses
        .route(
            "/addresses",
            get(addresses::list_addresses).post(addresses::create_address),
        )
        .route(
            "/addresses/:id",
            patch(addresses::update_address).delete(addresses::delete_address),
        )
        .route("/addresses/:id/default", patch(addresses::set_default_address))
        // Cart
        .route("/cart", get(cart::get_cart))
        .route("/cart/add", post(cart::add_to_cart))
        .route("/cart/update", patch(cart::update_cart_item))
        .route("/cart/remove", delete(cart::remove_cart_item))
        // Orders
        .route("/orders", post(orders::place_order).get(orders::list_my_orders))
        .route("/orders/:id", get(orders::get_order))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    // Admin namespace; require_auth runs first, then the role check
    let admin_routes = Router::new()
        // Users
        .route("/users", get(admin::list_users).post(admin::create_admin))
        .route("/users/:id", delete(admin::delete_user))
        .route("/users/:id/role", patch(admin::update_role))
        .route("/users/:id/status", patch(admin::update_status))
        .route("/addresses", get(addresses::admin_list_addresses))
        // Catalog
        .route(
            "/categories",
            get(categories::list_all).post(categories::create_category),
        )
        .route(
            "/categories/:id",
            put(categories::update_category).delete(categories::delete_category),
        )
        .route(
            "/products",
            get(products::admin_list_products).post(products::create_product),
        )
        .route(
            "/products/:id",
            put(products::update_product).delete(products::delete_product),
        )
        .route(
            "/products/:id/variants/:variant_id",
            put(products::update_variant),
        )
        .route("/variants", post(products::create_variant))
        .route("/variants/:id", delete(products::delete_variant))
        // Orders
        .route("/orders", get(orders::admin_list_orders))
        .route("/orders/:id", get(orders::admin_get_order))
        .route("/orders/:id/status", put(orders::update_order_status))
        // Reports
        .route("/reports/overview", get(reports::overview))
        .route("/reports/sales-by-day", get(reports::sales_by_day))
        .route("/reports/sales-by-category", get(reports::sales_by_category))
        .route("/reports/top-products", get(reports::top_products))
        .route(
            "/reports/order-status-breakdown",
            get(reports::order_status_breakdown),
        )
        .route("/reports/new-users-by-week", get(reports::new_users_by_week))
        .route("/reports/low-stock", get(reports::low_stock))
        .route_layer(middleware::from_fn(auth::require_admin))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    let cors = cors_layer(&state.config.cors);

    Router::new()
        .route("/health", get(health_check))
        .nest("/auth", auth_routes)
        .merge(catalog_routes)
        .merge(account_routes)
        .nest("/admin", admin_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    rate_limit::rate_limit_api,
                )),
        )
        .with_state(state)
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origin = if config.allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([
            HeaderName::from_static("x-ratelimit-limit"),
            HeaderName::from_static("x-ratelimit-remaining"),
            HeaderName::from_static("x-ratelimit-reset"),
            header::RETRY_AFTER,
        ])
}

async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(e) => {
            tracing::error!("Health check database query failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable" })),
            )
        }
    }
}
