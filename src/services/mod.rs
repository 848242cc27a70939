//! Business operations behind the HTTP handlers.
//!
//! Each module owns one resource. Functions take the pool (plus whatever
//! keys they need), run their queries, wrap multi-step writes in a single
//! transaction and return plain serializable structs or `ApiError`.

pub mod addresses;
pub mod admin;
pub mod auth;
pub mod cart;
pub mod categories;
pub mod orders;
pub mod products;
pub mod profiles;
pub mod reports;
pub mod tokens;
pub mod users;
pub mod variants;

/// Round a money amount to cents.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
