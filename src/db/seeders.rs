//! Database seeders
//!
//! The bootstrap admin is reconciled on every startup when credentials are
//! configured. The demo catalog is only loaded on request (`seed-catalog`).

use anyhow::{anyhow, Result};
use sqlx::SqlitePool;
use tracing::info;

use crate::config::BootstrapConfig;
use crate::crypto;

/// Create or refresh the bootstrap admin account from configuration.
///
/// An existing account with the same email is promoted to ADMIN, reactivated
/// and given the configured password.
pub async fn ensure_admin_user(pool: &SqlitePool, config: &BootstrapConfig) -> Result<()> {
    let (email, password) = match (&config.admin_email, &config.admin_password) {
        (Some(email), Some(password)) if !email.trim().is_empty() && !password.is_empty() => {
            (email.trim().to_lowercase(), password)
        }
        _ => return Ok(()),
    };

    let password_hash = crypto::hash_password(password)
        .map_err(|e| anyhow!("Failed to hash bootstrap admin password: {}", e))?;

    let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(pool)
        .await?;

    match existing {
        Some((id,)) => {
            sqlx::query(
                "UPDATE users SET role = 'ADMIN', status = 'ACTIVE', password_hash = ?, updated_at = ? WHERE id = ?",
            )
            .bind(&password_hash)
            .bind(super::now_timestamp())
            .bind(&id)
            .execute(pool)
            .await?;
            info!(email = %email, "Bootstrap admin account refreshed");
        }
        None => {
            let id = uuid::Uuid::new_v4().to_string();
            sqlx::query(
                "INSERT INTO users (id, email, password_hash, name, role, status) VALUES (?, ?, ?, 'Super Admin', 'ADMIN', 'ACTIVE')",
            )
            .bind(&id)
            .bind(&email)
            .bind(&password_hash)
            .execute(pool)
            .await?;
            info!(email = %email, "Bootstrap admin account created");
        }
    }

    Ok(())
}

/// Load the demo catalog. Safe to run repeatedly.
pub async fn seed_catalog(pool: &SqlitePool) -> Result<()> {
    info!("Seeding demo catalog...");

    // (name, slug, parent slug)
    let categories: Vec<(&str, &str, Option<&str>)> = vec![
        ("Men", "men", None),
        ("Women", "women", None),
        ("Shirts", "shirts", Some("men")),
    ];

    for (name, slug, parent) in &categories {
        let parent_id: Option<i64> = match parent {
            Some(parent_slug) => {
                sqlx::query_scalar("SELECT id FROM categories WHERE slug = ?")
                    .bind(parent_slug)
                    .fetch_optional(pool)
                    .await?
            }
            None => None,
        };

        sqlx::query(
            "INSERT INTO categories (name, slug, parent_id) VALUES (?, ?, ?) ON CONFLICT(slug) DO NOTHING",
        )
        .bind(name)
        .bind(slug)
        .bind(parent_id)
        .execute(pool)
        .await?;
    }

    // (size, color, price, quantity, status, image urls)
    type VariantSeed = (&'static str, &'static str, f64, i64, &'static str, [&'static str; 2]);

    // (name, slug, description, category slug, variants)
    let products: Vec<(&str, &str, &str, &str, Vec<VariantSeed>)> = vec![
        (
            "Classic Cotton Shirt",
            "classic-cotton-shirt",
            "Comfortable cotton shirt for daily wear.",
            "shirts",
            vec![
                (
                    "M",
                    "Blue",
                    25.99,
                    50,
                    "IN_STOCK",
                    [
                        "https://example.com/images/shirt1-blue-front.jpg",
                        "https://example.com/images/shirt1-blue-back.jpg",
                    ],
                ),
                (
                    "L",
                    "Red",
                    27.99,
                    20,
                    "PRE_ORDER",
                    [
                        "https://example.com/images/shirt1-red-front.jpg",
                        "https://example.com/images/shirt1-red-back.jpg",
                    ],
                ),
            ],
        ),
        (
            "Slim Fit Formal Shirt",
            "slim-fit-formal-shirt",
            "Perfect for office and formal occasions.",
            "shirts",
            vec![(
                "M",
                "White",
                35.5,
                0,
                "OUT_OF_STOCK",
                [
                    "https://example.com/images/shirt2-white-front.jpg",
                    "https://example.com/images/shirt2-white-back.jpg",
                ],
            )],
        ),
    ];

    let mut created = 0;
    for (name, slug, description, category_slug, variants) in &products {
        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM products WHERE slug = ?")
            .bind(slug)
            .fetch_optional(pool)
            .await?;
        if exists.is_some() {
            continue;
        }

        let category_id: i64 = sqlx::query_scalar("SELECT id FROM categories WHERE slug = ?")
            .bind(category_slug)
            .fetch_one(pool)
            .await?;

        let mut tx = super::begin_write(pool).await?;

        let product_id: i64 = sqlx::query_scalar(
            "INSERT INTO products (name, slug, description, category_id) VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(name)
        .bind(slug)
        .bind(description)
        .bind(category_id)
        .fetch_one(&mut *tx)
        .await?;

        for (size, color, price, quantity, status, images) in variants {
            let variant_id: i64 = sqlx::query_scalar(
                "INSERT INTO product_variants (product_id, size, color, price, quantity, status) VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
            )
            .bind(product_id)
            .bind(size)
            .bind(color)
            .bind(price)
            .bind(quantity)
            .bind(status)
            .fetch_one(&mut *tx)
            .await?;

            for url in images {
                sqlx::query("INSERT INTO product_images (variant_id, url) VALUES (?, ?)")
                    .bind(variant_id)
                    .bind(url)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        created += 1;
    }

    info!("Demo catalog seeded ({} new products)", created);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_in_memory;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_seed_catalog_is_idempotent() {
        let pool = init_in_memory().await.unwrap();
        assert_ok!(seed_catalog(&pool).await);
        assert_ok!(seed_catalog(&pool).await);

        let categories: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM categories")
            .fetch_one(&pool)
            .await
            .unwrap();
        let products: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&pool)
            .await
            .unwrap();
        let variants: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM product_variants")
            .fetch_one(&pool)
            .await
            .unwrap();
        let images: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM product_images")
            .fetch_one(&pool)
            .await
            .unwrap();

        assert_eq!((categories, products, variants, images), (3, 2, 3, 6));

        let parent: Option<String> = sqlx::query_scalar(
            "SELECT p.slug FROM categories c JOIN categories p ON p.id = c.parent_id WHERE c.slug = 'shirts'",
        )
        .fetch_optional(&pool)
        .await
        .unwrap();
        assert_eq!(parent.as_deref(), Some("men"));
    }

    #[tokio::test]
    async fn test_ensure_admin_user_promotes_existing_account() {
        let pool = init_in_memory().await.unwrap();
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, role, status) VALUES ('u1', 'boss@shop.test', 'x', 'CUSTOMER', 'SUSPENDED')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let config = BootstrapConfig {
            admin_email: Some(" Boss@Shop.test ".to_string()),
            admin_password: Some("Sup3rSecret!".to_string()),
        };
        assert_ok!(ensure_admin_user(&pool, &config).await);

        let (role, status, hash): (String, String, String) =
            sqlx::query_as("SELECT role, status, password_hash FROM users WHERE id = 'u1'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(role, "ADMIN");
        assert_eq!(status, "ACTIVE");
        assert!(crypto::verify_password("Sup3rSecret!", &hash));
    }

    #[tokio::test]
    async fn test_ensure_admin_user_skips_without_credentials() {
        let pool = init_in_memory().await.unwrap();
        ensure_admin_user(&pool, &BootstrapConfig::default()).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
