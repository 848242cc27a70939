mod models;
mod seeders;

pub use models::*;
pub use seeders::{ensure_admin_user, seed_catalog};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    Sqlite, SqlitePool, Transaction,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseConfig;

pub type DbPool = SqlitePool;

/// Timestamps are stored as fixed-width UTC strings so that string order is
/// time order. Matches `strftime('%Y-%m-%dT%H:%M:%fZ', 'now')` in the schema.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Start a transaction that holds the write lock from its first statement.
/// Concurrent callers wait on `busy_timeout`. Every multi-step write uses
/// this instead of `pool.begin()`.
pub async fn begin_write(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
    pool.begin_with("BEGIN IMMEDIATE").await
}

/// Execute a SQL migration file, properly handling comments
async fn execute_sql(pool: &SqlitePool, sql: &str) -> Result<()> {
    for statement in sql.split(';') {
        // Strip SQL comment lines (lines starting with --)
        let cleaned: String = statement
            .lines()
            .filter(|line| !line.trim().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n");
        let trimmed = cleaned.trim();
        if !trimmed.is_empty() {
            sqlx::query(trimmed).execute(pool).await?;
        }
    }
    Ok(())
}

pub async fn init(config: &DatabaseConfig) -> Result<DbPool> {
    let in_memory = config.path.as_os_str() == ":memory:";
    let db_url = if in_memory {
        "sqlite::memory:".to_string()
    } else {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory {}", parent.display())
                })?;
            }
        }
        format!("sqlite:{}", config.path.display())
    };

    info!("Initializing database at {}", config.path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));
    let options = if in_memory {
        options
    } else {
        options
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
    };

    // Every in-memory connection is its own database
    let max_connections = if in_memory { 1 } else { config.max_connections };

    let pool_options = SqlitePoolOptions::new().max_connections(max_connections);
    // Closing the only in-memory connection would drop the database with it
    let pool_options = if in_memory {
        pool_options.idle_timeout(None).max_lifetime(None)
    } else {
        pool_options
    };
    let pool = pool_options.connect_with(options).await?;

    run_migrations(&pool).await?;

    info!("Database initialized successfully");
    Ok(pool)
}

/// Fresh migrated in-memory database.
pub async fn init_in_memory() -> Result<DbPool> {
    init(&DatabaseConfig {
        path: ":memory:".into(),
        max_connections: 1,
    })
    .await
}

async fn table_exists(pool: &SqlitePool, name: &str) -> Result<bool> {
    let found: Option<(String,)> =
        sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' AND name = ?")
            .bind(name)
            .fetch_optional(pool)
            .await?;
    Ok(found.is_some())
}

async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Running database migrations...");

    // Migration 001: users, profiles, addresses, tokens
    if !table_exists(pool, "password_reset_tokens").await? {
        execute_sql(pool, include_str!("../../migrations/001_users.sql")).await?;
    }

    // Migration 002: catalog
    if !table_exists(pool, "product_images").await? {
        execute_sql(pool, include_str!("../../migrations/002_catalog.sql")).await?;
    }

    // Migration 003: carts and orders
    if !table_exists(pool, "order_items").await? {
        execute_sql(pool, include_str!("../../migrations/003_orders.sql")).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = init_in_memory().await.unwrap();
        run_migrations(&pool).await.unwrap();

        for table in ["users", "addresses", "product_variants", "orders", "refresh_tokens"] {
            assert!(table_exists(&pool, table).await.unwrap(), "missing {}", table);
        }
    }

    #[test]
    fn test_timestamps_sort_chronologically() {
        let early = Utc::now();
        let late = early + chrono::Duration::milliseconds(1500);
        let (a, b) = (format_timestamp(early), format_timestamp(late));
        assert_eq!(a.len(), b.len());
        assert!(a < b);
        assert!(a.ends_with('Z'));
    }
}
