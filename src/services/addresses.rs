//! Saved addresses with at most one default per (user, type).
//!
//! Every write that can produce a default first clears the other defaults of
//! the same type inside the same transaction. The partial unique index on
//! `(user_id, type) WHERE is_default = 1` backs this up at the schema level.

use sqlx::{SqliteConnection, SqlitePool};

use crate::api::error::ApiError;
use crate::db::{
    begin_write, now_timestamp, Address, AddressType, CreateAddressRequest, UpdateAddressRequest,
};

async fn clear_defaults(
    conn: &mut SqliteConnection,
    user_id: &str,
    address_type: AddressType,
    except_id: &str,
) -> Result<(), ApiError> {
    sqlx::query(
        "UPDATE addresses SET is_default = 0, updated_at = ? WHERE user_id = ? AND type = ? AND is_default = 1 AND id != ?",
    )
    .bind(now_timestamp())
    .bind(user_id)
    .bind(address_type)
    .bind(except_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Load an address the caller owns: 404 when missing, 403 when foreign.
async fn load_owned(
    conn: &mut SqliteConnection,
    user_id: &str,
    id: &str,
) -> Result<Address, ApiError> {
    let address = sqlx::query_as::<_, Address>("SELECT * FROM addresses WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| ApiError::not_found("Address not found"))?;
    if address.user_id != user_id {
        return Err(ApiError::forbidden("Address belongs to another user"));
    }
    Ok(address)
}

async fn fetch(conn: &mut SqliteConnection, id: &str) -> Result<Address, ApiError> {
    let address = sqlx::query_as::<_, Address>("SELECT * FROM addresses WHERE id = ?")
        .bind(id)
        .fetch_one(conn)
        .await?;
    Ok(address)
}

pub async fn list_mine(db: &SqlitePool, user_id: &str) -> Result<Vec<Address>, ApiError> {
    let addresses = sqlx::query_as::<_, Address>(
        "SELECT * FROM addresses WHERE user_id = ? ORDER BY type ASC, is_default DESC, created_at DESC",
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(addresses)
}

pub async fn create(
    db: &SqlitePool,
    user_id: &str,
    req: &CreateAddressRequest,
) -> Result<Address, ApiError> {
    let id = uuid::Uuid::new_v4().to_string();
    let mut tx = begin_write(db).await?;

    if req.is_default {
        clear_defaults(&mut tx, user_id, req.address_type, &id).await?;
    }

    sqlx::query(
        r#"
        INSERT INTO addresses (id, user_id, type, line1, line2, city, state, postal_code, country, phone, is_default)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(user_id)
    .bind(req.address_type)
    .bind(req.line1.trim())
    .bind(&req.line2)
    .bind(req.city.trim())
    .bind(&req.state)
    .bind(&req.postal_code)
    .bind(req.country.trim().to_uppercase())
    .bind(&req.phone)
    .bind(req.is_default)
    .execute(&mut *tx)
    .await?;

    let address = fetch(&mut tx, &id).await?;
    tx.commit().await?;
    Ok(address)
}

pub async fn update(
    db: &SqlitePool,
    user_id: &str,
    id: &str,
    req: &UpdateAddressRequest,
) -> Result<Address, ApiError> {
    let mut tx = begin_write(db).await?;
    let current = load_owned(&mut tx, user_id, id).await?;

    let address_type = req.address_type.unwrap_or(current.address_type);
    let is_default = req.is_default.unwrap_or(current.is_default);

    // Also covers a default moving to the other type
    if is_default {
        clear_defaults(&mut tx, user_id, address_type, id).await?;
    }

    sqlx::query(
        r#"
        UPDATE addresses SET
            type = ?,
            line1 = COALESCE(?, line1),
            line2 = COALESCE(?, line2),
            city = COALESCE(?, city),
            state = COALESCE(?, state),
            postal_code = COALESCE(?, postal_code),
            country = COALESCE(?, country),
            phone = COALESCE(?, phone),
            is_default = ?,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(address_type)
    .bind(req.line1.as_deref().map(str::trim))
    .bind(&req.line2)
    .bind(req.city.as_deref().map(str::trim))
    .bind(&req.state)
    .bind(&req.postal_code)
    .bind(req.country.as_deref().map(|c| c.trim().to_uppercase()))
    .bind(&req.phone)
    .bind(is_default)
    .bind(now_timestamp())
    .bind(id)
    .execute(&mut *tx)
    .await?;

    let address = fetch(&mut tx, id).await?;
    tx.commit().await?;
    Ok(address)
}

pub async fn delete(db: &SqlitePool, user_id: &str, id: &str) -> Result<(), ApiError> {
    let mut tx = begin_write(db).await?;
    load_owned(&mut tx, user_id, id).await?;
    sqlx::query("DELETE FROM addresses WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

pub async fn set_default(db: &SqlitePool, user_id: &str, id: &str) -> Result<Address, ApiError> {
    let mut tx = begin_write(db).await?;
    let current = load_owned(&mut tx, user_id, id).await?;

    clear_defaults(&mut tx, user_id, current.address_type, id).await?;
    sqlx::query("UPDATE addresses SET is_default = 1, updated_at = ? WHERE id = ?")
        .bind(now_timestamp())
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let address = fetch(&mut tx, id).await?;
    tx.commit().await?;
    Ok(address)
}

/// All addresses, or one user's, newest first.
pub async fn admin_list(db: &SqlitePool, user_id: Option<&str>) -> Result<Vec<Address>, ApiError> {
    let addresses = match user_id {
        Some(user_id) => {
            sqlx::query_as::<_, Address>(
                "SELECT * FROM addresses WHERE user_id = ? ORDER BY created_at DESC",
            )
            .bind(user_id)
            .fetch_all(db)
            .await?
        }
        None => {
            sqlx::query_as::<_, Address>("SELECT * FROM addresses ORDER BY created_at DESC")
                .fetch_all(db)
                .await?
        }
    };
    Ok(addresses)
}
