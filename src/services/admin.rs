//! Account administration: listing, creating admins, role and status changes.

use sqlx::SqlitePool;
use tracing::info;

use crate::api::error::ApiError;
use crate::db::{
    begin_write, now_timestamp, page_window, AdminCreateUserRequest, AdminUserQuery, Paginated, Role, SortDir,
    User, UserResponse, UserSortBy, UserStatus,
};

use super::auth::{find_user_by_email, get_user, hash_or_internal, insert_user, revoke_user_tokens};

pub async fn list_users(
    db: &SqlitePool,
    query: &AdminUserQuery,
) -> Result<Paginated<UserResponse>, ApiError> {
    let (page, page_size, offset) = page_window(query.page, query.page_size, 20);

    let mut conditions = Vec::new();
    let mut bindings: Vec<String> = Vec::new();

    if let Some(q) = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        conditions.push("(email LIKE ? OR name LIKE ?)");
        let pattern = format!("%{}%", q);
        bindings.push(pattern.clone());
        bindings.push(pattern);
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(*) FROM users {}", where_clause);
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for binding in &bindings {
        count_query = count_query.bind(binding);
    }
    let total = count_query.fetch_one(db).await?;

    // Only whitelisted identifiers reach the ORDER BY clause
    let sort_by = query.sort_by.unwrap_or(UserSortBy::CreatedAt);
    let sort_dir = query.sort_dir.unwrap_or(SortDir::Desc);
    let sql = format!(
        "SELECT * FROM users {} ORDER BY {} {}, id ASC LIMIT ? OFFSET ?",
        where_clause,
        sort_by.column(),
        sort_dir.keyword()
    );
    let mut list_query = sqlx::query_as::<_, User>(&sql);
    for binding in &bindings {
        list_query = list_query.bind(binding);
    }
    let users = list_query.bind(page_size).bind(offset).fetch_all(db).await?;

    Ok(Paginated {
        items: users.into_iter().map(UserResponse::from).collect(),
        total,
        page,
        page_size,
    })
}

/// Create an account with the admin role. Input is already validated.
pub async fn create_admin(
    db: &SqlitePool,
    req: &AdminCreateUserRequest,
) -> Result<UserResponse, ApiError> {
    if find_user_by_email(db, &req.email).await?.is_some() {
        return Err(ApiError::conflict("Email is already registered"));
    }
    let password_hash = hash_or_internal(&req.password)?;
    let id = insert_user(db, &req.email, &password_hash, req.name.as_deref(), None, Role::Admin).await?;

    info!(user_id = %id, "Created admin account");
    Ok(get_user(db, &id).await?.into())
}

pub async fn set_role(db: &SqlitePool, id: &str, role: Role) -> Result<UserResponse, ApiError> {
    let result = sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
        .bind(role)
        .bind(now_timestamp())
        .bind(id)
        .execute(db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("User not found"));
    }
    info!(user_id = %id, role = %role, "Changed user role");
    Ok(get_user(db, id).await?.into())
}

/// Activate or suspend an account. Suspending also ends every session of
/// that user. Admins cannot suspend themselves.
pub async fn set_status(
    db: &SqlitePool,
    acting_admin_id: &str,
    id: &str,
    status: UserStatus,
) -> Result<UserResponse, ApiError> {
    if id == acting_admin_id && status == UserStatus::Suspended {
        return Err(ApiError::bad_request("You cannot suspend your own account"));
    }

    let mut tx = begin_write(db).await?;
    let result = sqlx::query("UPDATE users SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status)
        .bind(now_timestamp())
        .bind(id)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("User not found"));
    }
    let revoked = if status == UserStatus::Suspended {
        revoke_user_tokens(&mut *tx, id).await?
    } else {
        0
    };
    tx.commit().await?;

    info!(user_id = %id, status = %status, revoked, "Changed user status");
    Ok(get_user(db, id).await?.into())
}

/// Delete an account together with its tokens. Orders keep their rows.
pub async fn delete_user(db: &SqlitePool, acting_admin_id: &str, id: &str) -> Result<(), ApiError> {
    if id == acting_admin_id {
        return Err(ApiError::bad_request("You cannot delete your own account"));
    }

    let mut tx = begin_write(db).await?;
    sqlx::query("DELETE FROM refresh_tokens WHERE user_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM password_reset_tokens WHERE user_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("User not found"));
    }
    tx.commit().await?;

    info!(user_id = %id, "Deleted user");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use crate::db::LoginRequest;
    use crate::services::{auth, test_support, tokens::JwtKeys};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_list_users_search_sort_and_page() {
        let db = test_support::pool().await;
        for email in ["carol@example.com", "alice@example.com", "bob@shop.io"] {
            test_support::user(&db, email, Role::Customer).await;
        }

        let page = list_users(
            &db,
            &AdminUserQuery {
                sort_by: Some(UserSortBy::Email),
                sort_dir: Some(SortDir::Asc),
                page_size: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].email, "alice@example.com");
        assert_eq!(page.items[1].email, "bob@shop.io");

        let found = list_users(
            &db,
            &AdminUserQuery {
                q: Some("example".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(found.total, 2);
    }

    #[tokio::test]
    async fn test_create_admin_and_change_role() {
        let db = test_support::pool().await;
        let admin = create_admin(
            &db,
            &AdminCreateUserRequest {
                email: "ops@example.com".to_string(),
                password: "password123".to_string(),
                name: Some("Ops".to_string()),
            },
        )
        .await
        .unwrap();
        assert_eq!(admin.role, Role::Admin);

        let demoted = set_role(&db, &admin.id, Role::Customer).await.unwrap();
        assert_eq!(demoted.role, Role::Customer);
        let err = set_role(&db, "missing", Role::Admin).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_suspension_revokes_sessions() {
        let db = test_support::pool().await;
        let keys = JwtKeys::new(&AuthConfig::default());
        let admin = test_support::user(&db, "admin@example.com", Role::Admin).await;
        let customer = test_support::user(&db, "jane@example.com", Role::Customer).await;

        let session = auth::login(
            &db,
            &keys,
            &LoginRequest {
                email: "jane@example.com".to_string(),
                password: "password123".to_string(),
            },
        )
        .await
        .unwrap();

        let suspended = set_status(&db, &admin, &customer, UserStatus::Suspended).await.unwrap();
        assert_eq!(suspended.status, UserStatus::Suspended);

        let live: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM refresh_tokens WHERE user_id = ? AND revoked_at IS NULL",
        )
        .bind(&customer)
        .fetch_one(&db)
        .await
        .unwrap();
        assert_eq!(live, 0);
        assert!(auth::refresh(&db, &keys, &session.refresh_token).await.is_err());

        let err = set_status(&db, &admin, &admin, UserStatus::Suspended).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_user() {
        let db = test_support::pool().await;
        let admin = test_support::user(&db, "admin@example.com", Role::Admin).await;
        let customer = test_support::user(&db, "jane@example.com", Role::Customer).await;

        let err = delete_user(&db, &admin, &admin).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        delete_user(&db, &admin, &customer).await.unwrap();
        let err = delete_user(&db, &admin, &customer).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
