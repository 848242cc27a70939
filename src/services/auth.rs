//! Registration, login, refresh-token rotation and password reset.

use chrono::{Duration, Utc};
use sqlx::{Sqlite, SqlitePool};
use tracing::{info, warn};

use crate::api::error::ApiError;
use crate::crypto::{generate_token, hash_password, hash_token, verify_password};
use crate::db::{
    begin_write, format_timestamp, now_timestamp, AuthResponse, LoginRequest, PasswordResetToken, RefreshToken,
    RegisterRequest, Role, User, UserResponse, UserStatus,
};

use super::tokens::{JwtKeys, TokenPair};

const INVALID_CREDENTIALS: &str = "Invalid email or password";

pub(crate) fn hash_or_internal(password: &str) -> Result<String, ApiError> {
    hash_password(password).map_err(|e| {
        tracing::error!("Password hashing failed: {}", e);
        ApiError::internal("Failed to hash password")
    })
}

pub async fn find_user_by_email(db: &SqlitePool, email: &str) -> Result<Option<User>, ApiError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(db)
        .await?;
    Ok(user)
}

pub async fn get_user(db: &SqlitePool, id: &str) -> Result<User, ApiError> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))
}

/// Insert a user row; a taken email surfaces as 409 through the unique index.
pub async fn insert_user<'e, E>(
    executor: E,
    email: &str,
    password_hash: &str,
    name: Option<&str>,
    phone: Option<&str>,
    role: Role,
) -> Result<String, ApiError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let id = uuid::Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO users (id, email, password_hash, name, phone, role, status) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(email)
    .bind(password_hash)
    .bind(name)
    .bind(phone)
    .bind(role)
    .bind(UserStatus::Active)
    .execute(executor)
    .await?;
    Ok(id)
}

async fn store_refresh_token<'e, E>(
    executor: E,
    user_id: &str,
    pair: &TokenPair,
) -> Result<String, ApiError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let id = uuid::Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at) VALUES (?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(user_id)
    .bind(hash_token(&pair.refresh_token))
    .bind(format_timestamp(pair.refresh_expires_at))
    .execute(executor)
    .await?;
    Ok(id)
}

/// Revoke every live refresh token of a user. Returns how many were revoked.
pub async fn revoke_user_tokens<'e, E>(executor: E, user_id: &str) -> Result<u64, ApiError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE refresh_tokens SET revoked_at = ? WHERE user_id = ? AND revoked_at IS NULL",
    )
    .bind(now_timestamp())
    .bind(user_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

async fn issue_session(
    db: &SqlitePool,
    keys: &JwtKeys,
    user: User,
) -> Result<AuthResponse, ApiError> {
    let pair = keys.issue_pair(&user)?;
    store_refresh_token(db, &user.id, &pair).await?;
    Ok(AuthResponse {
        user: UserResponse::from(user),
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
    })
}

/// Create a customer account and sign it in. Input is already validated.
pub async fn register(
    db: &SqlitePool,
    keys: &JwtKeys,
    req: &RegisterRequest,
) -> Result<AuthResponse, ApiError> {
    if find_user_by_email(db, &req.email).await?.is_some() {
        return Err(ApiError::conflict("Email is already registered"));
    }

    let password_hash = hash_or_internal(&req.password)?;
    let id = insert_user(
        db,
        &req.email,
        &password_hash,
        req.name.as_deref(),
        req.phone.as_deref(),
        Role::Customer,
    )
    .await?;

    let user = get_user(db, &id).await?;
    info!(user_id = %user.id, "Registered new customer");
    issue_session(db, keys, user).await
}

pub async fn login(
    db: &SqlitePool,
    keys: &JwtKeys,
    req: &LoginRequest,
) -> Result<AuthResponse, ApiError> {
    let user = find_user_by_email(db, &req.email)
        .await?
        .ok_or_else(|| ApiError::unauthorized(INVALID_CREDENTIALS))?;

    if !verify_password(&req.password, &user.password_hash) {
        warn!(user_id = %user.id, "Failed login attempt");
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
    }
    if !user.is_active() {
        return Err(ApiError::forbidden("Account is suspended"));
    }

    info!(user_id = %user.id, "User logged in");
    issue_session(db, keys, user).await
}

/// Exchange a refresh token for a new pair, revoking the presented one.
///
/// Lookup, insert of the successor and revocation run in one transaction.
/// The revoke only matches a still-live row, so of two concurrent refreshes
/// with the same token exactly one succeeds.
pub async fn refresh(
    db: &SqlitePool,
    keys: &JwtKeys,
    presented: &str,
) -> Result<AuthResponse, ApiError> {
    let claims = keys.verify_refresh(presented)?;
    let token_hash = hash_token(presented);
    let now = now_timestamp();

    let mut tx = begin_write(db).await?;

    let current = sqlx::query_as::<_, RefreshToken>(
        "SELECT * FROM refresh_tokens WHERE user_id = ? AND token_hash = ? AND revoked_at IS NULL AND expires_at > ?",
    )
    .bind(&claims.sub)
    .bind(&token_hash)
    .bind(&now)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(current) = current else {
        warn!(user_id = %claims.sub, "Refresh with revoked or unknown token");
        return Err(ApiError::unauthorized("Refresh token is no longer valid"));
    };

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(&current.user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Refresh token is no longer valid"))?;
    if !user.is_active() {
        return Err(ApiError::forbidden("Account is suspended"));
    }

    let pair = keys.issue_pair(&user)?;
    let new_id = store_refresh_token(&mut *tx, &user.id, &pair).await?;

    let revoked = sqlx::query(
        "UPDATE refresh_tokens SET revoked_at = ?, replaced_by_token_id = ? WHERE id = ? AND revoked_at IS NULL",
    )
    .bind(&now)
    .bind(&new_id)
    .bind(&current.id)
    .execute(&mut *tx)
    .await?;
    if revoked.rows_affected() != 1 {
        return Err(ApiError::unauthorized("Refresh token is no longer valid"));
    }

    tx.commit().await?;

    info!(user_id = %user.id, "Rotated refresh token");
    Ok(AuthResponse {
        user: UserResponse::from(user),
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
    })
}

/// Revoke a single refresh token. Unknown or already revoked tokens are a no-op.
pub async fn logout(db: &SqlitePool, keys: &JwtKeys, presented: &str) -> Result<(), ApiError> {
    let claims = keys.verify_refresh(presented)?;
    sqlx::query(
        "UPDATE refresh_tokens SET revoked_at = ? WHERE user_id = ? AND token_hash = ? AND revoked_at IS NULL",
    )
    .bind(now_timestamp())
    .bind(&claims.sub)
    .bind(hash_token(presented))
    .execute(db)
    .await?;
    Ok(())
}

pub async fn logout_all(db: &SqlitePool, user_id: &str) -> Result<u64, ApiError> {
    let revoked = revoke_user_tokens(db, user_id).await?;
    info!(user_id = %user_id, revoked, "Signed out everywhere");
    Ok(revoked)
}

/// Raw reset token, returned once so it can be mailed.
#[derive(Debug, Clone)]
pub struct IssuedReset {
    pub email: String,
    pub token: String,
    pub expires_in_minutes: i64,
}

/// Store a reset token for `email`. Unknown emails yield `None` so callers
/// can answer identically either way.
pub async fn request_password_reset(
    db: &SqlitePool,
    email: &str,
    ttl_minutes: i64,
) -> Result<Option<IssuedReset>, ApiError> {
    let Some(user) = find_user_by_email(db, email).await? else {
        return Ok(None);
    };

    let token = generate_token();
    let expires_at = format_timestamp(Utc::now() + Duration::minutes(ttl_minutes));
    sqlx::query(
        "INSERT INTO password_reset_tokens (id, user_id, token_hash, expires_at) VALUES (?, ?, ?, ?)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(&user.id)
    .bind(hash_token(&token))
    .bind(&expires_at)
    .execute(db)
    .await?;

    info!(user_id = %user.id, "Password reset requested");
    Ok(Some(IssuedReset {
        email: user.email,
        token,
        expires_in_minutes: ttl_minutes,
    }))
}

/// Set a new password from a reset token and sign the user out everywhere.
pub async fn reset_password(
    db: &SqlitePool,
    presented: &str,
    new_password: &str,
) -> Result<(), ApiError> {
    let password_hash = hash_or_internal(new_password)?;
    let now = now_timestamp();

    let mut tx = begin_write(db).await?;

    let reset = sqlx::query_as::<_, PasswordResetToken>(
        "SELECT * FROM password_reset_tokens WHERE token_hash = ? AND used_at IS NULL AND expires_at > ?",
    )
    .bind(hash_token(presented))
    .bind(&now)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| {
        warn!("Password reset with invalid or expired token");
        ApiError::bad_request("Reset token is invalid or has expired")
    })?;

    sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(&password_hash)
        .bind(&now)
        .bind(&reset.user_id)
        .execute(&mut *tx)
        .await?;

    revoke_user_tokens(&mut *tx, &reset.user_id).await?;

    sqlx::query("UPDATE password_reset_tokens SET used_at = ? WHERE id = ?")
        .bind(&now)
        .bind(&reset.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    info!(user_id = %reset.user_id, "Password reset completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use crate::services::test_support;
    use axum::http::StatusCode;
    use std::sync::Arc;

    fn keys() -> JwtKeys {
        JwtKeys::new(&AuthConfig {
            jwt_access_secret: "a-secret".to_string(),
            jwt_refresh_secret: "r-secret".to_string(),
            ..AuthConfig::default()
        })
    }

    fn register_request(email: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: "password123".to_string(),
            name: Some("Jane".to_string()),
            phone: None,
        }
    }

    async fn live_tokens(db: &SqlitePool, user_id: &str) -> i64 {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM refresh_tokens WHERE user_id = ? AND revoked_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(db)
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let db = test_support::pool().await;
        let keys = keys();

        let session = register(&db, &keys, &register_request("jane@example.com"))
            .await
            .unwrap();
        assert_eq!(session.user.role, Role::Customer);
        assert_eq!(session.user.status, UserStatus::Active);

        let login_session = login(
            &db,
            &keys,
            &LoginRequest {
                email: "jane@example.com".to_string(),
                password: "password123".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(login_session.user.id, session.user.id);
        assert_eq!(live_tokens(&db, &session.user.id).await, 2);
    }

    #[tokio::test]
    async fn test_duplicate_registration_conflicts() {
        let db = test_support::pool().await;
        let keys = keys();
        register(&db, &keys, &register_request("jane@example.com"))
            .await
            .unwrap();
        let err = register(&db, &keys, &register_request("jane@example.com"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_login_rejects_bad_password_and_suspended() {
        let db = test_support::pool().await;
        let keys = keys();
        let session = register(&db, &keys, &register_request("jane@example.com"))
            .await
            .unwrap();

        let bad = login(
            &db,
            &keys,
            &LoginRequest {
                email: "jane@example.com".to_string(),
                password: "wrong-password".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(bad.status(), StatusCode::UNAUTHORIZED);

        sqlx::query("UPDATE users SET status = 'SUSPENDED' WHERE id = ?")
            .bind(&session.user.id)
            .execute(&db)
            .await
            .unwrap();
        let suspended = login(
            &db,
            &keys,
            &LoginRequest {
                email: "jane@example.com".to_string(),
                password: "password123".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(suspended.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_rotated_refresh_token_cannot_be_reused() {
        let db = test_support::pool().await;
        let keys = keys();
        let session = register(&db, &keys, &register_request("jane@example.com"))
            .await
            .unwrap();

        let rotated = refresh(&db, &keys, &session.refresh_token).await.unwrap();
        assert_ne!(rotated.refresh_token, session.refresh_token);

        let reuse = refresh(&db, &keys, &session.refresh_token).await.unwrap_err();
        assert_eq!(reuse.status(), StatusCode::UNAUTHORIZED);

        // The chain points from the old row to its successor
        let old: RefreshToken = sqlx::query_as("SELECT * FROM refresh_tokens WHERE token_hash = ?")
            .bind(hash_token(&session.refresh_token))
            .fetch_one(&db)
            .await
            .unwrap();
        let new: RefreshToken = sqlx::query_as("SELECT * FROM refresh_tokens WHERE token_hash = ?")
            .bind(hash_token(&rotated.refresh_token))
            .fetch_one(&db)
            .await
            .unwrap();
        assert!(old.revoked_at.is_some());
        assert_eq!(old.replaced_by_token_id.as_deref(), Some(new.id.as_str()));
        assert!(new.revoked_at.is_none());

        // The successor keeps working
        refresh(&db, &keys, &rotated.refresh_token).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_refreshes_all_rotate() {
        let (db, _dir) = test_support::file_pool().await;
        let keys = Arc::new(keys());

        let mut presented = Vec::new();
        for i in 0..10 {
            let id =
                test_support::user(&db, &format!("user{}@example.com", i), Role::Customer).await;
            let user = get_user(&db, &id).await.unwrap();
            presented.push(issue_session(&db, &keys, user).await.unwrap().refresh_token);
        }

        let handles: Vec<_> = presented
            .into_iter()
            .map(|token| {
                let db = db.clone();
                let keys = keys.clone();
                tokio::spawn(async move { refresh(&db, &keys, &token).await })
            })
            .collect();

        for handle in handles {
            let rotated = handle.await.unwrap();
            assert!(rotated.is_ok(), "refresh failed: {:?}", rotated.err());
        }

        let live: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM refresh_tokens WHERE revoked_at IS NULL")
                .fetch_one(&db)
                .await
                .unwrap();
        assert_eq!(live, 10);
    }

    #[tokio::test]
    async fn test_refresh_rejects_access_token_and_suspended_user() {
        let db = test_support::pool().await;
        let keys = keys();
        let session = register(&db, &keys, &register_request("jane@example.com"))
            .await
            .unwrap();

        let err = refresh(&db, &keys, &session.access_token).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        sqlx::query("UPDATE users SET status = 'SUSPENDED' WHERE id = ?")
            .bind(&session.user.id)
            .execute(&db)
            .await
            .unwrap();
        let err = refresh(&db, &keys, &session.refresh_token).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        // A refused rotation leaves the token untouched
        assert_eq!(live_tokens(&db, &session.user.id).await, 1);
    }

    #[tokio::test]
    async fn test_logout_and_logout_all() {
        let db = test_support::pool().await;
        let keys = keys();
        let first = register(&db, &keys, &register_request("jane@example.com"))
            .await
            .unwrap();
        let login_req = LoginRequest {
            email: "jane@example.com".to_string(),
            password: "password123".to_string(),
        };
        login(&db, &keys, &login_req).await.unwrap();
        login(&db, &keys, &login_req).await.unwrap();
        assert_eq!(live_tokens(&db, &first.user.id).await, 3);

        logout(&db, &keys, &first.refresh_token).await.unwrap();
        assert_eq!(live_tokens(&db, &first.user.id).await, 2);
        assert!(refresh(&db, &keys, &first.refresh_token).await.is_err());

        assert_eq!(logout_all(&db, &first.user.id).await.unwrap(), 2);
        assert_eq!(live_tokens(&db, &first.user.id).await, 0);
    }

    #[tokio::test]
    async fn test_password_reset_flow() {
        let db = test_support::pool().await;
        let keys = keys();
        let session = register(&db, &keys, &register_request("jane@example.com"))
            .await
            .unwrap();

        assert!(request_password_reset(&db, "nobody@example.com", 30)
            .await
            .unwrap()
            .is_none());

        let issued = request_password_reset(&db, "jane@example.com", 30)
            .await
            .unwrap()
            .unwrap();
        reset_password(&db, &issued.token, "new-password-9").await.unwrap();

        assert_eq!(live_tokens(&db, &session.user.id).await, 0);
        let relogin = login(
            &db,
            &keys,
            &LoginRequest {
                email: "jane@example.com".to_string(),
                password: "new-password-9".to_string(),
            },
        )
        .await;
        assert!(relogin.is_ok());

        // Single use
        let again = reset_password(&db, &issued.token, "another-pass-1")
            .await
            .unwrap_err();
        assert_eq!(again.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_expired_reset_token_is_rejected() {
        let db = test_support::pool().await;
        let keys = keys();
        register(&db, &keys, &register_request("jane@example.com"))
            .await
            .unwrap();
        let issued = request_password_reset(&db, "jane@example.com", -1)
            .await
            .unwrap()
            .unwrap();
        let err = reset_password(&db, &issued.token, "new-password-9")
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
