use sqlx::SqlitePool;

use crate::api::error::ApiError;
use crate::db::{begin_write, now_timestamp, CustomerProfile, ProfileResponse, UpdateProfileRequest, User};

use super::auth::get_user;
use super::users::apply_contact_update;

async fn find_profile(db: &SqlitePool, user_id: &str) -> Result<Option<CustomerProfile>, ApiError> {
    let profile = sqlx::query_as::<_, CustomerProfile>(
        "SELECT * FROM customer_profiles WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_optional(db)
    .await?;
    Ok(profile)
}

pub async fn get_profile(db: &SqlitePool, user_id: &str) -> Result<ProfileResponse, ApiError> {
    let user: User = get_user(db, user_id).await?;
    let profile = find_profile(db, user_id).await?;
    Ok(ProfileResponse {
        user: user.into(),
        profile,
    })
}

/// Update account contact fields and upsert the customer profile together.
pub async fn update_profile(
    db: &SqlitePool,
    user_id: &str,
    req: &UpdateProfileRequest,
) -> Result<ProfileResponse, ApiError> {
    let mut tx = begin_write(db).await?;

    let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
    if exists.is_none() {
        return Err(ApiError::not_found("User not found"));
    }

    if req.name.is_some() || req.phone.is_some() {
        apply_contact_update(&mut *tx, user_id, req.name.as_deref(), req.phone.as_deref()).await?;
    }

    if req.touches_profile() {
        let now = now_timestamp();
        sqlx::query(
            r#"
            INSERT INTO customer_profiles (user_id, date_of_birth, gender, avatar_url, notes, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                date_of_birth = COALESCE(excluded.date_of_birth, customer_profiles.date_of_birth),
                gender = COALESCE(excluded.gender, customer_profiles.gender),
                avatar_url = COALESCE(excluded.avatar_url, customer_profiles.avatar_url),
                notes = COALESCE(excluded.notes, customer_profiles.notes),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(&req.date_of_birth)
        .bind(req.gender)
        .bind(&req.avatar_url)
        .bind(&req.notes)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    get_profile(db, user_id).await
}
