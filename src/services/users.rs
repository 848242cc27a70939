use sqlx::{Sqlite, SqlitePool};

use crate::api::error::ApiError;
use crate::db::{now_timestamp, UpdateMeRequest, UserResponse};

use super::auth::get_user;

pub async fn get_me(db: &SqlitePool, user_id: &str) -> Result<UserResponse, ApiError> {
    Ok(get_user(db, user_id).await?.into())
}

/// Set name and phone where given; absent fields are left alone.
pub(crate) async fn apply_contact_update<'e, E>(
    executor: E,
    user_id: &str,
    name: Option<&str>,
    phone: Option<&str>,
) -> Result<(), ApiError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "UPDATE users SET name = COALESCE(?, name), phone = COALESCE(?, phone), updated_at = ? WHERE id = ?",
    )
    .bind(name.map(str::trim))
    .bind(phone.map(str::trim))
    .bind(now_timestamp())
    .bind(user_id)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn update_me(
    db: &SqlitePool,
    user_id: &str,
    req: &UpdateMeRequest,
) -> Result<UserResponse, ApiError> {
    apply_contact_update(db, user_id, req.name.as_deref(), req.phone.as_deref()).await?;
    get_me(db, user_id).await
}
