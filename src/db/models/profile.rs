use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::UserResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    Male,
    Female,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CustomerProfile {
    pub user_id: String,
    pub date_of_birth: Option<String>,
    pub gender: Option<Gender>,
    pub avatar_url: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub user: UserResponse,
    pub profile: Option<CustomerProfile>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    /// `YYYY-MM-DD`
    pub date_of_birth: Option<String>,
    pub gender: Option<Gender>,
    pub avatar_url: Option<String>,
    pub notes: Option<String>,
}

impl UpdateProfileRequest {
    pub fn touches_profile(&self) -> bool {
        self.date_of_birth.is_some()
            || self.gender.is_some()
            || self.avatar_url.is_some()
            || self.notes.is_some()
    }
}
