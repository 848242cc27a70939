use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use std::sync::Arc;

use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{
    normalize_email, validate_email, validate_optional_length, validate_password, validate_phone,
};
use crate::db::{
    AuthResponse, LoginRequest, PasswordResetRequest, PasswordResetRequested,
    PerformPasswordResetRequest, RefreshRequest, RegisterRequest, Role, SuccessResponse,
};
use crate::services::{auth, tokens::Claims};
use crate::AppState;

/// Identity taken from a verified access token.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub email: String,
    pub role: Role,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl From<Claims> for CurrentUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.sub,
            email: claims.email,
            role: claims.role,
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<CurrentUser, ApiError> {
    let token = bearer_token(headers)
        .ok_or_else(|| ApiError::unauthorized("Missing or invalid Authorization header"))?;
    let claims = state
        .jwt
        .verify_access(token)
        .map_err(|_| ApiError::unauthorized("Invalid or expired access token"))?;
    Ok(claims.into())
}

/// Rejects requests without a valid access token and stores the caller in
/// the request extensions.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let user = authenticate(&state, request.headers())?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Must run after `require_auth`.
pub async fn require_admin(request: Request<Body>, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<CurrentUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
    if !user.is_admin() {
        tracing::warn!(user_id = %user.id, path = %request.uri().path(), "Non-admin request to admin route");
        return Err(ApiError::forbidden("Admin access required"));
    }
    Ok(next.run(request).await)
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(user.clone());
        }
        authenticate(state, &parts.headers)
    }
}

/// POST /auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(mut req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    req.email = normalize_email(&req.email);

    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("email", validate_email(&req.email))
        .check("password", validate_password(&req.password))
        .check("name", validate_optional_length(&req.name, "Name", 1, 100))
        .check("phone", validate_phone(&req.phone, 7, 20));
    errors.finish()?;

    let response = auth::register(&state.db, &state.jwt, &req).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(mut req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    req.email = normalize_email(&req.email);

    let mut errors = ValidationErrorBuilder::new();
    errors.check("email", validate_email(&req.email));
    if req.password.is_empty() {
        errors.add("password", "Password is required");
    }
    errors.finish()?;

    Ok(Json(auth::login(&state.db, &state.jwt, &req).await?))
}

/// POST /auth/refresh
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    Ok(Json(auth::refresh(&state.db, &state.jwt, &req.refresh_token).await?))
}

/// POST /auth/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    auth::logout(&state.db, &state.jwt, &req.refresh_token).await?;
    Ok(Json(SuccessResponse::ok()))
}

/// POST /auth/logout-all
pub async fn logout_all(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<Json<SuccessResponse>, ApiError> {
    auth::logout_all(&state.db, &user.id).await?;
    Ok(Json(SuccessResponse::ok()))
}

/// POST /auth/request-password-reset
///
/// Answers the same way whether or not the email is registered.
pub async fn request_password_reset(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PasswordResetRequest>,
) -> Result<Json<PasswordResetRequested>, ApiError> {
    let email = normalize_email(&req.email);
    let mut errors = ValidationErrorBuilder::new();
    errors.check("email", validate_email(&email));
    errors.finish()?;

    let issued = auth::request_password_reset(
        &state.db,
        &email,
        state.config.auth.password_reset_minutes,
    )
    .await?;

    let mut reset_token = None;
    if let Some(issued) = issued {
        if let Err(e) = state
            .mailer
            .send_password_reset(&issued.email, &issued.token, issued.expires_in_minutes)
            .await
        {
            tracing::error!("Failed to send password reset email: {}", e);
        }
        if state.config.auth.expose_reset_tokens {
            reset_token = Some(issued.token);
        }
    }

    Ok(Json(PasswordResetRequested {
        success: true,
        reset_token,
    }))
}

/// POST /auth/reset-password
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PerformPasswordResetRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if req.token.trim().is_empty() {
        errors.add("token", "Token is required");
    }
    errors.check("newPassword", validate_password(&req.new_password));
    errors.finish()?;

    auth::reset_password(&state.db, req.token.trim(), &req.new_password).await?;
    Ok(Json(SuccessResponse::ok()))
}
