//! JWT issuing and verification for access and refresh tokens.
//!
//! Both kinds are HS256 JWTs signed with separate secrets. Every token gets
//! a fresh `jti`, so two tokens minted in the same second still differ and
//! their stored digests never collide.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::error::ApiError;
use crate::config::AuthConfig;
use crate::db::{Role, User};

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,
    #[error("token is invalid")]
    Invalid,
    #[error("failed to sign token: {0}")]
    Signing(jsonwebtoken::errors::Error),
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => ApiError::unauthorized("Token has expired"),
            TokenError::Invalid => ApiError::unauthorized("Invalid token"),
            TokenError::Signing(e) => {
                tracing::error!("JWT signing failed: {}", e);
                ApiError::internal("Failed to issue token")
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub email: String,
    pub role: Role,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

/// Freshly minted access/refresh pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
}

struct KeySet {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl KeySet {
    fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    fn sign(&self, user: &User, now: DateTime<Utc>) -> Result<(String, DateTime<Utc>), TokenError> {
        let expires_at = now + self.ttl;
        let claims = Claims {
            sub: user.id.clone(),
            email: user.email.clone(),
            role: user.role,
            jti: uuid::Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(TokenError::Signing)?;
        Ok((token, expires_at))
    }

    fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })
    }
}

/// Signing keys and lifetimes for both token kinds.
pub struct JwtKeys {
    access: KeySet,
    refresh: KeySet,
}

impl JwtKeys {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            access: KeySet::new(&config.jwt_access_secret, config.access_ttl()),
            refresh: KeySet::new(&config.jwt_refresh_secret, config.refresh_ttl()),
        }
    }

    pub fn issue_pair(&self, user: &User) -> Result<TokenPair, TokenError> {
        let now = Utc::now();
        let (access_token, _) = self.access.sign(user, now)?;
        let (refresh_token, refresh_expires_at) = self.refresh.sign(user, now)?;
        Ok(TokenPair {
            access_token,
            refresh_token,
            refresh_expires_at,
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, TokenError> {
        self.access.verify(token)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<Claims, TokenError> {
        self.refresh.verify(token)
    }
}
