pub mod api;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod db;
pub mod notifications;
pub mod services;

pub use db::DbPool;

use config::Config;
use std::sync::Arc;

use crate::api::rate_limit::RateLimiter;
use crate::notifications::Mailer;
use crate::services::tokens::JwtKeys;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub jwt: JwtKeys,
    pub rate_limiter: Arc<RateLimiter>,
    pub mailer: Mailer,
}

impl AppState {
    pub fn new(config: Config, db: DbPool) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        let jwt = JwtKeys::new(&config.auth);
        let mailer = Mailer::new(config.email.clone());
        Self {
            config,
            db,
            jwt,
            rate_limiter,
            mailer,
        }
    }
}
