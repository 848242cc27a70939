use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file path, or `:memory:`
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./data/storefront.db")
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_secret")]
    pub jwt_access_secret: String,
    #[serde(default = "default_secret")]
    pub jwt_refresh_secret: String,
    /// Access token lifetime, e.g. `15m`
    #[serde(default = "default_access_expires")]
    pub jwt_access_expires: String,
    /// Refresh token lifetime, e.g. `7d`
    #[serde(default = "default_refresh_expires")]
    pub jwt_refresh_expires: String,
    #[serde(default = "default_password_reset_minutes")]
    pub password_reset_minutes: i64,
    /// Return the raw reset token in the API response. Development only.
    #[serde(default)]
    pub expose_reset_tokens: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_access_secret: default_secret(),
            jwt_refresh_secret: default_secret(),
            jwt_access_expires: default_access_expires(),
            jwt_refresh_expires: default_refresh_expires(),
            password_reset_minutes: default_password_reset_minutes(),
            expose_reset_tokens: false,
        }
    }
}

impl AuthConfig {
    pub fn access_ttl(&self) -> chrono::Duration {
        parse_duration(&self.jwt_access_expires)
    }

    pub fn refresh_ttl(&self) -> chrono::Duration {
        parse_duration(&self.jwt_refresh_expires)
    }
}

fn default_secret() -> String {
    // Random per process when not configured; tokens do not survive a restart
    uuid::Uuid::new_v4().simple().to_string()
}

fn default_access_expires() -> String {
    "15m".to_string()
}

fn default_refresh_expires() -> String {
    "7d".to_string()
}

fn default_password_reset_minutes() -> i64 {
    30
}

/// Parse `<n>(s|m|h|d|w)` into a duration. Anything unparseable is 7 days.
pub fn parse_duration(input: &str) -> chrono::Duration {
    let fallback = chrono::Duration::days(7);
    let input = input.trim();
    let Some(unit) = input.chars().last() else {
        return fallback;
    };
    let Ok(amount) = input[..input.len() - unit.len_utf8()].parse::<i64>() else {
        return fallback;
    };
    match unit {
        's' => chrono::Duration::seconds(amount),
        'm' => chrono::Duration::minutes(amount),
        'h' => chrono::Duration::hours(amount),
        'd' => chrono::Duration::days(amount),
        'w' => chrono::Duration::weeks(amount),
        _ => fallback,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,
    /// Requests per window for all routes
    #[serde(default = "default_api_requests")]
    pub api_requests_per_window: u32,
    #[serde(default = "default_login_requests")]
    pub login_requests_per_window: u32,
    #[serde(default = "default_register_requests")]
    pub register_requests_per_window: u32,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    /// Seconds between sweeps of expired entries
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,
    /// Key clients by `X-Forwarded-For`/`X-Real-IP`. Only enable behind a
    /// reverse proxy that overwrites these headers.
    #[serde(default)]
    pub trust_proxy_headers: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_rate_limit_enabled(),
            api_requests_per_window: default_api_requests(),
            login_requests_per_window: default_login_requests(),
            register_requests_per_window: default_register_requests(),
            window_seconds: default_window_seconds(),
            cleanup_interval: default_cleanup_interval(),
            trust_proxy_headers: false,
        }
    }
}

fn default_rate_limit_enabled() -> bool {
    true
}

fn default_api_requests() -> u32 {
    60
}

fn default_login_requests() -> u32 {
    10
}

fn default_register_requests() -> u32 {
    5
}

fn default_window_seconds() -> u64 {
    60
}

fn default_cleanup_interval() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
        }
    }
}

fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:5173".to_string()]
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    #[serde(default = "default_smtp_tls")]
    pub smtp_tls: bool,
    pub from_address: Option<String>,
    #[serde(default = "default_from_name")]
    pub from_name: String,
    /// Frontend page that accepts `?token=`
    #[serde(default = "default_reset_url")]
    pub reset_url: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            smtp_tls: default_smtp_tls(),
            from_address: None,
            from_name: default_from_name(),
            reset_url: default_reset_url(),
        }
    }
}

impl EmailConfig {
    pub fn is_configured(&self) -> bool {
        self.smtp_host.is_some() && self.from_address.is_some()
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_smtp_tls() -> bool {
    true
}

fn default_from_name() -> String {
    "Storefront".to_string()
}

fn default_reset_url() -> String {
    "http://localhost:5173/reset-password".to_string()
}

/// Admin account ensured at startup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BootstrapConfig {
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str::<Config>(&content)
                .with_context(|| "Failed to parse configuration file")?
        } else {
            info!("No config file found, using defaults");
            Config::default()
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Environment variables win over the file.
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("DATABASE_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Ok(port) = std::env::var("PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid PORT value: {}", port))?;
        }
        if let Ok(secret) = std::env::var("JWT_ACCESS_SECRET") {
            self.auth.jwt_access_secret = secret;
        }
        if let Ok(secret) = std::env::var("JWT_REFRESH_SECRET") {
            self.auth.jwt_refresh_secret = secret;
        }
        if let Ok(expires) = std::env::var("JWT_ACCESS_EXPIRES") {
            self.auth.jwt_access_expires = expires;
        }
        if let Ok(expires) = std::env::var("JWT_REFRESH_EXPIRES") {
            self.auth.jwt_refresh_expires = expires;
        }
        if let Ok(email) = std::env::var("ADMIN_EMAIL") {
            self.bootstrap.admin_email = Some(email);
        }
        if let Ok(password) = std::env::var("ADMIN_PASSWORD") {
            self.bootstrap.admin_password = Some(password);
        }
        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            self.cors.allowed_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }
        if self.auth.jwt_access_secret == self.auth.jwt_refresh_secret {
            warn!("Access and refresh tokens share a signing secret");
        }
        Ok(())
    }

    pub fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            rate_limit: RateLimitConfig::default(),
            cors: CorsConfig::default(),
            logging: LoggingConfig::default(),
            email: EmailConfig::default(),
            bootstrap: BootstrapConfig::default(),
        }
    }
}
