//! Command-line interface.
//!
//! With no subcommand the binary starts the HTTP server. Maintenance
//! subcommands work directly against the configured database:
//! - `seed-catalog` - Load the demo categories and products
//! - `create-admin` - Create an admin account
//! - `config check` - Validate the configuration file

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::api::validation::{normalize_email, validate_email, validate_password};
use crate::config::Config;
use crate::db::{self, AdminCreateUserRequest};
use crate::services::admin;

#[derive(Parser, Debug)]
#[command(name = "storefront")]
#[command(author, version, about = "REST backend for a small online clothing store", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "STOREFRONT_CONFIG", default_value = "storefront.toml")]
    pub config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Subcommand to run (if none, starts the server)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server
    Serve,

    /// Load the demo catalog (idempotent)
    SeedCatalog,

    /// Create an admin account
    CreateAdmin {
        #[arg(long)]
        email: String,
        #[arg(long, env = "STOREFRONT_ADMIN_PASSWORD")]
        password: String,
        #[arg(long)]
        name: Option<String>,
    },

    /// Configuration management commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate configuration file
    Check,
}

impl Cli {
    /// True when the invocation should start the server.
    pub fn wants_server(&self) -> bool {
        matches!(self.command, None | Some(Commands::Serve))
    }
}

/// Run a maintenance subcommand. Serving is handled in main.rs.
pub async fn run_command(cli: &Cli, config: &Config) -> Result<()> {
    match &cli.command {
        Some(Commands::SeedCatalog) => cmd_seed_catalog(config).await,
        Some(Commands::CreateAdmin {
            email,
            password,
            name,
        }) => cmd_create_admin(config, email, password, name.clone()).await,
        Some(Commands::Config(ConfigCommands::Check)) => cmd_config_check(cli),
        Some(Commands::Serve) | None => Ok(()),
    }
}

async fn cmd_seed_catalog(config: &Config) -> Result<()> {
    let pool = db::init(&config.database).await?;
    db::seed_catalog(&pool).await?;
    println!("[OK] Demo catalog loaded");
    Ok(())
}

async fn cmd_create_admin(
    config: &Config,
    email: &str,
    password: &str,
    name: Option<String>,
) -> Result<()> {
    let email = normalize_email(email);
    if let Err(msg) = validate_email(&email) {
        bail!("Invalid email: {}", msg);
    }
    if let Err(msg) = validate_password(password) {
        bail!("Invalid password: {}", msg);
    }

    let pool = db::init(&config.database).await?;
    let req = AdminCreateUserRequest {
        email,
        password: password.to_string(),
        name,
    };
    let user = admin::create_admin(&pool, &req).await?;

    println!("[OK] Admin {} created (id {})", user.email, user.id);
    Ok(())
}

fn cmd_config_check(cli: &Cli) -> Result<()> {
    let config_path = &cli.config;

    println!("Checking configuration file: {}", config_path.display());
    println!();

    if !config_path.exists() {
        println!(
            "[!!] Configuration file not found: {}",
            config_path.display()
        );
        println!();
        println!("A default configuration will be used when starting the server.");
        return Ok(());
    }

    let config = Config::load(config_path)?;
    let enabled = |on: bool| if on { "Enabled" } else { "Disabled" };

    println!("[OK] Configuration file is valid!");
    println!();
    println!("Server:");
    println!("  Listen:        {}:{}", config.server.host, config.server.port);
    println!("  Database:      {}", config.database.path.display());
    println!();
    println!("Auth:");
    println!("  Access TTL:    {}", config.auth.jwt_access_expires);
    println!("  Refresh TTL:   {}", config.auth.jwt_refresh_expires);
    println!(
        "  Reset window:  {} minutes",
        config.auth.password_reset_minutes
    );
    println!();
    println!("Security:");
    println!("  Rate Limiting: {}", enabled(config.rate_limit.enabled));
    println!(
        "  Proxy headers: {}",
        if config.rate_limit.trust_proxy_headers {
            "Trusted"
        } else {
            "Ignored"
        }
    );
    println!("  Email:         {}", enabled(config.email.is_configured()));
    println!(
        "  CORS origins:  {}",
        config.cors.allowed_origins.join(", ")
    );

    Ok(())
}
