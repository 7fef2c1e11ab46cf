//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::auth::{LOCAL_PROVIDER, hash_password};
use crate::cache::MemoryCache;
use crate::db::{Database, NewUser, UserRole};
use crate::jwt::JwtConfig;
use crate::rate_limit::{RateLimitConfig, RateLimits};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use clap::Parser;
use rand::RngCore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use url::Url;
use uuid::Uuid;

const MIN_JWT_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "Gatekeeper",
    about = "Authentication service with JWT validation and token revocation"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "9000")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "DATABASE_PATH", default_value = "gatekeeper.db")]
    pub database: String,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Externally visible base URL, used to build pagination links
    #[arg(long, env = "PUBLIC_URL", default_value = "http://localhost:9000")]
    pub public_url: String,

    /// Lifetime of issued user tokens in seconds
    #[arg(long, env = "TOKEN_TTL_SECS", default_value = "86400")]
    pub token_ttl_secs: u64,

    /// Reject requests carrying an expired token instead of treating them as anonymous
    #[arg(long, env = "STRICT_AUTH")]
    pub strict_auth: bool,

    /// Accept tokens when the revocation store cannot be reached
    #[arg(long)]
    pub revocation_fail_open: bool,

    /// How long revocation lookups are cached, in seconds
    #[arg(long, default_value = "60")]
    pub revocation_cache_ttl_secs: u64,

    /// Deployment environment. Production hides validation details from clients
    #[arg(long, env = "APP_ENV", default_value = "development")]
    pub environment: Environment,

    /// Use the first X-Forwarded-For entry as client IP (only behind a trusted proxy)
    #[arg(long)]
    pub trust_forwarded_for: bool,

    /// Create an admin user with this email on startup and print its password
    #[arg(long, value_name = "EMAIL")]
    pub create_admin: Option<String>,

    /// Print a long-lived token for the internal service principal and exit
    #[arg(long)]
    pub print_service_token: bool,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    validate_jwt_secret(secret)
}

fn validate_jwt_secret(secret: String) -> Option<String> {
    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }
    Some(secret)
}

/// Parse and validate the public URL.
/// Returns None and logs an error if validation fails.
pub fn validate_public_url(public_url: &str, environment: Environment) -> Option<Url> {
    let url = match Url::parse(public_url) {
        Ok(url) => url,
        Err(e) => {
            error!(url = %public_url, error = %e, "Invalid public URL");
            return None;
        }
    };

    if !matches!(url.scheme(), "http" | "https") {
        error!(url = %public_url, "Public URL must use http or https");
        return None;
    }

    let is_https = url.scheme() == "https";
    let is_localhost = matches!(url.host_str(), Some("localhost" | "127.0.0.1"));

    if environment == Environment::Production && !is_https && !is_localhost {
        error!("Public URL must use HTTPS in production");
        return None;
    }

    Some(url)
}

fn generate_password() -> String {
    let mut bytes = [0u8; 18];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Handle the --create-admin flag: create an admin with a random password,
/// or promote an existing account.
pub async fn handle_create_admin(db: &Database, email: &str) {
    let email = email.trim().to_lowercase();

    match db.users().get_by_email(&email).await {
        Ok(Some(existing)) if existing.role == UserRole::Admin => {
            println!();
            println!("Admin already exists: {}", existing.email);
            println!();
        }
        Ok(Some(existing)) => match db.users().set_role(existing.id, UserRole::Admin).await {
            Ok(_) => {
                println!();
                println!("Promoted to admin: {}", existing.email);
                println!("Existing tokens keep their old role until they expire or the user logs in again.");
                println!();
            }
            Err(e) => {
                error!(error = %e, "Failed to promote user");
                std::process::exit(1);
            }
        },
        Ok(None) => {
            let password = generate_password();
            let hash = match hash_password(password.clone()).await {
                Ok(hash) => hash,
                Err(e) => {
                    error!(error = %e, "Failed to hash admin password");
                    std::process::exit(1);
                }
            };
            let uuid = Uuid::new_v4().to_string();

            let result = db
                .users()
                .create(&NewUser {
                    uuid: &uuid,
                    email: &email,
                    name: None,
                    password_hash: Some(&hash),
                    role: UserRole::Admin,
                    provider: LOCAL_PROVIDER,
                    provider_id: None,
                })
                .await;

            match result {
                Ok(_) => {
                    println!();
                    println!("Admin user created: {}", email);
                    println!("Password: {}", password);
                    println!();
                }
                Err(e) => {
                    error!(error = %e, "Failed to create admin user");
                    std::process::exit(1);
                }
            }
        }
        Err(e) => {
            error!(error = %e, "Failed to check for existing admin");
            std::process::exit(1);
        }
    }
}

/// Handle the --print-service-token flag.
pub fn print_service_token(jwt_secret: &str) {
    match JwtConfig::new(jwt_secret.as_bytes()).issue_service_token() {
        Ok(issued) => println!("{}", issued.token),
        Err(e) => {
            error!(error = %e, "Failed to issue service token");
            std::process::exit(1);
        }
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(args: &Args, db: Database, public_url: Url, jwt_secret: String) -> ServerConfig {
    let mut config = ServerConfig::new(db, jwt_secret.into_bytes(), public_url);

    config.token_ttl = args.token_ttl_secs;
    config.passthrough = !args.strict_auth;
    config.production = args.environment == Environment::Production;
    config.revocation_fail_open = args.revocation_fail_open;
    config.revocation_cache = Arc::new(MemoryCache::new(Duration::from_secs(
        args.revocation_cache_ttl_secs,
    )));
    config.rate_limit = Arc::new(RateLimitConfig::new(
        RateLimits::default(),
        args.trust_forwarded_for,
    ));

    config
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
