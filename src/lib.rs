pub mod api;
pub mod auth;
pub mod cache;
pub mod cleanup;
pub mod cli;
pub mod db;
pub mod jwt;
pub mod rate_limit;

use api::{ApiDeps, create_api_router};
use auth::{AuthGate, RevocationChecker, StrategyRegistry, authenticate};
use axum::{Router, middleware};
use cache::MemoryCache;
use cleanup::CleanupTargets;
use db::Database;
use jwt::{DEFAULT_TOKEN_DURATION_SECS, JwtConfig};
use rate_limit::{RateLimitConfig, RateLimits};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use url::Url;

/// Default lifetime of cached revocation lookups.
pub const DEFAULT_REVOCATION_CACHE_TTL: Duration = Duration::from_secs(60);

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// JWT secret for signing tokens
    pub jwt_secret: Vec<u8>,
    /// Lifetime of user tokens in seconds
    pub token_ttl: u64,
    /// Externally visible base URL, used for pagination links
    pub public_url: Url,
    /// Let requests with an invalid (but not revoked or malformed) token through anonymously
    pub passthrough: bool,
    /// Hide raw validation messages from clients
    pub production: bool,
    /// Allow requests when the revocation store cannot be reached
    pub revocation_fail_open: bool,
    /// Cache in front of the revocation store, shared with the cleanup task
    pub revocation_cache: Arc<MemoryCache<Option<u64>>>,
    /// Per-IP limiters for login and sign-up, shared with the cleanup task
    pub rate_limit: Arc<RateLimitConfig>,
    /// Login strategies by provider name
    pub strategies: Arc<StrategyRegistry>,
}

impl ServerConfig {
    /// Configuration with development defaults.
    pub fn new(db: Database, jwt_secret: impl Into<Vec<u8>>, public_url: Url) -> Self {
        Self {
            db,
            jwt_secret: jwt_secret.into(),
            token_ttl: DEFAULT_TOKEN_DURATION_SECS,
            public_url,
            passthrough: true,
            production: false,
            revocation_fail_open: false,
            revocation_cache: Arc::new(MemoryCache::new(DEFAULT_REVOCATION_CACHE_TTL)),
            rate_limit: Arc::new(RateLimitConfig::new(RateLimits::default(), false)),
            strategies: Arc::new(StrategyRegistry::with_defaults()),
        }
    }

    pub fn cleanup_targets(&self) -> CleanupTargets {
        CleanupTargets {
            db: self.db.clone(),
            revocation_cache: self.revocation_cache.clone(),
            rate_limit: Some(self.rate_limit.clone()),
            token_ttl: self.token_ttl,
        }
    }
}

/// Create the application router with the given configuration.
///
/// Every route sits behind the authentication gate, which attaches an
/// `AuthContext` to the request or rejects it with 401.
pub fn create_app(config: &ServerConfig) -> Router {
    let jwt = Arc::new(JwtConfig::with_duration(&config.jwt_secret, config.token_ttl));

    let revocations = Arc::new(RevocationChecker::new(
        config.db.clone(),
        config.revocation_cache.clone(),
        config.revocation_fail_open,
    ));

    let gate = Arc::new(AuthGate::new(
        jwt.clone(),
        revocations.clone(),
        config.passthrough,
        config.production,
    ));

    let api_router = create_api_router(ApiDeps {
        db: config.db.clone(),
        jwt,
        revocations,
        strategies: config.strategies.clone(),
        rate_limit: config.rate_limit.clone(),
        public_url: config.public_url.clone(),
    });

    Router::new()
        .nest("/auth", api_router)
        .layer(middleware::from_fn_with_state(gate, authenticate))
}

/// Run cleanup tasks and spawn background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(config: &ServerConfig) {
    let targets = config.cleanup_targets();
    cleanup::run_cleanup(&targets).await;
    cleanup::spawn_cleanup_scheduler(targets);
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    init_cleanup(&config).await;

    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        run_server(config, listener).await.ok();
    });

    Ok((handle, local_addr))
}
