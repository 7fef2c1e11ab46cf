#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use gatekeeper::{
    ServerConfig, create_app,
    db::{Database, NewUser, User, UserRole},
    jwt::{JwtConfig, TokenClaims},
    rate_limit::{RateLimitConfig, RateLimits},
};
use serde_json::Value;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tower::ServiceExt;
use url::Url;

pub const JWT_SECRET: &[u8] = b"test-jwt-secret-that-is-long-enough";
pub const PUBLIC_URL: &str = "http://localhost:9000";

pub struct TestApp {
    pub app: Router,
    pub db: Database,
    pub jwt: JwtConfig,
}

impl TestApp {
    /// Send a request and return the status and parsed JSON body (`Null` when empty).
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }
}

pub async fn setup() -> TestApp {
    setup_with(|_| {}).await
}

/// Build a test app, letting the caller adjust the configuration first.
pub async fn setup_with(configure: impl FnOnce(&mut ServerConfig)) -> TestApp {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let mut config = ServerConfig::new(
        db.clone(),
        JWT_SECRET.to_vec(),
        Url::parse(PUBLIC_URL).expect("Invalid URL"),
    );
    config.rate_limit = Arc::new(RateLimitConfig::new(RateLimits::unlimited(), true));
    configure(&mut config);

    TestApp {
        app: create_app(&config),
        db,
        jwt: JwtConfig::with_duration(JWT_SECRET, config.token_ttl),
    }
}

pub fn now() -> u64 {
    now_ms() / 1000
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

/// Create a user without a password (token-only tests).
pub async fn create_user(db: &Database, email: &str, role: UserRole) -> User {
    let uuid = uuid::Uuid::new_v4().to_string();
    let id = db
        .users()
        .create(&NewUser {
            uuid: &uuid,
            email,
            name: Some("Test User"),
            password_hash: None,
            role,
            provider: "local",
            provider_id: None,
        })
        .await
        .unwrap();
    db.users().get_by_id(id).await.unwrap().unwrap()
}

/// Sign a token for `user` with an explicit issue time in Unix milliseconds.
pub fn token_issued_at(jwt: &JwtConfig, user: &User, iat_ms: u64) -> String {
    let iat = iat_ms / 1000;
    jwt.sign(TokenClaims {
        sub: user.uuid.clone(),
        role: Some(user.role),
        iat,
        exp: iat + 3600,
        iat_ms: Some(iat_ms),
        provider: Some(user.provider.clone()),
        provider_id: None,
        email: Some(user.email.clone()),
        name: user.name.clone(),
        photo: None,
        created_at: Some(user.created_at.clone()),
        extra_user_data: None,
    })
    .unwrap()
    .token
}

/// A freshly issued token, exactly as login would hand it out.
pub fn token_for(jwt: &JwtConfig, user: &User) -> String {
    jwt.issue_user_token(user).unwrap().token
}

pub fn service_token(jwt: &JwtConfig) -> String {
    jwt.issue_service_token().unwrap().token
}

/// Build a request with an optional bearer token and optional JSON body.
pub fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", "203.0.113.1");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub fn detail(body: &Value) -> &str {
    body["errors"][0]["detail"].as_str().unwrap_or_default()
}
