//! Sign-up, login and token lifecycle endpoints.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use super::error::{ApiError, ResultExt};
use super::{Data, UserWithToken, current_user};
use crate::auth::{
    Auth, AnyUser, LOCAL_PROVIDER, LoginCredentials, RevocationChecker, StrategyError,
    StrategyRegistry, hash_password,
};
use crate::db::{Database, NewUser, UserRole};
use crate::jwt::JwtConfig;
use crate::rate_limit::{RateLimitConfig, rate_limit_login, rate_limit_sign_up};

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 256;
const MAX_EMAIL_LENGTH: usize = 254;
const MAX_NAME_LENGTH: usize = 100;

#[derive(Clone)]
pub struct AuthState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
    pub revocations: Arc<RevocationChecker>,
    pub strategies: Arc<StrategyRegistry>,
}

pub fn router(state: AuthState, rate_limit: Arc<RateLimitConfig>) -> Router {
    let login_router = Router::new()
        .route("/login", post(login))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            rate_limit.clone(),
            rate_limit_login,
        ));

    let sign_up_router = Router::new()
        .route("/sign-up", post(sign_up))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(rate_limit, rate_limit_sign_up));

    let session_router = Router::new()
        .route("/check", get(check))
        .route("/generate-token", post(generate_token))
        .route("/sign-out", post(sign_out))
        .with_state(state);

    Router::new()
        .merge(login_router)
        .merge(sign_up_router)
        .merge(session_router)
}

pub(crate) fn validate_email(email: &str) -> Result<String, ApiError> {
    let email = email.trim();
    if email.is_empty() || email.len() > MAX_EMAIL_LENGTH {
        return Err(ApiError::bad_request("Invalid email address"));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => {
            Ok(email.to_lowercase())
        }
        _ => Err(ApiError::bad_request("Invalid email address")),
    }
}

pub(crate) fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(ApiError::bad_request("Password is too long"));
    }
    Ok(())
}

#[derive(Deserialize)]
struct SignUpRequest {
    email: String,
    password: String,
    name: Option<String>,
}

async fn sign_up(
    State(state): State<AuthState>,
    Json(payload): Json<SignUpRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = validate_email(&payload.email)?;
    validate_password(&payload.password)?;
    let name = match payload.name.as_deref().map(str::trim) {
        Some("") | None => None,
        Some(name) if name.chars().count() > MAX_NAME_LENGTH => {
            return Err(ApiError::bad_request("Name is too long"));
        }
        Some(name) => Some(name.to_string()),
    };

    let existing = state
        .db
        .users()
        .get_by_email(&email)
        .await
        .db_err("Failed to check email")?;
    if existing.is_some() {
        return Err(ApiError::conflict("Email is already registered"));
    }

    let hash = hash_password(payload.password)
        .await
        .internal_err("Failed to hash password")?;
    let uuid = uuid::Uuid::new_v4().to_string();

    let id = state
        .db
        .users()
        .create(&NewUser {
            uuid: &uuid,
            email: &email,
            name: name.as_deref(),
            password_hash: Some(&hash),
            role: UserRole::User,
            provider: LOCAL_PROVIDER,
            provider_id: None,
        })
        .await
        .db_err("Failed to create user")?;

    let user = state
        .db
        .users()
        .get_by_id(id)
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let token = state
        .jwt
        .issue_user_token(&user)
        .internal_err("Failed to create token")?;

    info!(user = %user.uuid, "User signed up");

    Ok((
        StatusCode::CREATED,
        Json(UserWithToken {
            data: user.into(),
            token: token.token,
        }),
    ))
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
    provider: Option<String>,
}

async fn login(
    State(state): State<AuthState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let provider = payload.provider.as_deref().unwrap_or(LOCAL_PROVIDER);
    let strategy = state
        .strategies
        .get(provider)
        .ok_or_else(|| ApiError::bad_request(format!("Unknown provider: {}", provider)))?;

    let credentials = LoginCredentials {
        email: payload.email.trim().to_lowercase(),
        password: payload.password,
    };

    let user = match strategy.authenticate(&state.db, &credentials).await {
        Ok(user) => user,
        Err(StrategyError::InvalidCredentials) => {
            return Err(ApiError::unauthorized("Invalid email or password"));
        }
        Err(e) => return Err(ApiError::internal_error("Login failed", e)),
    };

    let token = state
        .jwt
        .issue_user_token(&user)
        .internal_err("Failed to create token")?;

    info!(user = %user.uuid, provider = %provider, "User logged in");

    Ok(Json(UserWithToken {
        data: user.into(),
        token: token.token,
    }))
}

async fn check(auth: Auth) -> impl IntoResponse {
    Json(Data {
        data: auth.principal,
    })
}

/// Issue a fresh token reflecting the user as currently stored.
async fn generate_token(
    State(state): State<AuthState>,
    auth: Auth<AnyUser>,
) -> Result<impl IntoResponse, ApiError> {
    let user = current_user(&state.db, &auth.principal).await?;
    let token = state
        .jwt
        .issue_user_token(&user)
        .internal_err("Failed to create token")?;

    Ok(Json(UserWithToken {
        data: user.into(),
        token: token.token,
    }))
}

/// Invalidate every token issued to the caller so far.
async fn sign_out(
    State(state): State<AuthState>,
    auth: Auth<AnyUser>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .revocations
        .revoke(auth.principal.id())
        .await
        .db_err("Failed to revoke tokens")?;

    info!(user = %auth.principal.id(), "User signed out");

    Ok(StatusCode::NO_CONTENT)
}
