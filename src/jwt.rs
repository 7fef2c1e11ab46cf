//! JWT token issuance and validation.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::auth::{AuthError, SERVICE_PRINCIPAL_ID};
use crate::db::{User, UserRole};

/// Default token lifetime: 24 hours
pub const DEFAULT_TOKEN_DURATION_SECS: u64 = 24 * 60 * 60;

/// Service tokens are handed to sibling services at deploy time and live for a year.
pub const SERVICE_TOKEN_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

/// JWT claims carried by every token issued by this service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    /// Subject (user UUID, or "microservice" for the service principal)
    pub sub: String,
    /// User role (absent for the service principal)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<UserRole>,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Issued at in Unix milliseconds. Revocation compares against this;
    /// tokens without it fall back to `iat`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_user_data: Option<serde_json::Value>,
}

impl TokenClaims {
    /// Issue time in Unix milliseconds.
    pub fn issued_at_ms(&self) -> u64 {
        self.iat_ms.unwrap_or(self.iat.saturating_mul(1000))
    }
}

/// Result of issuing a token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The JWT token string
    pub token: String,
    /// Issued at timestamp (Unix seconds)
    pub issued_at: u64,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
}

/// Signing keys plus the lifetime applied to user tokens.
#[derive(Clone)]
pub struct JwtConfig {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_duration: u64,
}

impl JwtConfig {
    /// Create a new JWT configuration with the given secret and the default lifetime.
    pub fn new(secret: &[u8]) -> Self {
        Self::with_duration(secret, DEFAULT_TOKEN_DURATION_SECS)
    }

    pub fn with_duration(secret: &[u8], token_duration: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            token_duration,
        }
    }

    /// Lifetime of user tokens in seconds.
    pub fn token_duration(&self) -> u64 {
        self.token_duration
    }

    /// Issue a token for a stored user. Profile fields are copied into the claims.
    pub fn issue_user_token(&self, user: &User) -> Result<IssuedToken, JwtError> {
        self.issue_user_token_not_before(user, 0)
    }

    /// Issue a user token whose millisecond issue time is at least `not_before_ms`.
    ///
    /// Used right after a revocation so the replacement token is not caught by
    /// the record just written.
    pub fn issue_user_token_not_before(
        &self,
        user: &User,
        not_before_ms: u64,
    ) -> Result<IssuedToken, JwtError> {
        let now_ms = unix_now_ms()?.max(not_before_ms);
        let now = now_ms / 1000;
        let claims = TokenClaims {
            sub: user.uuid.clone(),
            role: Some(user.role),
            iat: now,
            exp: now + self.token_duration,
            iat_ms: Some(now_ms),
            provider: Some(user.provider.clone()),
            provider_id: user.provider_id.clone(),
            email: Some(user.email.clone()),
            name: user.name.clone(),
            photo: user.photo.clone(),
            created_at: Some(user.created_at.clone()),
            extra_user_data: user.extra_user_data.clone(),
        };
        self.sign(claims)
    }

    /// Issue a token for the trusted service principal.
    pub fn issue_service_token(&self) -> Result<IssuedToken, JwtError> {
        let now_ms = unix_now_ms()?;
        let now = now_ms / 1000;
        let claims = TokenClaims {
            sub: SERVICE_PRINCIPAL_ID.to_string(),
            role: None,
            iat: now,
            exp: now + SERVICE_TOKEN_DURATION_SECS,
            iat_ms: Some(now_ms),
            provider: None,
            provider_id: None,
            email: None,
            name: None,
            photo: None,
            created_at: None,
            extra_user_data: None,
        };
        self.sign(claims)
    }

    /// Sign arbitrary claims. `iat` and `exp` are taken as given.
    pub fn sign(&self, claims: TokenClaims) -> Result<IssuedToken, JwtError> {
        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(JwtError::Encoding)?;

        Ok(IssuedToken {
            token,
            issued_at: claims.iat,
            expires_at: claims.exp,
        })
    }

    /// Verify signature and expiry, then decode the claims.
    pub fn validate_token(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        jsonwebtoken::decode::<TokenClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::TokenMalformed,
            })
    }
}

pub(crate) fn unix_now() -> Result<u64, JwtError> {
    Ok(unix_now_ms()? / 1000)
}

pub(crate) fn unix_now_ms() -> Result<u64, JwtError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .map_err(|_| JwtError::TimeError)
}

/// Errors that can occur while issuing tokens.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Failed to encode token: {0}")]
    Encoding(jsonwebtoken::errors::Error),
    #[error("System time error")]
    TimeError,
}
