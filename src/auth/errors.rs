//! Authentication error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

pub const BAD_FORMAT_MESSAGE: &str =
    "Bad Authorization header format. Format is \"Authorization: Bearer <token>\"";

pub const OUTDATED_TOKEN_MESSAGE: &str =
    "Your token is outdated. Please use /auth/login to login again.";

pub const INVALID_TOKEN_MESSAGE: &str =
    "Your token is invalid. Please use /auth/login to login again.";

/// Shown instead of raw validation messages in production.
const GENERIC_MESSAGE: &str = "Not authorized";

/// Failures of the token pipeline. A missing credential is not an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Format is Authorization: Bearer [token]")]
    InvalidHeaderFormat,
    #[error("jwt malformed")]
    TokenMalformed,
    #[error("jwt expired")]
    TokenExpired,
    #[error("Token revoked")]
    TokenRevoked,
    #[error("Revocation store unavailable")]
    StoreUnavailable,
}

#[derive(Serialize)]
struct ErrorEntry<'a> {
    status: u16,
    detail: &'a str,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    errors: [ErrorEntry<'a>; 1],
}

/// Render the `{"errors": [{"status", "detail"}]}` body used by every error response.
pub fn json_error(status: StatusCode, detail: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            errors: [ErrorEntry {
                status: status.as_u16(),
                detail,
            }],
        }),
    )
        .into_response()
}

/// A 401 produced by the request gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRejection {
    pub detail: String,
}

impl AuthRejection {
    /// Translate a pipeline failure into the message the caller sees.
    pub fn from_error(error: &AuthError, production: bool) -> Self {
        let detail = match error {
            AuthError::InvalidHeaderFormat => BAD_FORMAT_MESSAGE,
            AuthError::TokenRevoked | AuthError::StoreUnavailable => OUTDATED_TOKEN_MESSAGE,
            AuthError::TokenMalformed => INVALID_TOKEN_MESSAGE,
            _ if production => GENERIC_MESSAGE,
            other => return Self { detail: other.to_string() },
        };
        Self {
            detail: detail.to_string(),
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        json_error(StatusCode::UNAUTHORIZED, &self.detail)
    }
}
