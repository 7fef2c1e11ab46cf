//! Bearer credential extraction.
//!
//! The `authentication` header is a deprecated alias that carries the raw
//! token with no scheme. It is only consulted when `authorization` is absent.

use axum::http::{HeaderMap, header};
use tracing::warn;

use super::errors::AuthError;

/// Deprecated alternate header name.
pub const LEGACY_HEADER: &str = "authentication";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// `authorization: Bearer <token>`
    Bearer,
    /// `authentication: <token>`
    Legacy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub source: CredentialSource,
}

/// Pull the bearer credential out of the request headers.
///
/// Returns `Ok(None)` when no credential is present. A malformed
/// `authorization` header is an error unless `passthrough` is set, in which
/// case it is treated as absent.
pub fn extract_credential(
    headers: &HeaderMap,
    passthrough: bool,
) -> Result<Option<Credential>, AuthError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(extract_legacy(headers));
    };

    let token = value.to_str().ok().and_then(parse_bearer);
    match token {
        Some(token) => Ok(Some(Credential {
            token: token.to_string(),
            source: CredentialSource::Bearer,
        })),
        None if passthrough => Ok(None),
        None => Err(AuthError::InvalidHeaderFormat),
    }
}

fn extract_legacy(headers: &HeaderMap) -> Option<Credential> {
    let value = headers.get(LEGACY_HEADER)?;
    let Ok(token) = value.to_str() else {
        warn!("Ignoring non-ASCII legacy authentication header");
        return None;
    };
    warn!(header = LEGACY_HEADER, "Deprecated authentication header used");
    Some(Credential {
        token: token.to_string(),
        source: CredentialSource::Legacy,
    })
}

/// Parse `Bearer <token>`: exactly two space-separated parts, scheme case-insensitive.
fn parse_bearer(value: &str) -> Option<&str> {
    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None)
            if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() =>
        {
            Some(token)
        }
        _ => None,
    }
}
