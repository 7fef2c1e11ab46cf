//! The request gate: extractor, validator and revocation checker composed
//! into one middleware.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::debug;

use super::errors::{AuthError, AuthRejection};
use super::extract::extract_credential;
use super::principal::Principal;
use super::revocation::RevocationChecker;
use crate::jwt::JwtConfig;

/// Authentication outcome attached to request extensions.
///
/// With passthrough enabled a failed validation leaves `principal` empty and
/// records the failure in `error` so handlers can decide whether to enforce it.
/// `rejection` is what the caller is shown if they do.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    pub principal: Option<Principal>,
    pub error: Option<AuthError>,
    pub rejection: Option<AuthRejection>,
}

pub struct AuthGate {
    jwt: Arc<JwtConfig>,
    revocations: Arc<RevocationChecker>,
    passthrough: bool,
    production: bool,
}

impl AuthGate {
    pub fn new(
        jwt: Arc<JwtConfig>,
        revocations: Arc<RevocationChecker>,
        passthrough: bool,
        production: bool,
    ) -> Self {
        Self {
            jwt,
            revocations,
            passthrough,
            production,
        }
    }

    /// Run the pipeline over the request headers.
    pub async fn evaluate(&self, headers: &HeaderMap) -> Result<AuthContext, AuthRejection> {
        let credential = extract_credential(headers, self.passthrough)
            .map_err(|e| self.reject(e))?;

        let Some(credential) = credential else {
            return Ok(AuthContext::default());
        };

        match self.resolve(&credential.token).await {
            Ok(principal) => Ok(AuthContext {
                principal: Some(principal),
                ..AuthContext::default()
            }),
            Err(
                e @ (AuthError::TokenRevoked
                | AuthError::StoreUnavailable
                | AuthError::TokenMalformed
                | AuthError::InvalidHeaderFormat),
            ) => Err(self.reject(e)),
            Err(e) if self.passthrough => {
                debug!(error = %e, "Token rejected, continuing without principal");
                Ok(AuthContext {
                    principal: None,
                    rejection: Some(AuthRejection::from_error(&e, self.production)),
                    error: Some(e),
                })
            }
            Err(e) => Err(self.reject(e)),
        }
    }

    async fn resolve(&self, token: &str) -> Result<Principal, AuthError> {
        let claims = self.jwt.validate_token(token)?;
        let principal = Principal::from_claims(claims.clone());

        // Trusted internal callers have no revocation record.
        if !principal.is_service() {
            self.revocations.check(&claims).await?;
        }

        Ok(principal)
    }

    fn reject(&self, error: AuthError) -> AuthRejection {
        debug!(error = %error, "Rejecting request");
        AuthRejection::from_error(&error, self.production)
    }
}

/// Middleware attaching an [`AuthContext`] to every request, or rejecting it with 401.
pub async fn authenticate(
    State(gate): State<Arc<AuthGate>>,
    mut request: Request,
    next: Next,
) -> Response {
    match gate.evaluate(request.headers()).await {
        Ok(context) => {
            request.extensions_mut().insert(context);
            next.run(request).await
        }
        Err(rejection) => rejection.into_response(),
    }
}
