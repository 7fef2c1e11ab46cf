//! Role-based authorization over the resolved principal.
//!
//! Every check is the same two steps: is there a principal, and does it
//! satisfy one of the required roles. [`authorize`] does both; the [`Auth`]
//! extractor applies it with a [`RoleConstraint`] chosen at the type level.

use std::marker::PhantomData;

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};

use super::errors::{AuthRejection, json_error};
use super::gate::AuthContext;
use super::principal::Principal;
use crate::db::UserRole;

/// One acceptable kind of caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Role(UserRole),
    Service,
}

impl Requirement {
    fn is_met_by(&self, principal: &Principal) -> bool {
        match self {
            Requirement::Role(role) => principal.role() == Some(*role),
            Requirement::Service => principal.is_service(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// No principal. Carries the rejection the gate recorded under passthrough, if any.
    NotAuthenticated(Option<AuthRejection>),
    InsufficientRole,
}

impl IntoResponse for PolicyError {
    fn into_response(self) -> Response {
        match self {
            PolicyError::NotAuthenticated(Some(rejection)) => rejection.into_response(),
            PolicyError::NotAuthenticated(None) => {
                json_error(StatusCode::UNAUTHORIZED, "Not authenticated")
            }
            PolicyError::InsufficientRole => {
                json_error(StatusCode::FORBIDDEN, "Insufficient permissions")
            }
        }
    }
}

/// Check that a principal is present and meets one of `required`.
/// An empty `required` accepts any principal.
pub fn authorize<'a>(
    principal: Option<&'a Principal>,
    required: &[Requirement],
) -> Result<&'a Principal, PolicyError> {
    let principal = principal.ok_or(PolicyError::NotAuthenticated(None))?;

    if required.is_empty() || required.iter().any(|r| r.is_met_by(principal)) {
        Ok(principal)
    } else {
        Err(PolicyError::InsufficientRole)
    }
}

/// Type-level set of requirements for the [`Auth`] extractor.
pub trait RoleConstraint: Send + Sync + 'static {
    const REQUIRED: &'static [Requirement];
}

/// Any authenticated principal, including the service principal.
pub struct AnyRole;
impl RoleConstraint for AnyRole {
    const REQUIRED: &'static [Requirement] = &[];
}

/// Any user principal.
pub struct AnyUser;
impl RoleConstraint for AnyUser {
    const REQUIRED: &'static [Requirement] = &[
        Requirement::Role(UserRole::Admin),
        Requirement::Role(UserRole::Manager),
        Requirement::Role(UserRole::User),
    ];
}

pub struct AdminOnly;
impl RoleConstraint for AdminOnly {
    const REQUIRED: &'static [Requirement] = &[Requirement::Role(UserRole::Admin)];
}

pub struct AdminOrManager;
impl RoleConstraint for AdminOrManager {
    const REQUIRED: &'static [Requirement] = &[
        Requirement::Role(UserRole::Admin),
        Requirement::Role(UserRole::Manager),
    ];
}

/// Admins, managers and trusted services.
pub struct Staff;
impl RoleConstraint for Staff {
    const REQUIRED: &'static [Requirement] = &[
        Requirement::Role(UserRole::Admin),
        Requirement::Role(UserRole::Manager),
        Requirement::Service,
    ];
}

pub struct ServiceOnly;
impl RoleConstraint for ServiceOnly {
    const REQUIRED: &'static [Requirement] = &[Requirement::Service];
}

/// Extractor for endpoints that require a principal satisfying `C`.
pub struct Auth<C: RoleConstraint = AnyRole> {
    pub principal: Principal,
    _constraint: PhantomData<C>,
}

impl<S, C> FromRequestParts<S> for Auth<C>
where
    S: Send + Sync,
    C: RoleConstraint,
{
    type Rejection = PolicyError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let context = parts.extensions.get::<AuthContext>();
        let principal = context.and_then(|c| c.principal.as_ref());

        match authorize(principal, C::REQUIRED) {
            Ok(principal) => Ok(Auth {
                principal: principal.clone(),
                _constraint: PhantomData,
            }),
            Err(PolicyError::NotAuthenticated(_)) => Err(PolicyError::NotAuthenticated(
                context.and_then(|c| c.rejection.clone()),
            )),
            Err(e) => Err(e),
        }
    }
}

/// Optional authentication extractor - never fails.
/// Useful for endpoints that work both authenticated and unauthenticated.
pub struct OptionalAuth(pub Option<Principal>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalAuth(
            parts
                .extensions
                .get::<AuthContext>()
                .and_then(|c| c.principal.clone()),
        ))
    }
}
