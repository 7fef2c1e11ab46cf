//! Bearer token authentication with role-based access control.
//!
//! Every request runs through [`authenticate`]: the credential is pulled out of
//! the `authorization` (or legacy `authentication`) header, the JWT is
//! verified, and the subject's revocation record is checked. The resolved
//! [`Principal`] is attached to the request for the [`Auth`] and
//! [`OptionalAuth`] extractors.

mod errors;
mod extract;
mod gate;
mod ip;
mod password;
mod policy;
mod principal;
mod revocation;
mod strategy;

pub use errors::{
    AuthError, AuthRejection, BAD_FORMAT_MESSAGE, INVALID_TOKEN_MESSAGE, OUTDATED_TOKEN_MESSAGE,
    json_error,
};
pub use extract::{Credential, CredentialSource, LEGACY_HEADER, extract_credential};
pub use gate::{AuthContext, AuthGate, authenticate};
pub use ip::extract_client_ip;
pub use password::{PasswordError, hash_password, verify_password};
pub use policy::{
    AdminOnly, AdminOrManager, AnyRole, AnyUser, Auth, OptionalAuth, PolicyError, Requirement,
    RoleConstraint, ServiceOnly, Staff, authorize,
};
pub use principal::{Principal, SERVICE_PRINCIPAL_ID, ServicePrincipal, UserPrincipal};
pub use revocation::{RevocationCache, RevocationChecker, RevocationError};
pub use strategy::{
    AuthStrategy, LOCAL_PROVIDER, LocalStrategy, LoginCredentials, StrategyError,
    StrategyRegistry,
};
