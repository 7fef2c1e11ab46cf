//! Resolved request identities.

use serde::Serialize;

use crate::db::UserRole;
use crate::jwt::TokenClaims;

/// Subject identifier of trusted inter-service callers.
pub const SERVICE_PRINCIPAL_ID: &str = "microservice";

/// The identity attached to an authenticated request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Principal {
    Service(ServicePrincipal),
    User(UserPrincipal),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServicePrincipal {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPrincipal {
    pub id: String,
    pub role: UserRole,
    pub provider: Option<String>,
    pub provider_id: Option<String>,
    pub created_at: Option<String>,
    pub extra_user_data: Option<serde_json::Value>,
    pub email: Option<String>,
    pub photo: Option<String>,
    pub name: Option<String>,
}

impl Principal {
    pub fn from_claims(claims: TokenClaims) -> Self {
        if claims.sub == SERVICE_PRINCIPAL_ID {
            return Principal::Service(ServicePrincipal { id: claims.sub });
        }

        Principal::User(UserPrincipal {
            id: claims.sub,
            // Tokens without a role claim get the least privileged role.
            role: claims.role.unwrap_or(UserRole::User),
            provider: claims.provider,
            provider_id: claims.provider_id,
            created_at: claims.created_at,
            extra_user_data: claims.extra_user_data,
            email: claims.email,
            photo: claims.photo,
            name: claims.name,
        })
    }

    pub fn id(&self) -> &str {
        match self {
            Principal::Service(service) => &service.id,
            Principal::User(user) => &user.id,
        }
    }

    pub fn role(&self) -> Option<UserRole> {
        match self {
            Principal::Service(_) => None,
            Principal::User(user) => Some(user.role),
        }
    }

    pub fn is_service(&self) -> bool {
        matches!(self, Principal::Service(_))
    }

    pub fn as_user(&self) -> Option<&UserPrincipal> {
        match self {
            Principal::User(user) => Some(user),
            Principal::Service(_) => None,
        }
    }
}
