mod applications;
mod auth;
mod error;
mod organizations;
mod pagination;
mod users;

use axum::Router;
use serde::Serialize;
use std::sync::Arc;
use url::Url;

use crate::auth::{Principal, RevocationChecker, StrategyRegistry};
use crate::db::{Database, User, UserSummary};
use crate::jwt::JwtConfig;
use crate::rate_limit::RateLimitConfig;

pub use error::{ApiError, ResultExt};
pub use pagination::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, Page, PageQuery, Paginated};

/// Everything the API routers need, assembled once by `create_app`.
#[derive(Clone)]
pub struct ApiDeps {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
    pub revocations: Arc<RevocationChecker>,
    pub strategies: Arc<StrategyRegistry>,
    pub rate_limit: Arc<RateLimitConfig>,
    pub public_url: Url,
}

/// Create the API router. Mounted under `/auth`.
pub fn create_api_router(deps: ApiDeps) -> Router {
    let auth_state = auth::AuthState {
        db: deps.db.clone(),
        jwt: deps.jwt.clone(),
        revocations: deps.revocations.clone(),
        strategies: deps.strategies,
    };

    let users_state = users::UsersState {
        db: deps.db.clone(),
        jwt: deps.jwt,
        revocations: deps.revocations,
        public_url: deps.public_url.clone(),
    };

    let organizations_state = organizations::OrganizationsState {
        db: deps.db.clone(),
        public_url: deps.public_url.clone(),
    };

    let applications_state = applications::ApplicationsState {
        db: deps.db,
        public_url: deps.public_url,
    };

    Router::new()
        .merge(auth::router(auth_state, deps.rate_limit))
        .nest("/user", users::router(users_state))
        .nest("/organizations", organizations::router(organizations_state))
        .nest("/applications", applications::router(applications_state))
}

/// `{"data": ...}` envelope.
#[derive(Serialize)]
pub(crate) struct Data<T> {
    pub data: T,
}

/// A user together with a freshly issued token.
#[derive(Serialize)]
pub(crate) struct UserWithToken {
    pub data: UserSummary,
    pub token: String,
}

/// Load the stored user behind a user principal.
/// A valid token whose user has since been deleted is treated as unauthenticated.
pub(crate) async fn current_user(db: &Database, principal: &Principal) -> Result<User, ApiError> {
    db.users()
        .get_by_uuid(principal.id())
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiError::unauthorized("User no longer exists"))
}
