use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use url::Url;

use super::auth::validate_password;
use super::error::{ApiError, ResultExt, validate_uuid};
use super::pagination::{PageQuery, Paginated};
use super::{Data, UserWithToken, current_user};
use crate::auth::{
    AdminOnly, AdminOrManager, Auth, AnyUser, RevocationChecker, Staff, hash_password,
    verify_password,
};
use crate::db::{Database, User, UserRole, UserSummary};
use crate::jwt::JwtConfig;

const MAX_NAME_LENGTH: usize = 100;
const MAX_PHOTO_LENGTH: usize = 2048;

#[derive(Clone)]
pub struct UsersState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
    pub revocations: Arc<RevocationChecker>,
    pub public_url: Url,
}

pub fn router(state: UsersState) -> Router {
    Router::new()
        .route("/", get(list_users))
        .route("/me", get(get_me).patch(update_me))
        .route("/me/password", post(change_password))
        .route("/{id}", get(get_user).delete(delete_user))
        .route("/{id}/role", patch(set_role))
        .with_state(state)
}

async fn get_user_by_uuid(db: &Database, uuid: &str) -> Result<User, ApiError> {
    validate_uuid(uuid)?;
    db.users()
        .get_by_uuid(uuid)
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiError::not_found("User not found"))
}

async fn list_users(
    State(state): State<UsersState>,
    _auth: Auth<AdminOrManager>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = query.page();
    let total = state.db.users().count().await.db_err("Failed to count users")?;
    let users = state
        .db
        .users()
        .list(page.limit(), page.offset())
        .await
        .db_err("Failed to list users")?;

    let body = Paginated::new(
        users.into_iter().map(UserSummary::from).collect(),
        page,
        total,
        &state.public_url,
        "/auth/user",
    )
    .internal_err("Failed to build pagination links")?;

    Ok(Json(body))
}

async fn get_me(
    State(state): State<UsersState>,
    auth: Auth<AnyUser>,
) -> Result<impl IntoResponse, ApiError> {
    let user = current_user(&state.db, &auth.principal).await?;
    Ok(Json(Data {
        data: UserSummary::from(user),
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateProfileRequest {
    name: Option<String>,
    photo: Option<String>,
    extra_user_data: Option<serde_json::Value>,
}

async fn update_me(
    State(state): State<UsersState>,
    auth: Auth<AnyUser>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = current_user(&state.db, &auth.principal).await?;

    let name = payload.name.as_deref().map(str::trim);
    if name.is_some_and(|n| n.chars().count() > MAX_NAME_LENGTH) {
        return Err(ApiError::bad_request("Name is too long"));
    }
    if payload
        .photo
        .as_deref()
        .is_some_and(|p| p.len() > MAX_PHOTO_LENGTH)
    {
        return Err(ApiError::bad_request("Photo URL is too long"));
    }
    if payload
        .extra_user_data
        .as_ref()
        .is_some_and(|v| !v.is_object())
    {
        return Err(ApiError::bad_request("extraUserData must be an object"));
    }

    state
        .db
        .users()
        .update_profile(
            user.id,
            name,
            payload.photo.as_deref(),
            payload.extra_user_data.as_ref(),
        )
        .await
        .db_err("Failed to update profile")?;

    let user = current_user(&state.db, &auth.principal).await?;
    Ok(Json(Data {
        data: UserSummary::from(user),
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangePasswordRequest {
    current_password: String,
    new_password: String,
}

/// Change the caller's password, invalidate older tokens and hand back a new one.
async fn change_password(
    State(state): State<UsersState>,
    auth: Auth<AnyUser>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = current_user(&state.db, &auth.principal).await?;
    let hash = user
        .password_hash
        .clone()
        .ok_or_else(|| ApiError::bad_request("Account has no password"))?;

    let matches = verify_password(payload.current_password, hash)
        .await
        .internal_err("Failed to verify password")?;
    if !matches {
        return Err(ApiError::forbidden("Current password is incorrect"));
    }

    validate_password(&payload.new_password)?;
    let new_hash = hash_password(payload.new_password)
        .await
        .internal_err("Failed to hash password")?;

    state
        .db
        .users()
        .set_password_hash(user.id, &new_hash)
        .await
        .db_err("Failed to update password")?;
    let revoked_at = state
        .revocations
        .revoke(&user.uuid)
        .await
        .db_err("Failed to revoke tokens")?;

    let token = state
        .jwt
        .issue_user_token_not_before(&user, revoked_at)
        .internal_err("Failed to create token")?;

    info!(user = %user.uuid, "Password changed");

    Ok(Json(UserWithToken {
        data: user.into(),
        token: token.token,
    }))
}

async fn get_user(
    State(state): State<UsersState>,
    _auth: Auth<Staff>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user = get_user_by_uuid(&state.db, &id).await?;
    Ok(Json(Data {
        data: UserSummary::from(user),
    }))
}

#[derive(Deserialize)]
struct SetRoleRequest {
    role: UserRole,
}

/// Change a user's role. Tokens carry the role, so existing ones are revoked.
async fn set_role(
    State(state): State<UsersState>,
    auth: Auth<AdminOnly>,
    Path(id): Path<String>,
    Json(payload): Json<SetRoleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = get_user_by_uuid(&state.db, &id).await?;

    if user.uuid == auth.principal.id() && payload.role != UserRole::Admin {
        return Err(ApiError::bad_request("Admins cannot demote themselves"));
    }

    state
        .db
        .users()
        .set_role(user.id, payload.role)
        .await
        .db_err("Failed to update role")?;
    state
        .revocations
        .revoke(&user.uuid)
        .await
        .db_err("Failed to revoke tokens")?;

    info!(user = %user.uuid, role = %payload.role.as_str(), by = %auth.principal.id(), "Role changed");

    let user = get_user_by_uuid(&state.db, &id).await?;
    Ok(Json(Data {
        data: UserSummary::from(user),
    }))
}

async fn delete_user(
    State(state): State<UsersState>,
    auth: Auth,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let principal = &auth.principal;
    let is_self = principal.id() == id;
    let is_admin = principal.role() == Some(UserRole::Admin);

    if !is_self && !is_admin && !principal.is_service() {
        return Err(ApiError::forbidden("You can only delete your own account"));
    }

    let user = get_user_by_uuid(&state.db, &id).await?;

    state
        .revocations
        .revoke(&user.uuid)
        .await
        .db_err("Failed to revoke tokens")?;

    let deleted = state
        .db
        .users()
        .delete(user.id)
        .await
        .db_err("Failed to delete user")?;

    if !deleted {
        return Err(ApiError::not_found("User not found"));
    }

    info!(user = %user.uuid, by = %principal.id(), "User deleted");

    Ok(StatusCode::NO_CONTENT)
}
