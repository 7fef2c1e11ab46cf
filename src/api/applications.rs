//! Client applications and their API keys.
//!
//! Owners only ever see their own applications; admins see all of them.
//! An application that exists but is not visible to the caller is reported
//! as not found.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use serde::{Deserialize, Deserializer};
use url::Url;

use super::error::{ApiError, ResultExt, validate_name, validate_uuid};
use super::pagination::{PageQuery, Paginated};
use super::{Data, current_user};
use crate::auth::{AnyUser, Auth};
use crate::db::{Application, ApplicationSummary, Database, NewApplication, User, UserRole};

const MAX_NAME_LENGTH: usize = 100;
const API_KEY_BYTES: usize = 32;

#[derive(Clone)]
pub struct ApplicationsState {
    pub db: Database,
    pub public_url: Url,
}

pub fn router(state: ApplicationsState) -> Router {
    Router::new()
        .route("/", get(list_applications).post(create_application))
        .route(
            "/{id}",
            get(get_application)
                .patch(update_application)
                .delete(delete_application),
        )
        .route("/{id}/regenerate-key", post(regenerate_key))
        .with_state(state)
}

fn generate_api_key() -> String {
    let mut bytes = [0u8; API_KEY_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Distinguishes an absent field from an explicit `null`.
fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

/// `None` for admins, otherwise the caller's user id.
fn owner_filter(user: &User) -> Option<i64> {
    (user.role != UserRole::Admin).then_some(user.id)
}

async fn load_visible(db: &Database, user: &User, uuid: &str) -> Result<Application, ApiError> {
    validate_uuid(uuid)?;
    let app = db
        .applications()
        .get_by_uuid(uuid)
        .await
        .db_err("Failed to get application")?
        .ok_or_else(|| ApiError::not_found("Application not found"))?;

    match owner_filter(user) {
        Some(owner) if owner != app.user_id => Err(ApiError::not_found("Application not found")),
        _ => Ok(app),
    }
}

async fn resolve_organization(db: &Database, uuid: &str) -> Result<i64, ApiError> {
    validate_uuid(uuid)?;
    db.organizations()
        .get_by_uuid(uuid)
        .await
        .db_err("Failed to get organization")?
        .map(|org| org.id)
        .ok_or_else(|| ApiError::bad_request("Organization not found"))
}

async fn list_applications(
    State(state): State<ApplicationsState>,
    auth: Auth<AnyUser>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user = current_user(&state.db, &auth.principal).await?;
    let owner = owner_filter(&user);
    let page = query.page();

    let total = state
        .db
        .applications()
        .count(owner)
        .await
        .db_err("Failed to count applications")?;
    let apps = state
        .db
        .applications()
        .list(owner, page.limit(), page.offset())
        .await
        .db_err("Failed to list applications")?;

    let body = Paginated::new(
        apps.into_iter().map(ApplicationSummary::from).collect(),
        page,
        total,
        &state.public_url,
        "/auth/applications",
    )
    .internal_err("Failed to build pagination links")?;

    Ok(Json(body))
}

async fn get_application(
    State(state): State<ApplicationsState>,
    auth: Auth<AnyUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user = current_user(&state.db, &auth.principal).await?;
    let app = load_visible(&state.db, &user, &id).await?;
    Ok(Json(Data {
        data: ApplicationSummary::from(app),
    }))
}

#[derive(Deserialize)]
struct CreateApplicationRequest {
    name: String,
    organization: Option<String>,
}

async fn create_application(
    State(state): State<ApplicationsState>,
    auth: Auth<AnyUser>,
    Json(payload): Json<CreateApplicationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = current_user(&state.db, &auth.principal).await?;
    let name = validate_name("Name", &payload.name, MAX_NAME_LENGTH)?;
    let organization_id = match payload.organization.as_deref() {
        Some(org) => Some(resolve_organization(&state.db, org).await?),
        None => None,
    };

    let uuid = uuid::Uuid::new_v4().to_string();
    let api_key = generate_api_key();

    state
        .db
        .applications()
        .create(&NewApplication {
            uuid: &uuid,
            name,
            api_key: &api_key,
            user_id: user.id,
            organization_id,
        })
        .await
        .db_err("Failed to create application")?;

    let app = load_visible(&state.db, &user, &uuid).await?;
    Ok((
        StatusCode::CREATED,
        Json(Data {
            data: ApplicationSummary::from(app),
        }),
    ))
}

#[derive(Deserialize)]
struct UpdateApplicationRequest {
    name: Option<String>,
    /// Absent keeps the link, `null` detaches, a UUID re-links.
    #[serde(default, deserialize_with = "deserialize_some")]
    organization: Option<Option<String>>,
}

async fn update_application(
    State(state): State<ApplicationsState>,
    auth: Auth<AnyUser>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateApplicationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = current_user(&state.db, &auth.principal).await?;
    let app = load_visible(&state.db, &user, &id).await?;

    let name = match payload.name.as_deref() {
        Some(name) => validate_name("Name", name, MAX_NAME_LENGTH)?.to_string(),
        None => app.name.clone(),
    };
    let organization_id = match payload.organization {
        None => app.organization_id,
        Some(None) => None,
        Some(Some(org)) => Some(resolve_organization(&state.db, &org).await?),
    };

    state
        .db
        .applications()
        .update(app.id, &name, organization_id)
        .await
        .db_err("Failed to update application")?;

    let app = load_visible(&state.db, &user, &id).await?;
    Ok(Json(Data {
        data: ApplicationSummary::from(app),
    }))
}

async fn delete_application(
    State(state): State<ApplicationsState>,
    auth: Auth<AnyUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user = current_user(&state.db, &auth.principal).await?;
    let app = load_visible(&state.db, &user, &id).await?;

    state
        .db
        .applications()
        .delete(app.id)
        .await
        .db_err("Failed to delete application")?;

    Ok(StatusCode::NO_CONTENT)
}

/// Replace the API key. The old key stops matching immediately.
async fn regenerate_key(
    State(state): State<ApplicationsState>,
    auth: Auth<AnyUser>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user = current_user(&state.db, &auth.principal).await?;
    let app = load_visible(&state.db, &user, &id).await?;

    state
        .db
        .applications()
        .set_api_key(app.id, &generate_api_key())
        .await
        .db_err("Failed to regenerate API key")?;

    let app = load_visible(&state.db, &user, &id).await?;
    Ok(Json(Data {
        data: ApplicationSummary::from(app),
    }))
}
