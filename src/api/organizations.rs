use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use url::Url;

use super::Data;
use super::error::{ApiError, ResultExt, validate_name, validate_uuid};
use super::pagination::{PageQuery, Paginated};
use crate::auth::{AdminOrManager, Auth};
use crate::db::{Database, Organization, OrganizationSummary};

const MAX_NAME_LENGTH: usize = 100;

#[derive(Clone)]
pub struct OrganizationsState {
    pub db: Database,
    pub public_url: Url,
}

pub fn router(state: OrganizationsState) -> Router {
    Router::new()
        .route("/", get(list_organizations).post(create_organization))
        .route(
            "/{id}",
            get(get_organization)
                .patch(update_organization)
                .delete(delete_organization),
        )
        .with_state(state)
}

async fn load(db: &Database, uuid: &str) -> Result<Organization, ApiError> {
    validate_uuid(uuid)?;
    db.organizations()
        .get_by_uuid(uuid)
        .await
        .db_err("Failed to get organization")?
        .ok_or_else(|| ApiError::not_found("Organization not found"))
}

async fn list_organizations(
    State(state): State<OrganizationsState>,
    _auth: Auth<AdminOrManager>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = query.page();
    let total = state
        .db
        .organizations()
        .count()
        .await
        .db_err("Failed to count organizations")?;
    let organizations = state
        .db
        .organizations()
        .list(page.limit(), page.offset())
        .await
        .db_err("Failed to list organizations")?;

    let body = Paginated::new(
        organizations
            .into_iter()
            .map(OrganizationSummary::from)
            .collect(),
        page,
        total,
        &state.public_url,
        "/auth/organizations",
    )
    .internal_err("Failed to build pagination links")?;

    Ok(Json(body))
}

async fn get_organization(
    State(state): State<OrganizationsState>,
    _auth: Auth<AdminOrManager>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let organization = load(&state.db, &id).await?;
    Ok(Json(Data {
        data: OrganizationSummary::from(organization),
    }))
}

#[derive(Deserialize)]
struct OrganizationRequest {
    name: String,
}

async fn create_organization(
    State(state): State<OrganizationsState>,
    _auth: Auth<AdminOrManager>,
    Json(payload): Json<OrganizationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = validate_name("Name", &payload.name, MAX_NAME_LENGTH)?;
    let uuid = uuid::Uuid::new_v4().to_string();

    state
        .db
        .organizations()
        .create(&uuid, name)
        .await
        .db_err("Failed to create organization")?;

    let organization = load(&state.db, &uuid).await?;
    Ok((
        StatusCode::CREATED,
        Json(Data {
            data: OrganizationSummary::from(organization),
        }),
    ))
}

async fn update_organization(
    State(state): State<OrganizationsState>,
    _auth: Auth<AdminOrManager>,
    Path(id): Path<String>,
    Json(payload): Json<OrganizationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = validate_name("Name", &payload.name, MAX_NAME_LENGTH)?;
    let organization = load(&state.db, &id).await?;

    state
        .db
        .organizations()
        .rename(organization.id, name)
        .await
        .db_err("Failed to update organization")?;

    let organization = load(&state.db, &id).await?;
    Ok(Json(Data {
        data: OrganizationSummary::from(organization),
    }))
}

/// Delete an organization. Its applications stay, detached.
async fn delete_organization(
    State(state): State<OrganizationsState>,
    _auth: Auth<AdminOrManager>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let organization = load(&state.db, &id).await?;

    state
        .db
        .organizations()
        .delete(organization.id)
        .await
        .db_err("Failed to delete organization")?;

    Ok(StatusCode::NO_CONTENT)
}
