//! Tests for organizations and applications.

mod common;

use axum::http::StatusCode;
use common::{TestApp, create_user, request, setup, token_for};
use gatekeeper::db::{User, UserRole};
use serde_json::{Value, json};

async fn create_organization(ctx: &TestApp, token: &str, name: &str) -> String {
    let (status, body) = ctx
        .send(request(
            "POST",
            "/auth/organizations",
            Some(token),
            Some(json!({"name": name})),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    body["data"]["id"].as_str().unwrap().to_string()
}

async fn create_application(ctx: &TestApp, user: &User, body: Value) -> Value {
    let (status, body) = ctx
        .send(request(
            "POST",
            "/auth/applications",
            Some(&token_for(&ctx.jwt, user)),
            Some(body),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    body["data"].clone()
}

#[tokio::test]
async fn test_organization_crud() {
    let ctx = setup().await;
    let manager = create_user(&ctx.db, "manager@example.com", UserRole::Manager).await;
    let token = token_for(&ctx.jwt, &manager);

    let id = create_organization(&ctx, &token, "Acme").await;

    let (status, body) = ctx
        .send(request(
            "PATCH",
            &format!("/auth/organizations/{}", id),
            Some(&token),
            Some(json!({"name": "Acme Corp"})),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Acme Corp");

    let (status, body) = ctx
        .send(request(
            "GET",
            &format!("/auth/organizations/{}", id),
            Some(&token),
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], id.as_str());

    let (status, body) = ctx
        .send(request("GET", "/auth/organizations", Some(&token), None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["total"], 1);

    let (status, _) = ctx
        .send(request(
            "DELETE",
            &format!("/auth/organizations/{}", id),
            Some(&token),
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = ctx
        .send(request(
            "GET",
            &format!("/auth/organizations/{}", id),
            Some(&token),
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_organizations_require_staff_role() {
    let ctx = setup().await;
    let user = create_user(&ctx.db, "alice@example.com", UserRole::User).await;

    let (status, _) = ctx
        .send(request(
            "POST",
            "/auth/organizations",
            Some(&token_for(&ctx.jwt, &user)),
            Some(json!({"name": "Acme"})),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_organization_name_required() {
    let ctx = setup().await;
    let admin = create_user(&ctx.db, "admin@example.com", UserRole::Admin).await;

    let (status, _) = ctx
        .send(request(
            "POST",
            "/auth/organizations",
            Some(&token_for(&ctx.jwt, &admin)),
            Some(json!({"name": "   "})),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_application() {
    let ctx = setup().await;
    let alice = create_user(&ctx.db, "alice@example.com", UserRole::User).await;

    let app = create_application(&ctx, &alice, json!({"name": "Dashboard"})).await;

    assert_eq!(app["name"], "Dashboard");
    assert_eq!(app["userId"], alice.uuid.as_str());
    assert_eq!(app["organization"], Value::Null);
    assert_eq!(app["apiKeyValue"].as_str().unwrap().len(), 43);
}

#[tokio::test]
async fn test_application_with_unknown_organization() {
    let ctx = setup().await;
    let alice = create_user(&ctx.db, "alice@example.com", UserRole::User).await;

    let (status, _) = ctx
        .send(request(
            "POST",
            "/auth/applications",
            Some(&token_for(&ctx.jwt, &alice)),
            Some(json!({"name": "Dashboard", "organization": "6a1f0c1e-0000-4000-8000-000000000000"})),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_applications_visible_to_owner_and_admin_only() {
    let ctx = setup().await;
    let alice = create_user(&ctx.db, "alice@example.com", UserRole::User).await;
    let bob = create_user(&ctx.db, "bob@example.com", UserRole::User).await;
    let admin = create_user(&ctx.db, "admin@example.com", UserRole::Admin).await;

    let app = create_application(&ctx, &alice, json!({"name": "Alice app"})).await;
    create_application(&ctx, &bob, json!({"name": "Bob app"})).await;
    let app_url = format!("/auth/applications/{}", app["id"].as_str().unwrap());

    let (status, body) = ctx
        .send(request(
            "GET",
            "/auth/applications",
            Some(&token_for(&ctx.jwt, &alice)),
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["total"], 1);
    assert_eq!(body["data"][0]["name"], "Alice app");

    let (status, body) = ctx
        .send(request(
            "GET",
            "/auth/applications",
            Some(&token_for(&ctx.jwt, &admin)),
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["total"], 2);

    let (status, _) = ctx
        .send(request("GET", &app_url, Some(&token_for(&ctx.jwt, &bob)), None))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = ctx
        .send(request("DELETE", &app_url, Some(&token_for(&ctx.jwt, &bob)), None))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = ctx
        .send(request("GET", &app_url, Some(&token_for(&ctx.jwt, &admin)), None))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_update_application_organization_link() {
    let ctx = setup().await;
    let admin = create_user(&ctx.db, "admin@example.com", UserRole::Admin).await;
    let alice = create_user(&ctx.db, "alice@example.com", UserRole::User).await;
    let org = create_organization(&ctx, &token_for(&ctx.jwt, &admin), "Acme").await;

    let app = create_application(&ctx, &alice, json!({"name": "App", "organization": org})).await;
    assert_eq!(app["organization"], org.as_str());
    let app_url = format!("/auth/applications/{}", app["id"].as_str().unwrap());
    let token = token_for(&ctx.jwt, &alice);

    // Renaming alone keeps the link.
    let (status, body) = ctx
        .send(request("PATCH", &app_url, Some(&token), Some(json!({"name": "Renamed"}))))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Renamed");
    assert_eq!(body["data"]["organization"], org.as_str());

    // Explicit null detaches.
    let (status, body) = ctx
        .send(request("PATCH", &app_url, Some(&token), Some(json!({"organization": null}))))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["organization"], Value::Null);
}

#[tokio::test]
async fn test_deleting_organization_detaches_applications() {
    let ctx = setup().await;
    let admin = create_user(&ctx.db, "admin@example.com", UserRole::Admin).await;
    let admin_token = token_for(&ctx.jwt, &admin);
    let org = create_organization(&ctx, &admin_token, "Acme").await;

    let app = create_application(&ctx, &admin, json!({"name": "App", "organization": org})).await;
    let app_url = format!("/auth/applications/{}", app["id"].as_str().unwrap());

    let (status, _) = ctx
        .send(request(
            "DELETE",
            &format!("/auth/organizations/{}", org),
            Some(&admin_token),
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = ctx
        .send(request("GET", &app_url, Some(&admin_token), None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["organization"], Value::Null);
}

#[tokio::test]
async fn test_regenerate_key() {
    let ctx = setup().await;
    let alice = create_user(&ctx.db, "alice@example.com", UserRole::User).await;
    let app = create_application(&ctx, &alice, json!({"name": "App"})).await;
    let old_key = app["apiKeyValue"].as_str().unwrap().to_string();

    let (status, body) = ctx
        .send(request(
            "POST",
            &format!("/auth/applications/{}/regenerate-key", app["id"].as_str().unwrap()),
            Some(&token_for(&ctx.jwt, &alice)),
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let new_key = body["data"]["apiKeyValue"].as_str().unwrap();
    assert_ne!(new_key, old_key);

    assert!(ctx.db.applications().get_by_api_key(&old_key).await.unwrap().is_none());
    assert!(ctx.db.applications().get_by_api_key(new_key).await.unwrap().is_some());
}

#[tokio::test]
async fn test_deleting_user_deletes_applications() {
    let ctx = setup().await;
    let alice = create_user(&ctx.db, "alice@example.com", UserRole::User).await;
    create_application(&ctx, &alice, json!({"name": "App"})).await;

    let (status, _) = ctx
        .send(request(
            "DELETE",
            &format!("/auth/user/{}", alice.uuid),
            Some(&token_for(&ctx.jwt, &alice)),
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(ctx.db.applications().count(None).await.unwrap(), 0);
}
