// ABOUTME: End-to-end HTTP tests through the tenant gate, authentication, authorization, and request transaction
// ABOUTME: Exercises the accounting routes, tenant isolation, role enforcement, audit listing, and rollback on error
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::middleware::from_fn_with_state;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tessera_core::models::UserId;
use tessera_server::accounting::{AccountKind, NewAccount};
use tessera_server::errors::AppError;
use tessera_server::middleware::{authenticate, tenant_gate};
use tessera_server::permissions::Permission;
use tessera_server::resources::ServerResources;
use tessera_server::routes::guarded;

use common::TestApp;

fn account_body(code: &str, name: &str, kind: &str) -> Value {
    json!({ "code": code, "name": name, "kind": kind })
}

fn error_code(body: &Value) -> &str {
    body["error"]["code"].as_str().unwrap_or_default()
}

#[tokio::test]
async fn health_needs_no_tenant() -> Result<()> {
    let app = TestApp::new().await?;
    let (status, body) = app.send(Method::GET, "/", None, None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["open_connections"], 0);
    Ok(())
}

#[tokio::test]
async fn missing_tenant_header_is_rejected_before_any_connection() -> Result<()> {
    let app = TestApp::new().await?;
    let token = app.owner_token("aaa").await?;

    let (status, body) = app
        .send(Method::GET, "/api/accounts", None, Some(&token), None)
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "MISSING_REQUIRED_FIELD");

    let (status, _) = app
        .send(Method::GET, "/api/accounts", Some("bad tenant!"), Some(&token), None)
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.resources.database.open_connections(), 0);
    Ok(())
}

#[tokio::test]
async fn identity_problems_are_rejected() -> Result<()> {
    let app = TestApp::new().await?;
    let token = app.owner_token("aaa").await?;

    let (status, body) = app
        .send(Method::GET, "/api/accounts", Some("aaa"), None, None)
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "AUTH_REQUIRED");

    let (status, body) = app.get("/api/accounts", "aaa", "not-a-jwt").await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "AUTH_INVALID");

    let (status, body) = app.get("/api/accounts", "bbb", &token).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), "PERMISSION_DENIED");
    Ok(())
}

#[tokio::test]
async fn tenants_see_only_their_own_accounts() -> Result<()> {
    let app = TestApp::new().await?;
    let aaa = app.owner_token("aaa").await?;
    let bbb = app.owner_token("bbb").await?;

    let (status, created) = app
        .post("/api/accounts", "aaa", &aaa, account_body("1000", "Cash", "asset"))
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["tenant_id"], "aaa");
    let id = created["id"].as_str().unwrap().to_owned();

    let (status, listed) = app.get("/api/accounts", "aaa", &aaa).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, listed) = app.get("/api/accounts", "bbb", &bbb).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed, json!([]));

    let uri = format!("/api/accounts/{id}");
    let (status, _) = app.get(&uri, "bbb", &bbb).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app
        .send(Method::PATCH, &uri, Some("bbb"), Some(&bbb), Some(json!({ "name": "Mine" })))
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app
        .send(Method::DELETE, &uri, Some("bbb"), Some(&bbb), None)
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, fetched) = app.get(&uri, "aaa", &aaa).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["name"], "Cash");
    assert_eq!(app.resources.database.open_connections(), 0);
    Ok(())
}

#[tokio::test]
async fn account_lifecycle_within_a_tenant() -> Result<()> {
    let app = TestApp::new().await?;
    let token = app.owner_token("aaa").await?;

    let (_, created) = app
        .post("/api/accounts", "aaa", &token, account_body("6100", "Rent", "expense"))
        .await?;
    let uri = format!("/api/accounts/{}", created["id"].as_str().unwrap());

    let (status, renamed) = app
        .send(Method::PATCH, &uri, Some("aaa"), Some(&token), Some(json!({ "name": "Office rent" })))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(renamed["name"], "Office rent");

    let (status, body) = app
        .post("/api/accounts", "aaa", &token, account_body("6100", "Again", "expense"))
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "RESOURCE_ALREADY_EXISTS");

    let (status, _) = app
        .send(Method::DELETE, &uri, Some("aaa"), Some(&token), None)
        .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.get(&uri, "aaa", &token).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn journal_postings_feed_the_trial_balance() -> Result<()> {
    let app = TestApp::new().await?;
    let aaa = app.owner_token("aaa").await?;
    let bbb = app.owner_token("bbb").await?;
    app.post("/api/accounts", "aaa", &aaa, account_body("1000", "Cash", "asset"))
        .await?;
    app.post("/api/accounts", "aaa", &aaa, account_body("4000", "Sales", "revenue"))
        .await?;

    let (status, posted) = app
        .post(
            "/api/journal-entries",
            "aaa",
            &aaa,
            json!({
                "description": "Cash sale",
                "lines": [
                    { "account_code": "1000", "debit": 1000 },
                    { "account_code": "4000", "credit": 1000 },
                ],
            }),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(posted["lines"].as_array().unwrap().len(), 2);
    assert!(posted["entry"]["posted_by"].is_string());

    let (status, body) = app
        .post(
            "/api/journal-entries",
            "aaa",
            &aaa,
            json!({
                "lines": [
                    { "account_code": "1000", "debit": 500 },
                    { "account_code": "4000", "credit": 400 },
                ],
            }),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "INVALID_INPUT");

    // An account of another tenant cannot be posted to.
    let (status, _) = app
        .post(
            "/api/journal-entries",
            "bbb",
            &bbb,
            json!({
                "lines": [
                    { "account_code": "1000", "debit": 10 },
                    { "account_code": "4000", "credit": 10 },
                ],
            }),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, report) = app.get("/api/reports/trial-balance", "aaa", &aaa).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["total_debit"], 1000);
    assert_eq!(report["total_credit"], 1000);
    assert_eq!(report["balance"], 0);
    let codes: Vec<&str> = report["accounts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["code"].as_str().unwrap())
        .collect();
    assert_eq!(codes, vec!["1000", "4000"]);

    let (_, report) = app.get("/api/reports/trial-balance", "bbb", &bbb).await?;
    assert_eq!(report["accounts"], json!([]));
    assert_eq!(report["total_debit"], 0);
    Ok(())
}

#[tokio::test]
async fn viewer_can_read_but_not_write() -> Result<()> {
    let app = TestApp::new().await?;
    let owner = app.owner_token("aaa").await?;
    app.post("/api/accounts", "aaa", &owner, account_body("1000", "Cash", "asset"))
        .await?;
    let viewer = common::token_for(&app.resources, "aaa", UserId::new_random(), &["viewer"]);

    let (status, listed) = app.get("/api/accounts", "aaa", &viewer).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, body) = app
        .post("/api/accounts", "aaa", &viewer, account_body("2000", "Loan", "liability"))
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), "PERMISSION_DENIED");

    let (status, _) = app.get("/api/audit", "aaa", &viewer).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn caller_can_list_own_permissions() -> Result<()> {
    let app = TestApp::new().await?;
    let owner = app.owner_token("aaa").await?;

    let (status, body) = app.get("/api/me/permissions", "aaa", &owner).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tenant_id"], "aaa");
    let permissions: Vec<&str> = body["permissions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p.as_str().unwrap())
        .collect();
    assert_eq!(permissions.len(), Permission::ALL.len());
    assert!(permissions.contains(&"journal:post"));

    let (status, _) = app.get("/api/me/permissions", "bbb", &owner).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn audit_listing_shows_tenant_mutations() -> Result<()> {
    let app = TestApp::new().await?;
    let aaa = app.owner_token("aaa").await?;
    let bbb = app.owner_token("bbb").await?;
    let (_, created) = app
        .post("/api/accounts", "aaa", &aaa, account_body("1000", "Cash", "asset"))
        .await?;

    let (status, entries) = app.get("/api/audit?table=accounts", "aaa", &aaa).await?;
    assert_eq!(status, StatusCode::OK);
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["action"], "insert");
    assert_eq!(entries[0]["entity_id"], created["id"]);

    let (_, entries) = app.get("/api/audit?table=accounts", "bbb", &bbb).await?;
    assert_eq!(entries, json!([]));
    Ok(())
}

async fn create_then_fail(
    State(resources): State<Arc<ServerResources>>,
) -> Result<Json<Value>, AppError> {
    resources
        .accounting
        .create_account(NewAccount {
            code: "9999".to_owned(),
            name: "Doomed".to_owned(),
            kind: AccountKind::Equity,
        })
        .await?;
    Err(AppError::invalid_input("handler failed after writing"))
}

#[tokio::test]
async fn failed_handler_rolls_back_its_writes() -> Result<()> {
    let app = TestApp::new().await?;
    let token = app.owner_token("aaa").await?;
    let resources = Arc::clone(&app.resources);

    let failing = TestApp {
        router: Router::new()
            .route(
                "/api/fail",
                guarded(post(create_then_fail), &resources, Permission::AccountsWrite),
            )
            .with_state(Arc::clone(&resources))
            .layer(from_fn_with_state(Arc::clone(&resources), authenticate))
            .layer(from_fn_with_state(Arc::clone(&resources), tenant_gate)),
        resources,
    };
    let (status, _) = failing
        .send(Method::POST, "/api/fail", Some("aaa"), Some(&token), None)
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.resources.database.open_connections(), 0);

    let (_, listed) = app.get("/api/accounts", "aaa", &token).await?;
    assert_eq!(listed, json!([]));
    let (_, entries) = app.get("/api/audit?table=accounts", "aaa", &token).await?;
    assert_eq!(entries, json!([]));
    Ok(())
}
