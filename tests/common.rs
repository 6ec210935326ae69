// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: Provides in-process databases, tenant bootstrap, token minting, and HTTP request helpers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]
#![allow(
    dead_code,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]
//! Shared test utilities for `tessera_server`

use std::env;
use std::future::Future;
use std::sync::{Arc, Once};

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tessera_core::models::{TenantId, UserId};
use tessera_server::config::environment::ServerConfig;
use tessera_server::context::{self, TenantStore};
use tessera_server::database::Database;
use tessera_server::errors::AppResult;
use tessera_server::middleware::run_in_request_transaction;
use tessera_server::permissions::provision_tenant_roles;
use tessera_server::resources::{prepare_database, ServerResources};
use tessera_server::server::build_router;
use tower::ServiceExt;

pub const TEST_JWT_SECRET: &str = "integration-test-secret-0123456789abcdef";

static INIT_LOGGER: Once = Once::new();

/// Install a quiet test subscriber once per process; `TEST_LOG` raises the level
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            Ok("WARN" | "ERROR") | _ => tracing::Level::WARN,
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .init();
    });
}

pub fn test_config() -> ServerConfig {
    ServerConfig::in_memory(TEST_JWT_SECRET)
}

pub fn tenant(id: &str) -> TenantId {
    TenantId::parse(id).unwrap()
}

/// In-process database with every table created and the catalogue seeded
pub async fn create_test_database() -> Result<Database> {
    init_test_logging();
    Ok(prepare_database(&test_config()).await?)
}

pub async fn create_test_resources() -> Result<Arc<ServerResources>> {
    let config = test_config();
    let database = create_test_database().await?;
    Ok(Arc::new(ServerResources::new(config, database)))
}

/// Run `operation` the way the HTTP pipeline would: in a tenant scope with a
/// request transaction that commits on `Ok`
pub async fn in_request<T, F>(
    database: &Database,
    tenant_id: &str,
    user_id: Option<UserId>,
    operation: F,
) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    let store = match user_id {
        Some(user_id) => TenantStore::with_user(tenant(tenant_id), user_id),
        None => TenantStore::new(tenant(tenant_id)),
    };
    context::scope(store, run_in_request_transaction(database, operation)).await
}

/// Create the built-in roles for `tenant_id` and return its new owner
pub async fn bootstrap_tenant(database: &Database, tenant_id: &str) -> Result<UserId> {
    let owner = UserId::new_random();
    in_request(
        database,
        tenant_id,
        Some(owner),
        provision_tenant_roles(database, owner),
    )
    .await?;
    Ok(owner)
}

pub fn token_for(
    resources: &ServerResources,
    tenant_id: &str,
    user_id: UserId,
    roles: &[&str],
) -> String {
    let roles: Vec<String> = roles.iter().map(|r| (*r).to_owned()).collect();
    resources
        .auth_manager
        .generate_token(user_id, &tenant(tenant_id), &roles)
        .unwrap()
}

/// Test HTTP client over the full router
pub struct TestApp {
    pub resources: Arc<ServerResources>,
    pub router: Router,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        let resources = create_test_resources().await?;
        let router = build_router(&resources);
        Ok(Self { resources, router })
    }

    /// Bootstrap `tenant_id` and return an owner token for it
    pub async fn owner_token(&self, tenant_id: &str) -> Result<String> {
        let owner = bootstrap_tenant(&self.resources.database, tenant_id).await?;
        Ok(token_for(&self.resources, tenant_id, owner, &[]))
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        tenant_id: Option<&str>,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tenant_id) = tenant_id {
            builder = builder.header("x-tenant-id", tenant_id);
        }
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body)?))?,
            None => builder.body(Body::empty())?,
        };

        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok((status, json))
    }

    pub async fn get(&self, uri: &str, tenant_id: &str, token: &str) -> Result<(StatusCode, Value)> {
        self.send(Method::GET, uri, Some(tenant_id), Some(token), None)
            .await
    }

    pub async fn post(
        &self,
        uri: &str,
        tenant_id: &str,
        token: &str,
        body: Value,
    ) -> Result<(StatusCode, Value)> {
        self.send(Method::POST, uri, Some(tenant_id), Some(token), Some(body))
            .await
    }
}
