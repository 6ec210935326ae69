// ABOUTME: Liveness endpoint exempt from the tenant gate
// ABOUTME: Reports storage backend and pool usage without touching tenant data
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::resources::ServerResources;

/// Liveness payload
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `ok` while the process serves requests
    pub status: &'static str,
    /// Crate version
    pub version: &'static str,
    /// Storage backend description
    pub backend: &'static str,
    /// Connections currently checked out of the pool
    pub open_connections: usize,
}

/// Health routes
pub struct HealthRoutes;

impl HealthRoutes {
    /// `GET /`
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/", get(Self::handle_health))
            .with_state(resources)
    }

    async fn handle_health(State(resources): State<Arc<ServerResources>>) -> Json<HealthResponse> {
        Json(HealthResponse {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
            backend: resources.database.backend_info(),
            open_connections: resources.database.open_connections(),
        })
    }
}
