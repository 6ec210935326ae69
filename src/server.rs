// ABOUTME: HTTP server assembly: router composition, request tracing, and graceful shutdown
// ABOUTME: The /api tree runs inside the tenant gate and token authentication; the root route is exempt
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::net::SocketAddr;
use std::sync::Arc;

use axum::middleware::from_fn_with_state;
use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::errors::{AppError, AppResult};
use crate::middleware::{authenticate, tenant_gate};
use crate::resources::ServerResources;
use crate::routes::accounts::AccountingRoutes;
use crate::routes::audit::AuditRoutes;
use crate::routes::health::HealthRoutes;
use crate::routes::me::MeRoutes;

/// Compose every route with its middleware
///
/// Layers added later wrap earlier ones, so for `/api` requests the tenant
/// gate runs first and authentication second, both inside the request span.
pub fn build_router(resources: &Arc<ServerResources>) -> Router {
    let api = Router::new()
        .merge(AccountingRoutes::routes(resources))
        .merge(MeRoutes::routes(resources))
        .merge(AuditRoutes::routes(resources))
        .layer(from_fn_with_state(Arc::clone(resources), authenticate))
        .layer(from_fn_with_state(Arc::clone(resources), tenant_gate));

    Router::new()
        .merge(HealthRoutes::routes(Arc::clone(resources)))
        .merge(api)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}

/// Bind the configured port and serve until interrupted
///
/// # Errors
///
/// Returns an error if the port cannot be bound or the server fails
pub async fn serve(resources: Arc<ServerResources>) -> AppResult<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], resources.config.http_port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::internal(format!("failed to bind {addr}: {e}")))?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, build_router(&resources))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::internal(format!("server error: {e}")))?;

    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "failed to install shutdown handler");
        return;
    }
    info!("shutdown signal received");
}
