// ABOUTME: HTTP route definitions grouped by domain
// ABOUTME: Protected routes carry the authorization check and the request transaction as route layers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Route modules
//!
//! Each domain module contains route definitions and thin handlers that
//! delegate to services. Tenant gating and authentication are applied once
//! around the whole `/api` tree by [`crate::server`]; per-route permission
//! checks and the request transaction are attached with [`guarded`].

/// Account, journal, and report routes
pub mod accounts;
/// Audit ledger routes
pub mod audit;
/// Liveness route
pub mod health;
/// Caller identity routes
pub mod me;

use std::sync::Arc;

use axum::middleware::from_fn_with_state;
use axum::routing::MethodRouter;

use crate::middleware::{authorize, request_transaction, PermissionGate};
use crate::permissions::Permission;
use crate::resources::ServerResources;

/// Require `permission` and run the handler inside the request transaction
///
/// The permission check is the outer layer, so a denied request never opens
/// the request transaction.
pub fn guarded(
    route: MethodRouter<Arc<ServerResources>>,
    resources: &Arc<ServerResources>,
    permission: Permission,
) -> MethodRouter<Arc<ServerResources>> {
    route
        .route_layer(from_fn_with_state(
            Arc::clone(resources),
            request_transaction,
        ))
        .route_layer(from_fn_with_state(
            PermissionGate::new(Arc::clone(resources), permission),
            authorize,
        ))
}
