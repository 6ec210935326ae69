// ABOUTME: Route-level permission check backed by the authorization evaluator
// ABOUTME: Decides before the request transaction opens; denies answer 401 or 403
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::auth::AuthenticatedUser;
use crate::authorization::{Decision, DenyReason};
use crate::context;
use crate::permissions::Permission;
use crate::resources::ServerResources;

/// State for [`authorize`]: the permission a route requires
#[derive(Clone)]
pub struct PermissionGate {
    /// Shared server resources
    pub resources: Arc<ServerResources>,
    /// Required permission
    pub permission: Permission,
}

impl PermissionGate {
    /// Gate requiring `permission`
    #[must_use]
    pub const fn new(resources: Arc<ServerResources>, permission: Permission) -> Self {
        Self {
            resources,
            permission,
        }
    }
}

/// Let the request through only if the authenticated caller holds the
/// gate's permission in the request's tenant
pub async fn authorize(State(gate): State<PermissionGate>, request: Request, next: Next) -> Response {
    let tenant_id = match context::require_tenant_id() {
        Ok(tenant_id) => tenant_id,
        Err(e) => return e.into_response(),
    };
    let user = request.extensions().get::<AuthenticatedUser>().cloned();
    let decision = match user {
        None => Decision::Deny(DenyReason::Unauthenticated),
        Some(user) => match gate
            .resources
            .authorization
            .evaluate(&tenant_id, &user, gate.permission)
            .await
        {
            Ok(decision) => decision,
            Err(e) => return e.into_response(),
        },
    };
    match decision.into_error(gate.permission) {
        None => next.run(request).await,
        Some(denied) => denied.into_response(),
    }
}
