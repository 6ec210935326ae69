// ABOUTME: Caller identity endpoint listing the effective permissions of the token subject
// ABOUTME: Requires a token for the requested tenant but no specific permission
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde::Serialize;
use tessera_core::models::{TenantId, UserId};

use crate::auth::AuthenticatedUser;
use crate::context;
use crate::errors::AppError;
use crate::permissions::Permission;
use crate::resources::ServerResources;

/// Response of `GET /api/me/permissions`
#[derive(Debug, Serialize)]
pub struct MyPermissionsResponse {
    /// Token subject
    pub user_id: UserId,
    /// Tenant of the request
    pub tenant_id: TenantId,
    /// Role names carried by the token
    pub token_roles: Vec<String>,
    /// Effective permissions, sorted
    pub permissions: Vec<Permission>,
}

/// Identity routes
pub struct MeRoutes;

impl MeRoutes {
    /// `GET /api/me/permissions`
    pub fn routes(resources: &Arc<ServerResources>) -> Router {
        Router::new()
            .route("/api/me/permissions", get(Self::handle_permissions))
            .with_state(Arc::clone(resources))
    }

    async fn handle_permissions(
        State(resources): State<Arc<ServerResources>>,
        user: Option<Extension<AuthenticatedUser>>,
    ) -> Result<Json<MyPermissionsResponse>, AppError> {
        let Some(Extension(user)) = user else {
            return Err(AppError::auth_required("authentication required"));
        };
        let tenant_id = context::require_tenant_id()?;
        if tenant_id != user.tenant_id {
            return Err(AppError::permission_denied(
                "token was not issued for the requested tenant",
            ));
        }
        let permissions = resources.authorization.effective_permissions(&user).await?;
        Ok(Json(MyPermissionsResponse {
            user_id: user.user_id,
            tenant_id,
            token_roles: user.roles,
            permissions: permissions.into_iter().collect(),
        }))
    }
}
