// ABOUTME: Bearer token verification middleware
// ABOUTME: Attaches the verified identity to the request and records the user in the context carrier
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::header::AUTHORIZATION;
use tracing::{debug, warn};

use crate::context;
use crate::errors::AppError;
use crate::resources::ServerResources;

const BEARER_PREFIX: &str = "Bearer ";

/// Verify an `Authorization: Bearer` token when one is presented
///
/// Requests without a token pass through anonymously; routes that need an
/// identity reject them at the permission check. A token that fails
/// verification is rejected here with 401. The user id is recorded in the
/// context carrier only when the token's tenant matches the scope's tenant;
/// a mismatch is left for the authorization evaluator to deny.
pub async fn authenticate(
    State(resources): State<Arc<ServerResources>>,
    mut request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .map(|value| {
            value
                .to_str()
                .ok()
                .and_then(|v| v.strip_prefix(BEARER_PREFIX))
                .map(str::to_owned)
        });
    let token = match presented {
        None => return next.run(request).await,
        Some(None) => {
            return AppError::auth_invalid("authorization header must be a bearer token")
                .into_response()
        }
        Some(Some(token)) => token,
    };

    let user = match resources.auth_manager.authenticate(token.trim()) {
        Ok(user) => user,
        Err(e) => return e.into_response(),
    };

    if let Some(store) = context::current() {
        if store.tenant_id() == &user.tenant_id {
            if let Err(e) = store.set_user_id(user.user_id) {
                return e.into_response();
            }
        } else {
            warn!(
                scope_tenant = %store.tenant_id(),
                token_tenant = %user.tenant_id,
                "token tenant differs from request tenant; user not recorded"
            );
        }
    }
    debug!(user_id = %user.user_id, "request authenticated");
    request.extensions_mut().insert(user);
    next.run(request).await
}
