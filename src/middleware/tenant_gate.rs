// ABOUTME: Identity extraction gate reading the tenant selector header
// ABOUTME: Rejects requests without a tenant and runs the rest of the pipeline inside a context scope
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::{HeaderMap, HeaderName};
use tessera_core::models::TenantId;
use tracing::{debug, info_span, Instrument};

use crate::context::{self, TenantStore};
use crate::errors::{AppError, AppResult};
use crate::resources::ServerResources;

/// Read the tenant selector from `headers`
///
/// # Errors
///
/// Returns a client error when the header is absent, empty, not valid
/// UTF-8, or not a well-formed tenant id
pub fn extract_tenant(headers: &HeaderMap, header: &HeaderName) -> AppResult<TenantId> {
    let value = headers
        .get(header)
        .ok_or_else(|| AppError::missing_field(header.as_str()))?;
    let value = value
        .to_str()
        .map_err(|_| AppError::invalid_input(format!("{header} header is not valid text")))?;
    if value.trim().is_empty() {
        return Err(AppError::missing_field(header.as_str()));
    }
    Ok(TenantId::parse(value)?)
}

/// Reject requests without a tenant selector, otherwise run the remainder
/// of the pipeline inside a fresh context scope for that tenant
pub async fn tenant_gate(
    State(resources): State<Arc<ServerResources>>,
    request: Request,
    next: Next,
) -> Response {
    let tenant_id = match extract_tenant(request.headers(), &resources.config.tenant_header) {
        Ok(tenant_id) => tenant_id,
        Err(e) => {
            debug!(path = %request.uri().path(), "request without tenant selector rejected");
            return e.into_response();
        }
    };
    let span = info_span!("tenant", tenant_id = %tenant_id);
    context::scope(TenantStore::new(tenant_id), next.run(request))
        .instrument(span)
        .await
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;
    use crate::errors::ErrorCode;

    fn header() -> HeaderName {
        HeaderName::from_static("x-tenant-id")
    }

    #[test]
    fn present_header_yields_tenant() {
        let mut headers = HeaderMap::new();
        headers.insert(header(), HeaderValue::from_static("aaa"));
        assert_eq!(extract_tenant(&headers, &header()).unwrap().as_str(), "aaa");
    }

    #[test]
    fn missing_or_blank_header_is_a_client_error() {
        let err = extract_tenant(&HeaderMap::new(), &header()).unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingRequiredField);
        assert_eq!(err.http_status().as_u16(), 400);

        let mut headers = HeaderMap::new();
        headers.insert(header(), HeaderValue::from_static("   "));
        let err = extract_tenant(&headers, &header()).unwrap_err();
        assert_eq!(err.http_status().as_u16(), 400);
    }

    #[test]
    fn malformed_tenant_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(header(), HeaderValue::from_static("a b"));
        let err = extract_tenant(&headers, &header()).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);
    }
}
