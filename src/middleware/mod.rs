// ABOUTME: Axum middleware forming the tenant-scoped request pipeline
// ABOUTME: Tenant gate, token authentication, permission checks, and the request transaction
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Layer order for a protected route, outermost first:
//!
//! 1. [`tenant_gate`](tenant_gate::tenant_gate) opens the context scope
//! 2. [`authenticate`](auth::authenticate) verifies the bearer token
//! 3. [`authorize`](authorize::authorize) runs the authorization evaluator
//! 4. [`request_transaction`](transaction::request_transaction) wraps the handler

/// Bearer token verification
pub mod auth;
/// Per-route permission checks
pub mod authorize;
/// Tenant selector extraction and context scope
pub mod tenant_gate;
/// Transactional request wrapper
pub mod transaction;

pub use auth::authenticate;
pub use authorize::{authorize, PermissionGate};
pub use tenant_gate::{extract_tenant, tenant_gate};
pub use transaction::{request_transaction, run_in_request_transaction, RequestTransaction};
