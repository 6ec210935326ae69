// ABOUTME: Model module root re-exporting identifier and audit types
// ABOUTME: Consumers import from tessera_core::models directly
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

/// Audit ledger entries written after every mutation
pub mod audit;
/// Tenant and user identifiers
pub mod identity;

pub use audit::{AuditAction, AuditEntry};
pub use identity::{IdentifierError, TenantId, UserId};
