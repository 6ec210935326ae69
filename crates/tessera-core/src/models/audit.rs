// ABOUTME: Audit ledger entry types stamped with tenant and user identity
// ABOUTME: AuditAction and AuditEntry with builder methods used by the mutation ledger
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{TenantId, UserId};

/// Kind of mutation recorded in the audit ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Row was inserted
    Insert,
    /// Row(s) were updated
    Update,
    /// Row(s) were deleted
    Delete,
}

impl AuditAction {
    /// Stable lowercase name used in storage and logs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// Who-changed-what record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique entry identifier
    pub id: String,
    /// Tenant the mutation ran under
    pub tenant_id: TenantId,
    /// Acting user, absent for system-initiated mutations
    pub user_id: Option<UserId>,
    /// Table that was mutated
    pub table_name: String,
    /// Primary key of the affected row, if a single row was targeted
    pub entity_id: Option<String>,
    /// Mutation kind
    pub action: AuditAction,
    /// Number of rows the statement affected
    pub affected: u64,
    /// When the mutation executed
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Create a new entry for `tenant_id` with no user or entity attached
    #[must_use]
    pub fn new(tenant_id: TenantId, table_name: &str, action: AuditAction, affected: u64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tenant_id,
            user_id: None,
            table_name: table_name.to_owned(),
            entity_id: None,
            action,
            affected,
            recorded_at: Utc::now(),
        }
    }

    /// Attach the acting user
    #[must_use]
    pub const fn with_user_id(mut self, user_id: Option<UserId>) -> Self {
        self.user_id = user_id;
        self
    }

    /// Attach the affected entity id
    #[must_use]
    pub fn with_entity_id(mut self, entity_id: Option<String>) -> Self {
        self.entity_id = entity_id;
        self
    }
}
