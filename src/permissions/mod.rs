// ABOUTME: Permission catalogue and startup reconciliation of the global permissions table
// ABOUTME: Permission codes are stable strings; reconciliation only inserts missing codes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

/// Tenant-scoped roles, grants, and assignments
pub mod roles;

pub use roles::{
    provision_tenant_roles, Role, RoleDirectory, RolePermission, UserRole, ACCOUNTANT_ROLE,
    OWNER_ROLE, VIEWER_ROLE,
};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::database::{ColumnDef, Database, TableDef};
use crate::errors::{AppError, AppResult};
use crate::repository::{Entity, EntityStore, Executor};

/// Operation a role may be granted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Permission {
    /// List and view accounts
    #[serde(rename = "accounts:read")]
    AccountsRead,
    /// Create, rename, and delete accounts
    #[serde(rename = "accounts:write")]
    AccountsWrite,
    /// Post journal entries
    #[serde(rename = "journal:post")]
    JournalPost,
    /// View reports such as the trial balance
    #[serde(rename = "reports:read")]
    ReportsRead,
    /// Manage roles and assignments
    #[serde(rename = "roles:manage")]
    RolesManage,
    /// Read the audit ledger
    #[serde(rename = "audit:read")]
    AuditRead,
}

impl Permission {
    /// Every permission, in catalogue order
    pub const ALL: [Self; 6] = [
        Self::AccountsRead,
        Self::AccountsWrite,
        Self::JournalPost,
        Self::ReportsRead,
        Self::RolesManage,
        Self::AuditRead,
    ];

    /// Stable code stored in the database
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::AccountsRead => "accounts:read",
            Self::AccountsWrite => "accounts:write",
            Self::JournalPost => "journal:post",
            Self::ReportsRead => "reports:read",
            Self::RolesManage => "roles:manage",
            Self::AuditRead => "audit:read",
        }
    }

    /// One-line description for the catalogue
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::AccountsRead => "View the chart of accounts",
            Self::AccountsWrite => "Create, rename, and delete accounts",
            Self::JournalPost => "Post balanced journal entries",
            Self::ReportsRead => "View financial reports",
            Self::RolesManage => "Manage roles and role assignments",
            Self::AuditRead => "Read the mutation audit ledger",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Permission {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.code() == s)
            .ok_or_else(|| AppError::invalid_input(format!("unknown permission: {s}")))
    }
}

/// Tables owned by this module, catalogue first
pub const TABLES: [&TableDef; 4] = [
    PermissionRecord::TABLE,
    Role::TABLE,
    RolePermission::TABLE,
    UserRole::TABLE,
];

/// Row of the global permission catalogue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRecord {
    /// Permission code
    pub code: String,
    /// Description
    pub description: String,
}

impl Entity for PermissionRecord {
    const TABLE: &'static TableDef = &TableDef {
        name: "permissions",
        primary_key: "code",
        columns: &[ColumnDef::text("code"), ColumnDef::text("description")],
        tenant_scoped: false,
        unique: &[],
    };

    fn id(&self) -> &str {
        &self.code
    }
}

/// Insert catalogue rows for any permission missing from the database
///
/// Existing rows, including codes no longer known to this build, are left
/// untouched. Returns the number of rows inserted.
///
/// # Errors
///
/// Returns an error if the catalogue cannot be read or written
pub async fn reconcile_permission_catalog(database: &Database) -> AppResult<usize> {
    let transaction = database.begin().await?;
    let store = EntityStore::<PermissionRecord>::new(Executor::Transaction(transaction.clone()));

    let result: AppResult<usize> = async {
        let mut inserted = 0;
        for permission in Permission::ALL {
            if store.find_by_id(permission.code()).await?.is_none() {
                store
                    .insert(&PermissionRecord {
                        code: permission.code().to_owned(),
                        description: permission.description().to_owned(),
                    })
                    .await?;
                inserted += 1;
            }
        }
        Ok(inserted)
    }
    .await;

    match result {
        Ok(inserted) => {
            transaction.commit().await?;
            info!(inserted, "permission catalogue reconciled");
            Ok(inserted)
        }
        Err(e) => {
            if let Err(rollback_error) = transaction.rollback().await {
                warn!(error = %rollback_error, "catalogue reconciliation rollback failed");
            }
            Err(e)
        }
    }
}
