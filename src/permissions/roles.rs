// ABOUTME: Tenant-scoped roles with single-parent inheritance, permission grants, and user assignments
// ABOUTME: Effective permissions are the grants of every assigned or token-named role and all their ancestors
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tessera_core::models::{TenantId, UserId};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::Permission;
use crate::context;
use crate::database::{ColumnDef, Database, SortDirection, TableDef};
use crate::errors::{AppError, AppResult};
use crate::repository::{Entity, Repository};

/// Role holding every permission, granted to a tenant's first user
pub const OWNER_ROLE: &str = "owner";
/// Read-only role
pub const VIEWER_ROLE: &str = "viewer";
/// Bookkeeping role; inherits from viewer
pub const ACCOUNTANT_ROLE: &str = "accountant";

/// Named role within a tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Role id
    pub id: String,
    /// Owning tenant
    pub tenant_id: TenantId,
    /// Name, unique within the tenant
    pub name: String,
    /// Role whose permissions this one inherits
    pub parent_role_id: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Role {
    /// New role in `tenant_id`
    #[must_use]
    pub fn new(tenant_id: TenantId, name: &str, parent_role_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tenant_id,
            name: name.to_owned(),
            parent_role_id,
            created_at: Utc::now(),
        }
    }
}

impl Entity for Role {
    const TABLE: &'static TableDef = &TableDef {
        name: "roles",
        primary_key: "id",
        columns: &[
            ColumnDef::text("id"),
            ColumnDef::text("tenant_id"),
            ColumnDef::text("name"),
            ColumnDef::text("parent_role_id").nullable(),
            ColumnDef::timestamp("created_at"),
        ],
        tenant_scoped: true,
        unique: &[&["tenant_id", "name"]],
    };

    fn id(&self) -> &str {
        &self.id
    }
}

/// Permission granted to a role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePermission {
    /// Grant id
    pub id: String,
    /// Owning tenant
    pub tenant_id: TenantId,
    /// Role receiving the grant
    pub role_id: String,
    /// Permission code
    pub permission: String,
}

impl Entity for RolePermission {
    const TABLE: &'static TableDef = &TableDef {
        name: "role_permissions",
        primary_key: "id",
        columns: &[
            ColumnDef::text("id"),
            ColumnDef::text("tenant_id"),
            ColumnDef::text("role_id"),
            ColumnDef::text("permission"),
        ],
        tenant_scoped: true,
        unique: &[&["tenant_id", "role_id", "permission"]],
    };

    fn id(&self) -> &str {
        &self.id
    }
}

/// Assignment of a role to a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRole {
    /// Assignment id
    pub id: String,
    /// Owning tenant
    pub tenant_id: TenantId,
    /// Assigned user
    pub user_id: UserId,
    /// Assigned role
    pub role_id: String,
}

impl Entity for UserRole {
    const TABLE: &'static TableDef = &TableDef {
        name: "user_roles",
        primary_key: "id",
        columns: &[
            ColumnDef::text("id"),
            ColumnDef::text("tenant_id"),
            ColumnDef::text("user_id"),
            ColumnDef::text("role_id"),
        ],
        tenant_scoped: true,
        unique: &[&["tenant_id", "user_id", "role_id"]],
    };

    fn id(&self) -> &str {
        &self.id
    }
}

/// Roles, grants, and assignments of the tenant in context
///
/// Every method reads the tenant from the context carrier and goes through
/// context-routed repositories, so calls join whatever transaction is
/// published in the current scope.
#[derive(Clone)]
pub struct RoleDirectory {
    roles: Repository<Role>,
    grants: Repository<RolePermission>,
    assignments: Repository<UserRole>,
}

impl RoleDirectory {
    /// Directory backed by `database`
    #[must_use]
    pub fn new(database: &Database) -> Self {
        Self {
            roles: Repository::new(database.clone()),
            grants: Repository::new(database.clone()),
            assignments: Repository::new(database.clone()),
        }
    }

    /// Role named `name`, if it exists
    ///
    /// # Errors
    ///
    /// Returns an error outside a tenant scope or if the lookup fails
    pub async fn find_role(&self, name: &str) -> AppResult<Option<Role>> {
        context::require_tenant_id()?;
        Ok(self.roles.query().eq("name", name).fetch_one().await?)
    }

    /// Every role of the tenant, ordered by name
    ///
    /// # Errors
    ///
    /// Returns an error outside a tenant scope or if the lookup fails
    pub async fn list_roles(&self) -> AppResult<Vec<Role>> {
        context::require_tenant_id()?;
        Ok(self
            .roles
            .query()
            .order_by("name", SortDirection::Asc)
            .fetch_all()
            .await?)
    }

    /// Fetch `name`, creating it with `permissions` when missing
    ///
    /// # Errors
    ///
    /// Returns an error outside a tenant scope or if a write fails
    pub async fn ensure_role(
        &self,
        name: &str,
        parent: Option<&Role>,
        permissions: &[Permission],
    ) -> AppResult<Role> {
        let tenant_id = context::require_tenant_id()?;
        if let Some(existing) = self.find_role(name).await? {
            return Ok(existing);
        }
        let role = self
            .roles
            .insert(&Role::new(
                tenant_id.clone(),
                name,
                parent.map(|p| p.id.clone()),
            ))
            .await?;
        for permission in permissions {
            self.grants
                .insert(&RolePermission {
                    id: Uuid::new_v4().to_string(),
                    tenant_id: tenant_id.clone(),
                    role_id: role.id.clone(),
                    permission: permission.code().to_owned(),
                })
                .await?;
        }
        debug!(tenant_id = %tenant_id, role = name, "role created");
        Ok(role)
    }

    /// Assign the role named `role_name` to `user_id`
    ///
    /// Assigning a role the user already holds is a no-op.
    ///
    /// # Errors
    ///
    /// Returns a not-found error for an unknown role
    pub async fn assign(&self, user_id: UserId, role_name: &str) -> AppResult<UserRole> {
        let tenant_id = context::require_tenant_id()?;
        let role = self
            .find_role(role_name)
            .await?
            .ok_or_else(|| AppError::not_found(format!("role {role_name}")))?;
        let existing = self
            .assignments
            .query()
            .eq("user_id", user_id.to_string())
            .eq("role_id", role.id.clone())
            .fetch_one()
            .await?;
        if let Some(existing) = existing {
            return Ok(existing);
        }
        Ok(self
            .assignments
            .insert(&UserRole {
                id: Uuid::new_v4().to_string(),
                tenant_id,
                user_id,
                role_id: role.id,
            })
            .await?)
    }

    /// Permissions `user_id` holds through assigned roles and `token_roles`
    ///
    /// Parent links are followed transitively; a cycle stops the walk
    /// instead of looping. Unknown permission codes are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error outside a tenant scope or if a lookup fails
    pub async fn effective_permissions(
        &self,
        user_id: UserId,
        token_roles: &[String],
    ) -> AppResult<BTreeSet<Permission>> {
        context::require_tenant_id()?;
        let assigned = self
            .assignments
            .query()
            .eq("user_id", user_id.to_string())
            .fetch_all()
            .await?;

        let mut frontier: Vec<String> = assigned.into_iter().map(|a| a.role_id).collect();
        if !token_roles.is_empty() {
            let named = self
                .roles
                .query()
                .is_in("name", token_roles.iter().cloned())
                .fetch_all()
                .await?;
            frontier.extend(named.into_iter().map(|r| r.id));
        }

        let mut closure: HashSet<String> = HashSet::new();
        while let Some(role_id) = frontier.pop() {
            if !closure.insert(role_id.clone()) {
                continue;
            }
            if let Some(parent) = self
                .roles
                .find_by_id(&role_id)
                .await?
                .and_then(|role| role.parent_role_id)
            {
                frontier.push(parent);
            }
        }

        if closure.is_empty() {
            return Ok(BTreeSet::new());
        }
        let grants = self
            .grants
            .query()
            .is_in("role_id", closure)
            .fetch_all()
            .await?;
        Ok(grants
            .into_iter()
            .filter_map(|grant| match grant.permission.parse::<Permission>() {
                Ok(permission) => Some(permission),
                Err(_) => {
                    warn!(code = %grant.permission, "ignoring unknown permission grant");
                    None
                }
            })
            .collect())
    }
}

/// Create the built-in roles for the tenant in context and make `owner` its
/// owner
///
/// Roles that already exist are reused, so provisioning twice is harmless.
///
/// # Errors
///
/// Returns an error outside a tenant scope or if a write fails
pub async fn provision_tenant_roles(database: &Database, owner: UserId) -> AppResult<Vec<Role>> {
    let directory = RoleDirectory::new(database);
    let viewer = directory
        .ensure_role(
            VIEWER_ROLE,
            None,
            &[Permission::AccountsRead, Permission::ReportsRead],
        )
        .await?;
    let accountant = directory
        .ensure_role(
            ACCOUNTANT_ROLE,
            Some(&viewer),
            &[Permission::AccountsWrite, Permission::JournalPost],
        )
        .await?;
    let owner_role = directory
        .ensure_role(OWNER_ROLE, None, &Permission::ALL)
        .await?;
    directory.assign(owner, OWNER_ROLE).await?;
    info!(
        tenant_id = %context::require_tenant_id()?,
        owner = %owner,
        "tenant roles provisioned"
    );
    Ok(vec![owner_role, accountant, viewer])
}
