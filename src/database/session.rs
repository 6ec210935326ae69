// ABOUTME: Engine session-state contract read by row-visibility predicates
// ABOUTME: Names the two transaction-scoped settings and carries the tenant/user pair applied to them
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use tessera_core::models::{TenantId, UserId};

/// Transaction-scoped setting holding the active tenant id
pub const TENANT_SETTING: &str = "app.current_tenant";

/// Transaction-scoped setting holding the active user id
pub const USER_SETTING: &str = "app.current_user";

/// Tenant and user identity applied to one transaction
///
/// The values live exactly as long as the transaction they were applied to and
/// never carry over to the next transaction on a pooled connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    /// Tenant whose rows are visible
    pub tenant_id: TenantId,
    /// Acting user, if authenticated
    pub user_id: Option<UserId>,
}

impl SessionState {
    /// Session for a tenant with no authenticated user
    #[must_use]
    pub const fn new(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            user_id: None,
        }
    }

    /// Attach the acting user
    #[must_use]
    pub const fn with_user(mut self, user_id: Option<UserId>) -> Self {
        self.user_id = user_id;
        self
    }

    /// Value written to [`USER_SETTING`]; empty when no user is attached
    #[must_use]
    pub fn user_setting_value(&self) -> String {
        self.user_id.map(|u| u.to_string()).unwrap_or_default()
    }
}
