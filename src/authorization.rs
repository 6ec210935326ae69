// ABOUTME: Per-request permission decisions with an explicit evaluation state machine
// ABOUTME: Loads the role closure in a dedicated transaction scoped to the token's tenant and user
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Authorization Evaluator
//!
//! A decision moves through fixed stages:
//!
//! ```text
//! Received -> ContextEstablished -> PermissionsLoaded -> Decided(Allow | Deny)
//!     \__________________________________________________/
//!                  Decided(Deny) on tenant mismatch
//! ```
//!
//! A token issued for one tenant never authorizes a request addressed to
//! another, and that check runs before any storage is touched. Permission
//! loading happens on its own connection with session state taken from the
//! token, inside a nested context scope so the role repositories route to it.

use std::collections::BTreeSet;
use std::fmt;

use tessera_core::models::TenantId;
use tracing::{debug, info, warn};

use crate::auth::AuthenticatedUser;
use crate::context::{self, TenantStore};
use crate::database::{Database, SessionState};
use crate::errors::{AppError, AppResult};
use crate::permissions::roles::RoleDirectory;
use crate::permissions::Permission;

/// Why a request was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// Token tenant differs from the requested tenant
    TenantMismatch,
    /// The caller lacks the required permission
    MissingPermission,
    /// No identity was presented
    Unauthenticated,
}

impl DenyReason {
    /// Short machine-readable label
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TenantMismatch => "tenant_mismatch",
            Self::MissingPermission => "missing_permission",
            Self::Unauthenticated => "unauthenticated",
        }
    }
}

/// Outcome of an evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Proceed
    Allow,
    /// Refuse
    Deny(DenyReason),
}

impl Decision {
    /// Whether the request may proceed
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Error to answer a denied request with; `None` when allowed
    #[must_use]
    pub fn into_error(self, required: Permission) -> Option<AppError> {
        match self {
            Self::Allow => None,
            Self::Deny(DenyReason::Unauthenticated) => {
                Some(AppError::auth_required("authentication required"))
            }
            Self::Deny(DenyReason::TenantMismatch) => Some(AppError::permission_denied(
                "token was not issued for the requested tenant",
            )),
            Self::Deny(DenyReason::MissingPermission) => Some(AppError::permission_denied(
                format!("missing permission {required}"),
            )),
        }
    }
}

/// Stage of one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationStage {
    /// Request seen, nothing checked yet
    Received,
    /// Token tenant matches and a scoped connection is open
    ContextEstablished,
    /// Effective permissions are known
    PermissionsLoaded,
    /// Terminal
    Decided(Decision),
}

impl AuthorizationStage {
    /// Whether moving from `self` to `next` is legal
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Received, Self::ContextEstablished)
                | (Self::Received, Self::Decided(Decision::Deny(_)))
                | (Self::ContextEstablished, Self::PermissionsLoaded)
                | (Self::PermissionsLoaded, Self::Decided(_))
        )
    }
}

impl fmt::Display for AuthorizationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Received => f.write_str("received"),
            Self::ContextEstablished => f.write_str("context_established"),
            Self::PermissionsLoaded => f.write_str("permissions_loaded"),
            Self::Decided(Decision::Allow) => f.write_str("decided:allow"),
            Self::Decided(Decision::Deny(reason)) => write!(f, "decided:deny:{}", reason.as_str()),
        }
    }
}

struct Evaluation {
    stage: AuthorizationStage,
}

impl Evaluation {
    const fn new() -> Self {
        Self {
            stage: AuthorizationStage::Received,
        }
    }

    fn advance(&mut self, next: AuthorizationStage) -> AppResult<()> {
        if !self.stage.can_transition_to(next) {
            return Err(AppError::internal(format!(
                "illegal authorization transition {} -> {next}",
                self.stage
            )));
        }
        debug!(from = %self.stage, to = %next, "authorization stage");
        self.stage = next;
        Ok(())
    }

    fn decide(&mut self, decision: Decision) -> AppResult<Decision> {
        self.advance(AuthorizationStage::Decided(decision))?;
        Ok(decision)
    }
}

/// Decides whether an authenticated caller may perform an operation
#[derive(Clone)]
pub struct AuthorizationEvaluator {
    database: Database,
    directory: RoleDirectory,
}

impl AuthorizationEvaluator {
    /// Evaluator loading roles from `database`
    #[must_use]
    pub fn new(database: Database) -> Self {
        let directory = RoleDirectory::new(&database);
        Self {
            database,
            directory,
        }
    }

    /// Decide whether `user` may exercise `required` in `requested_tenant`
    ///
    /// A tenant mismatch is decided before any connection is opened. A deny
    /// for a missing permission still commits the read-only transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the permission lookup fails; the scoped
    /// transaction is rolled back first
    pub async fn evaluate(
        &self,
        requested_tenant: &TenantId,
        user: &AuthenticatedUser,
        required: Permission,
    ) -> AppResult<Decision> {
        let mut evaluation = Evaluation::new();

        if &user.tenant_id != requested_tenant {
            warn!(
                requested_tenant = %requested_tenant,
                token_tenant = %user.tenant_id,
                user_id = %user.user_id,
                "tenant mismatch between request and token"
            );
            return evaluation.decide(Decision::Deny(DenyReason::TenantMismatch));
        }

        let granted = self.load_permissions(&mut evaluation, user).await?;
        let decision = if granted.contains(&required) {
            Decision::Allow
        } else {
            Decision::Deny(DenyReason::MissingPermission)
        };
        info!(
            tenant_id = %requested_tenant,
            user_id = %user.user_id,
            permission = %required,
            allowed = decision.is_allowed(),
            "authorization decided"
        );
        evaluation.decide(decision)
    }

    /// Permissions `user` holds in the token's tenant
    ///
    /// # Errors
    ///
    /// Returns an error if the permission lookup fails
    pub async fn effective_permissions(
        &self,
        user: &AuthenticatedUser,
    ) -> AppResult<BTreeSet<Permission>> {
        let mut evaluation = Evaluation::new();
        self.load_permissions(&mut evaluation, user).await
    }

    async fn load_permissions(
        &self,
        evaluation: &mut Evaluation,
        user: &AuthenticatedUser,
    ) -> AppResult<BTreeSet<Permission>> {
        let transaction = self.database.begin().await?;
        let session = SessionState::new(user.tenant_id.clone()).with_user(Some(user.user_id));
        let applied = async { transaction.lock().await?.set_session(&session).await }.await;
        if let Err(e) = applied {
            if let Err(rollback_error) = transaction.rollback().await {
                warn!(error = %rollback_error, "authorization rollback failed");
            }
            return Err(e.into());
        }

        let store = TenantStore::with_user(user.tenant_id.clone(), user.user_id);
        if let Err(e) = store.publish_transaction(transaction.clone()) {
            if let Err(rollback_error) = transaction.rollback().await {
                warn!(error = %rollback_error, "authorization rollback failed");
            }
            return Err(e.into());
        }

        let loaded: AppResult<BTreeSet<Permission>> = context::scope(store, async {
            evaluation.advance(AuthorizationStage::ContextEstablished)?;
            let granted = self
                .directory
                .effective_permissions(user.user_id, &user.roles)
                .await?;
            evaluation.advance(AuthorizationStage::PermissionsLoaded)?;
            Ok(granted)
        })
        .await;

        match loaded {
            Ok(granted) => {
                transaction.commit().await?;
                Ok(granted)
            }
            Err(e) => {
                if let Err(rollback_error) = transaction.rollback().await {
                    warn!(error = %rollback_error, "authorization rollback failed");
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_transitions_follow_the_machine() {
        use AuthorizationStage::{ContextEstablished, Decided, PermissionsLoaded, Received};
        assert!(Received.can_transition_to(ContextEstablished));
        assert!(Received.can_transition_to(Decided(Decision::Deny(DenyReason::TenantMismatch))));
        assert!(!Received.can_transition_to(Decided(Decision::Allow)));
        assert!(!Received.can_transition_to(PermissionsLoaded));
        assert!(ContextEstablished.can_transition_to(PermissionsLoaded));
        assert!(PermissionsLoaded.can_transition_to(Decided(Decision::Allow)));
        assert!(!Decided(Decision::Allow).can_transition_to(Received));
    }

    #[test]
    fn deny_reasons_map_to_statuses() {
        let required = Permission::AccountsRead;
        assert!(Decision::Allow.into_error(required).is_none());
        let mismatch = Decision::Deny(DenyReason::TenantMismatch)
            .into_error(required)
            .unwrap();
        assert_eq!(mismatch.http_status().as_u16(), 403);
        let anonymous = Decision::Deny(DenyReason::Unauthenticated)
            .into_error(required)
            .unwrap();
        assert_eq!(anonymous.http_status().as_u16(), 401);
    }
}
