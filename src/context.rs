// ABOUTME: Task-local context carrier holding tenant, user, and transaction for one request
// ABOUTME: Survives await points without explicit passing; nested scopes shadow the outer store
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Context Carrier
//!
//! A [`TenantStore`] is installed for the duration of one future with
//! [`scope`]. Anything awaited inside that future can read it through
//! [`current`] and friends. Outside any scope every accessor reports "no
//! tenant"; there is no process-wide fallback.
//!
//! The store is created with only a tenant id. It is mutated at most twice
//! afterwards: once when authentication establishes the user, once when the
//! request transaction is published.
//!
//! Task-locals do not cross `tokio::spawn`; use [`spawn_in_scope`] to carry
//! the current store into a spawned task.

use std::future::Future;
use std::sync::{Arc, OnceLock};

use tessera_core::models::{TenantId, UserId};
use tokio::task::JoinHandle;
use tokio::task_local;

use crate::database::{DatabaseError, SessionState, TransactionHandle};
use crate::errors::{AppError, AppResult};

task_local! {
    static TENANT_STORE: Arc<TenantStore>;
}

/// Per-request identity and transaction binding
#[derive(Debug)]
pub struct TenantStore {
    tenant_id: TenantId,
    user_id: OnceLock<UserId>,
    transaction: OnceLock<TransactionHandle>,
}

impl TenantStore {
    /// Store holding only a tenant id
    #[must_use]
    pub fn new(tenant_id: TenantId) -> Arc<Self> {
        Arc::new(Self {
            tenant_id,
            user_id: OnceLock::new(),
            transaction: OnceLock::new(),
        })
    }

    /// Store with tenant and user already established
    #[must_use]
    pub fn with_user(tenant_id: TenantId, user_id: UserId) -> Arc<Self> {
        let store = Self::new(tenant_id);
        // Freshly created, so the cell is empty.
        let _ = store.user_id.set(user_id);
        store
    }

    /// Tenant this scope belongs to
    #[must_use]
    pub const fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    /// Authenticated user, once established
    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.user_id.get().copied()
    }

    /// Record the authenticated user
    ///
    /// Setting the same user twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns a permission error if a different user is already recorded
    pub fn set_user_id(&self, user_id: UserId) -> AppResult<()> {
        match self.user_id.get() {
            Some(existing) if *existing == user_id => Ok(()),
            Some(_) => Err(AppError::permission_denied(
                "identity already established for this request",
            )),
            None => {
                let _ = self.user_id.set(user_id);
                Ok(())
            }
        }
    }

    /// Published transaction, if it is still open
    #[must_use]
    pub fn transaction(&self) -> Option<TransactionHandle> {
        self.transaction.get().filter(|tx| tx.is_open()).cloned()
    }

    /// Whether a transaction was ever published in this scope
    #[must_use]
    pub fn has_published_transaction(&self) -> bool {
        self.transaction.get().is_some()
    }

    /// Publish the scope's transaction
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::TransactionAlreadyOpen`] if a transaction was
    /// already published; the request transaction is never re-entered
    pub fn publish_transaction(&self, transaction: TransactionHandle) -> Result<(), DatabaseError> {
        self.transaction
            .set(transaction)
            .map_err(|_| DatabaseError::TransactionAlreadyOpen)
    }

    /// Session state to apply on engine connections
    #[must_use]
    pub fn session_state(&self) -> SessionState {
        SessionState::new(self.tenant_id.clone()).with_user(self.user_id())
    }
}

/// Run `future` with `store` as the current context
///
/// Nested calls shadow the outer store until the inner future completes.
pub async fn scope<F>(store: Arc<TenantStore>, future: F) -> F::Output
where
    F: Future,
{
    TENANT_STORE.scope(store, future).await
}

/// Nearest enclosing store, or `None` outside any scope
#[must_use]
pub fn current() -> Option<Arc<TenantStore>> {
    TENANT_STORE.try_with(Arc::clone).ok()
}

/// Tenant of the current scope
///
/// # Errors
///
/// Returns an "unauthenticated context" error outside any scope
pub fn require_tenant_id() -> AppResult<TenantId> {
    current()
        .map(|store| store.tenant_id().clone())
        .ok_or_else(|| AppError::auth_required("unauthenticated context"))
}

/// User of the current scope, if authenticated
#[must_use]
pub fn current_user_id() -> Option<UserId> {
    current().and_then(|store| store.user_id())
}

/// Open transaction published in the current scope
#[must_use]
pub fn current_transaction() -> Option<TransactionHandle> {
    current().and_then(|store| store.transaction())
}

/// Spawn a task that sees the caller's store
///
/// Outside any scope the task runs without one.
pub fn spawn_in_scope<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match current() {
        Some(store) => tokio::spawn(TENANT_STORE.scope(store, future)),
        None => tokio::spawn(future),
    }
}
