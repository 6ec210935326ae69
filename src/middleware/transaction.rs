// ABOUTME: Transactional request wrapper owning exactly one transaction per request
// ABOUTME: Sets session state from the context carrier, publishes the handle, commits or rolls back
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::future::Future;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tessera_core::models::TenantId;
use tracing::{debug, warn};

use crate::auth::AuthenticatedUser;
use crate::context;
use crate::database::{Database, DatabaseError, TransactionHandle};
use crate::errors::{AppError, AppResult};
use crate::resources::ServerResources;

/// The request's transaction, published in the context carrier
///
/// Dropping it without [`commit`](Self::commit) or
/// [`rollback`](Self::rollback) discards the transaction and returns the
/// connection to the pool, which is what happens on panic or cancellation.
#[derive(Debug)]
pub struct RequestTransaction {
    handle: TransactionHandle,
    tenant_id: TenantId,
}

impl RequestTransaction {
    /// Open the request transaction for the current scope
    ///
    /// Returns `None` outside a tenant scope; data access from there on
    /// fails closed against the engine's default deny.
    ///
    /// # Errors
    ///
    /// Returns an error if the scope already published a transaction, if no
    /// connection is available, or if session state cannot be applied
    pub async fn begin(database: &Database) -> AppResult<Option<Self>> {
        let Some(store) = context::current() else {
            debug!("no tenant in context; request runs without a transaction");
            return Ok(None);
        };
        if store.has_published_transaction() {
            return Err(DatabaseError::TransactionAlreadyOpen.into());
        }

        let handle = database.begin().await?;
        let session = store.session_state();
        let prepared = async {
            handle.lock().await?.set_session(&session).await?;
            store.publish_transaction(handle.clone())
        }
        .await;
        if let Err(e) = prepared {
            if let Err(rollback_error) = handle.rollback().await {
                warn!(error = %rollback_error, "rollback after failed setup also failed");
            }
            return Err(e.into());
        }

        debug!(
            tenant_id = %session.tenant_id,
            user_id = %session.user_setting_value(),
            connection_id = %handle.id(),
            "request transaction opened"
        );
        Ok(Some(Self {
            handle,
            tenant_id: session.tenant_id,
        }))
    }

    /// Underlying transaction handle
    #[must_use]
    pub const fn handle(&self) -> &TransactionHandle {
        &self.handle
    }

    /// Commit and release the connection
    ///
    /// # Errors
    ///
    /// Returns an error if the engine refuses the commit
    pub async fn commit(self) -> AppResult<()> {
        self.handle.commit().await?;
        debug!(tenant_id = %self.tenant_id, connection_id = %self.handle.id(), "request transaction committed");
        Ok(())
    }

    /// Roll back and release the connection
    ///
    /// # Errors
    ///
    /// Returns an error if the engine reports a rollback failure; the
    /// connection is released regardless
    pub async fn rollback(self) -> AppResult<()> {
        self.handle.rollback().await?;
        debug!(tenant_id = %self.tenant_id, connection_id = %self.handle.id(), "request transaction rolled back");
        Ok(())
    }
}

/// Run `operation` inside the request transaction for the current scope
///
/// Commits when `operation` returns `Ok`, rolls back and returns the
/// original error otherwise. Outside a tenant scope `operation` runs
/// without a transaction.
///
/// # Errors
///
/// Returns the operation's error, or a storage error from opening or
/// committing the transaction
pub async fn run_in_request_transaction<T, F>(database: &Database, operation: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    let Some(transaction) = RequestTransaction::begin(database).await? else {
        return operation.await;
    };
    match operation.await {
        Ok(value) => {
            transaction.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_error) = transaction.rollback().await {
                warn!(error = %rollback_error, "request rollback failed");
            }
            Err(e)
        }
    }
}

/// Axum middleware wrapping the handler in the request transaction
///
/// Handler errors are already responses by the time they reach this layer,
/// so the outcome is read from the status: below 400 commits, anything
/// else rolls back.
pub async fn request_transaction(
    State(resources): State<Arc<ServerResources>>,
    request: Request,
    next: Next,
) -> Response {
    let token_tenant = request
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|user| user.tenant_id.clone());
    if let (Some(token_tenant), Some(store)) = (token_tenant, context::current()) {
        if &token_tenant != store.tenant_id() {
            return AppError::permission_denied("token was not issued for the requested tenant")
                .into_response();
        }
    }

    let transaction = match RequestTransaction::begin(&resources.database).await {
        Ok(Some(transaction)) => transaction,
        Ok(None) => return next.run(request).await,
        Err(e) => return e.into_response(),
    };

    let response = next.run(request).await;
    if response.status().as_u16() < 400 {
        match transaction.commit().await {
            Ok(()) => response,
            Err(e) => e.into_response(),
        }
    } else {
        if let Err(e) = transaction.rollback().await {
            warn!(error = %e, "request rollback failed");
        }
        response
    }
}
