// ABOUTME: Shareable handle to one open transaction published through the context carrier
// ABOUTME: Serializes access to the connection and releases it exactly once on commit, rollback, or drop
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, warn};

use super::connection::{ConnectionId, EngineConnection};
use super::errors::DatabaseError;

struct TransactionInner {
    id: ConnectionId,
    engine: &'static str,
    open: AtomicBool,
    connection: Mutex<Option<Box<dyn EngineConnection>>>,
}

impl Drop for TransactionInner {
    fn drop(&mut self) {
        if self.connection.get_mut().is_some() {
            warn!(
                connection_id = %self.id,
                "transaction dropped while open; rolling back"
            );
        }
    }
}

/// Cloneable handle to an open transaction
///
/// Clones share the same connection. Statements are serialized through an
/// async mutex. When the last clone is dropped without commit the underlying
/// connection is dropped too, which rolls the transaction back and returns the
/// connection to the pool.
#[derive(Clone)]
pub struct TransactionHandle {
    inner: Arc<TransactionInner>,
}

impl TransactionHandle {
    /// Take ownership of an open connection
    #[must_use]
    pub fn new(connection: Box<dyn EngineConnection>) -> Self {
        Self {
            inner: Arc::new(TransactionInner {
                id: connection.id(),
                engine: connection.engine(),
                open: AtomicBool::new(true),
                connection: Mutex::new(Some(connection)),
            }),
        }
    }

    /// Identifier of the underlying connection
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Engine that owns the connection
    #[must_use]
    pub fn engine(&self) -> &'static str {
        self.inner.engine
    }

    /// Whether commit or rollback has not happened yet
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::Acquire)
    }

    /// Exclusive access to the connection for one or more statements
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::TransactionClosed`] after commit or rollback
    pub async fn lock(&self) -> Result<MappedMutexGuard<'_, dyn EngineConnection>, DatabaseError> {
        let guard = self.inner.connection.lock().await;
        MutexGuard::try_map(guard, |slot| slot.as_deref_mut())
            .map_err(|_| DatabaseError::TransactionClosed(self.inner.id))
    }

    async fn take(&self) -> Result<Box<dyn EngineConnection>, DatabaseError> {
        let connection = self
            .inner
            .connection
            .lock()
            .await
            .take()
            .ok_or(DatabaseError::TransactionClosed(self.inner.id))?;
        self.inner.open.store(false, Ordering::Release);
        Ok(connection)
    }

    /// Commit and release the connection
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is already closed or the engine
    /// rejects the commit
    pub async fn commit(&self) -> Result<(), DatabaseError> {
        let connection = self.take().await?;
        connection.commit().await?;
        debug!(connection_id = %self.inner.id, "transaction committed");
        Ok(())
    }

    /// Roll back and release the connection
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is already closed
    pub async fn rollback(&self) -> Result<(), DatabaseError> {
        let connection = self.take().await?;
        connection.rollback().await?;
        debug!(connection_id = %self.inner.id, "transaction rolled back");
        Ok(())
    }

    /// Whether two handles refer to the same transaction
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for TransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionHandle")
            .field("id", &self.inner.id)
            .field("engine", &self.inner.engine)
            .field("open", &self.is_open())
            .finish()
    }
}
