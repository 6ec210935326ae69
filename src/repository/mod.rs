// ABOUTME: Repository layer routing entity data access to the correct connection
// ABOUTME: Defines the Entity trait and the Executor binding (pool or open transaction)
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Repositories
//!
//! Business code holds a [`Repository`] per entity type. Each call resolves
//! its binding fresh from the context carrier: inside a scope with a published
//! transaction it lands on that transaction, otherwise on the repository's own
//! executor. [`EntityStore`] is the plain data-access object the router
//! forwards to; it is bound to exactly one [`Executor`] for its lifetime.

/// Fluent query builder
pub mod builder;
/// Context-routed repository
pub mod router;
/// Plain data-access object bound to one executor
pub mod store;

pub use builder::QueryBuilder;
pub use router::Repository;
pub use store::EntityStore;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::context;
use crate::database::{
    ConnectionId, Database, DatabaseError, DatabaseResult, Row, TableDef, TransactionHandle,
};

/// A row type stored in one table
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Table the entity lives in
    const TABLE: &'static TableDef;

    /// Primary key value
    fn id(&self) -> &str;
}

/// Where an [`EntityStore`] sends its statements
#[derive(Clone)]
pub enum Executor {
    /// One autocommit transaction per call on a pooled connection
    Pool(Database),
    /// An already open transaction
    Transaction(TransactionHandle),
}

impl Executor {
    /// Connection of a bound transaction; `None` for the pool
    #[must_use]
    pub fn connection_id(&self) -> Option<ConnectionId> {
        match self {
            Self::Pool(_) => None,
            Self::Transaction(tx) => Some(tx.id()),
        }
    }

    /// Whether this executor is bound to `transaction`
    #[must_use]
    pub fn is_bound_to(&self, transaction: &TransactionHandle) -> bool {
        matches!(self, Self::Transaction(tx) if tx.same_as(transaction))
    }

    /// Transaction for one call
    ///
    /// Pool calls open a fresh transaction carrying the current context's
    /// session state, or none at all outside a scope so tenant-scoped tables
    /// stay invisible.
    pub(crate) async fn lease(&self) -> DatabaseResult<Lease> {
        match self {
            Self::Transaction(tx) => Ok(Lease {
                handle: tx.clone(),
                autocommit: false,
            }),
            Self::Pool(database) => {
                let handle = database.begin().await?;
                if let Some(store) = context::current() {
                    let applied = async {
                        let mut connection = handle.lock().await?;
                        connection.set_session(&store.session_state()).await
                    }
                    .await;
                    if let Err(e) = applied {
                        if let Err(rollback_error) = handle.rollback().await {
                            warn!(error = %rollback_error, "session setup rollback failed");
                        }
                        return Err(e);
                    }
                }
                Ok(Lease {
                    handle,
                    autocommit: true,
                })
            }
        }
    }
}

/// Transaction borrowed for one repository call
pub(crate) struct Lease {
    pub(crate) handle: TransactionHandle,
    autocommit: bool,
}

impl Lease {
    /// Commit or roll back an autocommit transaction according to `result`
    pub(crate) async fn finish<T>(self, result: DatabaseResult<T>) -> DatabaseResult<T> {
        if !self.autocommit {
            return result;
        }
        match result {
            Ok(value) => {
                self.handle.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_error) = self.handle.rollback().await {
                    warn!(error = %rollback_error, "autocommit rollback failed");
                }
                Err(e)
            }
        }
    }
}

pub(crate) fn to_row<E: Entity>(entity: &E) -> DatabaseResult<Row> {
    match serde_json::to_value(entity)? {
        Value::Object(row) => Ok(row),
        other => Err(DatabaseError::Serialization(format!(
            "{} must serialize to an object, got {other}",
            E::TABLE.name
        ))),
    }
}

pub(crate) fn from_row<E: Entity>(row: Row) -> DatabaseResult<E> {
    Ok(serde_json::from_value(Value::Object(row))?)
}
