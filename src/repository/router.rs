// ABOUTME: Context-routed repository that forwards each call to the transaction in scope
// ABOUTME: Resolution happens on every call and is never cached
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use serde_json::Value;
use tracing::trace;

use super::{Entity, EntityStore, Executor, QueryBuilder};
use crate::context;
use crate::database::{
    Condition, ConnectionId, Database, DatabaseResult, Query, Row, TransactionHandle,
};

/// Repository for `E` that follows the context carrier
///
/// Construct one per entity type and inject it where needed. Every public
/// method starts by calling [`Repository::resolve`], so a call made before a
/// transaction is published runs on the default executor while the same call
/// made afterwards runs on the published transaction.
pub struct Repository<E> {
    default: EntityStore<E>,
}

impl<E> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self {
            default: self.default.clone(),
        }
    }
}

impl<E: Entity> Repository<E> {
    /// Repository whose default executor is the connection pool
    #[must_use]
    pub const fn new(database: Database) -> Self {
        Self {
            default: EntityStore::new(Executor::Pool(database)),
        }
    }

    /// Repository whose default executor is an explicit transaction
    #[must_use]
    pub const fn bound_to(transaction: TransactionHandle) -> Self {
        Self {
            default: EntityStore::new(Executor::Transaction(transaction)),
        }
    }

    /// Store this call should use
    ///
    /// When the context carrier publishes an open transaction that differs
    /// from the default binding, a store bound to that transaction is
    /// returned; otherwise the default store.
    #[must_use]
    pub fn resolve(&self) -> EntityStore<E> {
        match context::current_transaction() {
            Some(tx) if !self.default.is_bound_to(&tx) => {
                trace!(
                    table = E::TABLE.name,
                    connection_id = %tx.id(),
                    "repository call routed to scoped transaction"
                );
                EntityStore::new(Executor::Transaction(tx))
            }
            _ => self.default.clone(),
        }
    }

    /// Connection the next call would use; `None` for the pool
    #[must_use]
    pub fn resolved_connection(&self) -> Option<ConnectionId> {
        self.resolve().connection_id()
    }

    /// See [`EntityStore::find_by_id`]
    ///
    /// # Errors
    ///
    /// Propagates the resolved store's error unchanged
    pub async fn find_by_id(&self, id: &str) -> DatabaseResult<Option<E>> {
        self.resolve().find_by_id(id).await
    }

    /// See [`EntityStore::find`]
    ///
    /// # Errors
    ///
    /// Propagates the resolved store's error unchanged
    pub async fn find(&self, query: Query) -> DatabaseResult<Vec<E>> {
        self.resolve().find(query).await
    }

    /// See [`EntityStore::find_one`]
    ///
    /// # Errors
    ///
    /// Propagates the resolved store's error unchanged
    pub async fn find_one(&self, query: Query) -> DatabaseResult<Option<E>> {
        self.resolve().find_one(query).await
    }

    /// See [`EntityStore::count`]
    ///
    /// # Errors
    ///
    /// Propagates the resolved store's error unchanged
    pub async fn count(&self, filters: Vec<Condition>) -> DatabaseResult<u64> {
        self.resolve().count(filters).await
    }

    /// See [`EntityStore::insert`]
    ///
    /// # Errors
    ///
    /// Propagates the resolved store's error unchanged
    pub async fn insert(&self, entity: &E) -> DatabaseResult<E> {
        self.resolve().insert(entity).await
    }

    /// See [`EntityStore::update`]
    ///
    /// # Errors
    ///
    /// Propagates the resolved store's error unchanged
    pub async fn update(&self, entity: &E) -> DatabaseResult<u64> {
        self.resolve().update(entity).await
    }

    /// See [`EntityStore::patch`]
    ///
    /// # Errors
    ///
    /// Propagates the resolved store's error unchanged
    pub async fn patch(&self, id: &str, changes: Row) -> DatabaseResult<u64> {
        self.resolve().patch(id, changes).await
    }

    /// See [`EntityStore::update_where`]
    ///
    /// # Errors
    ///
    /// Propagates the resolved store's error unchanged
    pub async fn update_where(&self, filters: Vec<Condition>, changes: Row) -> DatabaseResult<u64> {
        self.resolve().update_where(filters, changes).await
    }

    /// See [`EntityStore::delete`]
    ///
    /// # Errors
    ///
    /// Propagates the resolved store's error unchanged
    pub async fn delete(&self, id: &str) -> DatabaseResult<u64> {
        self.resolve().delete(id).await
    }

    /// See [`EntityStore::delete_where`]
    ///
    /// # Errors
    ///
    /// Propagates the resolved store's error unchanged
    pub async fn delete_where(&self, filters: Vec<Condition>) -> DatabaseResult<u64> {
        self.resolve().delete_where(filters).await
    }

    /// See [`EntityStore::raw_query`]
    ///
    /// # Errors
    ///
    /// Propagates the resolved store's error unchanged
    pub async fn raw_query(&self, sql: &str, params: &[Value]) -> DatabaseResult<Vec<Row>> {
        self.resolve().raw_query(sql, params).await
    }

    /// Start a query that resolves its store when executed
    #[must_use]
    pub fn query(&self) -> QueryBuilder<E> {
        QueryBuilder::routed(self.clone())
    }
}
