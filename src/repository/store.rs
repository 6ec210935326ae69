// ABOUTME: Plain entity data-access object bound to a single executor
// ABOUTME: Find, insert, update, patch, delete, count, and raw query against one table
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::marker::PhantomData;

use serde_json::Value;

use super::{from_row, to_row, Entity, Executor, QueryBuilder};
use crate::database::{Condition, ConnectionId, DatabaseResult, Query, Row, TransactionHandle};

/// Data-access object for `E` bound to one [`Executor`]
///
/// Holding an `EntityStore` directly bypasses context routing; business code
/// should go through [`Repository`](super::Repository).
pub struct EntityStore<E> {
    executor: Executor,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for EntityStore<E> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            _entity: PhantomData,
        }
    }
}

fn by_id<E: Entity>(id: &str) -> Vec<Condition> {
    vec![Condition::Eq(
        E::TABLE.primary_key.to_owned(),
        Value::String(id.to_owned()),
    )]
}

impl<E: Entity> EntityStore<E> {
    /// Bind a store to an executor
    #[must_use]
    pub const fn new(executor: Executor) -> Self {
        Self {
            executor,
            _entity: PhantomData,
        }
    }

    /// Executor this store sends statements to
    #[must_use]
    pub const fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Connection of the bound transaction; `None` when bound to the pool
    #[must_use]
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.executor.connection_id()
    }

    /// Whether this store is bound to `transaction`
    #[must_use]
    pub fn is_bound_to(&self, transaction: &TransactionHandle) -> bool {
        self.executor.is_bound_to(transaction)
    }

    /// Fetch one entity by primary key
    ///
    /// # Errors
    ///
    /// Returns an error if the statement or row conversion fails
    pub async fn find_by_id(&self, id: &str) -> DatabaseResult<Option<E>> {
        let query = Query {
            filters: by_id::<E>(id),
            limit: Some(1),
            ..Query::default()
        };
        Ok(self.find(query).await?.into_iter().next())
    }

    /// Fetch every visible entity matching `query`
    ///
    /// # Errors
    ///
    /// Returns an error if the statement or row conversion fails
    pub async fn find(&self, query: Query) -> DatabaseResult<Vec<E>> {
        let lease = self.executor.lease().await?;
        let result = async {
            let rows = lease.handle.lock().await?.select(E::TABLE, &query).await?;
            rows.into_iter().map(from_row::<E>).collect()
        }
        .await;
        lease.finish(result).await
    }

    /// Fetch the first visible entity matching `query`
    ///
    /// # Errors
    ///
    /// Returns an error if the statement or row conversion fails
    pub async fn find_one(&self, query: Query) -> DatabaseResult<Option<E>> {
        Ok(self.find(query.limit(1)).await?.into_iter().next())
    }

    /// Count visible entities matching `filters`
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails
    pub async fn count(&self, filters: Vec<Condition>) -> DatabaseResult<u64> {
        let lease = self.executor.lease().await?;
        let result = async {
            lease
                .handle
                .lock()
                .await?
                .count(E::TABLE, &filters)
                .await
        }
        .await;
        lease.finish(result).await
    }

    /// Insert an entity and return it as stored
    ///
    /// # Errors
    ///
    /// Returns [`PolicyViolation`](crate::database::DatabaseError::PolicyViolation)
    /// when the row belongs to a tenant other than the session's, or a
    /// constraint error
    pub async fn insert(&self, entity: &E) -> DatabaseResult<E> {
        let row = to_row(entity)?;
        let lease = self.executor.lease().await?;
        let result = async {
            let stored = lease.handle.lock().await?.insert(E::TABLE, row).await?;
            from_row::<E>(stored)
        }
        .await;
        lease.finish(result).await
    }

    /// Replace every non-key column of the row whose id is `entity.id()` with
    /// `entity`'s values
    ///
    /// Returns the affected row count, zero when the row is not visible.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails
    pub async fn update(&self, entity: &E) -> DatabaseResult<u64> {
        let mut changes = to_row(entity)?;
        changes.remove(E::TABLE.primary_key);
        self.update_where(by_id::<E>(entity.id()), changes).await
    }

    /// Apply a partial change set to the row with `id`
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails
    pub async fn patch(&self, id: &str, changes: Row) -> DatabaseResult<u64> {
        self.update_where(by_id::<E>(id), changes).await
    }

    /// Apply `changes` to every visible row matching `filters`
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails
    pub async fn update_where(&self, filters: Vec<Condition>, changes: Row) -> DatabaseResult<u64> {
        let lease = self.executor.lease().await?;
        let result = async {
            lease
                .handle
                .lock()
                .await?
                .update(E::TABLE, &filters, changes)
                .await
        }
        .await;
        lease.finish(result).await
    }

    /// Delete the row with `id`; returns the affected row count
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails
    pub async fn delete(&self, id: &str) -> DatabaseResult<u64> {
        self.delete_where(by_id::<E>(id)).await
    }

    /// Delete every visible row matching `filters`
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails
    pub async fn delete_where(&self, filters: Vec<Condition>) -> DatabaseResult<u64> {
        let lease = self.executor.lease().await?;
        let result = async {
            lease
                .handle
                .lock()
                .await?
                .delete(E::TABLE, &filters)
                .await
        }
        .await;
        lease.finish(result).await
    }

    /// Run a raw SELECT on this store's connection
    ///
    /// # Errors
    ///
    /// Returns [`Unsupported`](crate::database::DatabaseError::Unsupported) on
    /// engines without SQL
    pub async fn raw_query(&self, sql: &str, params: &[Value]) -> DatabaseResult<Vec<Row>> {
        let lease = self.executor.lease().await?;
        let result = async { lease.handle.lock().await?.raw_query(sql, params).await }.await;
        lease.finish(result).await
    }

    /// Start a query bound to this store
    #[must_use]
    pub fn query(&self) -> QueryBuilder<E> {
        QueryBuilder::bound(self.clone())
    }
}
