// ABOUTME: Fluent query builder over repositories and entity stores
// ABOUTME: Routed builders resolve their connection at execution time, not at construction
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use serde_json::Value;

use super::{Entity, EntityStore, Repository};
use crate::database::{Condition, DatabaseResult, Query, SortDirection};

enum Target<E> {
    Routed(Repository<E>),
    Bound(EntityStore<E>),
}

/// Chainable filters, ordering, and paging for one entity type
pub struct QueryBuilder<E> {
    target: Target<E>,
    query: Query,
}

impl<E: Entity> QueryBuilder<E> {
    pub(crate) fn routed(repository: Repository<E>) -> Self {
        Self {
            target: Target::Routed(repository),
            query: Query::new(),
        }
    }

    pub(crate) fn bound(store: EntityStore<E>) -> Self {
        Self {
            target: Target::Bound(store),
            query: Query::new(),
        }
    }

    fn store(&self) -> EntityStore<E> {
        match &self.target {
            Target::Routed(repository) => repository.resolve(),
            Target::Bound(store) => store.clone(),
        }
    }

    fn with(mut self, condition: Condition) -> Self {
        self.query.filters.push(condition);
        self
    }

    /// `column = value`
    #[must_use]
    pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.with(Condition::Eq(column.to_owned(), value.into()))
    }

    /// `column <> value`
    #[must_use]
    pub fn ne(self, column: &str, value: impl Into<Value>) -> Self {
        self.with(Condition::Ne(column.to_owned(), value.into()))
    }

    /// `column > value`
    #[must_use]
    pub fn gt(self, column: &str, value: impl Into<Value>) -> Self {
        self.with(Condition::Gt(column.to_owned(), value.into()))
    }

    /// `column >= value`
    #[must_use]
    pub fn gte(self, column: &str, value: impl Into<Value>) -> Self {
        self.with(Condition::Gte(column.to_owned(), value.into()))
    }

    /// `column < value`
    #[must_use]
    pub fn lt(self, column: &str, value: impl Into<Value>) -> Self {
        self.with(Condition::Lt(column.to_owned(), value.into()))
    }

    /// `column <= value`
    #[must_use]
    pub fn lte(self, column: &str, value: impl Into<Value>) -> Self {
        self.with(Condition::Lte(column.to_owned(), value.into()))
    }

    /// `column IN (values)`
    #[must_use]
    pub fn is_in<V: Into<Value>>(self, column: &str, values: impl IntoIterator<Item = V>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.with(Condition::In(column.to_owned(), values))
    }

    /// `column IS NULL`
    #[must_use]
    pub fn is_null(self, column: &str) -> Self {
        self.with(Condition::IsNull(column.to_owned()))
    }

    /// Sort by `column`
    #[must_use]
    pub fn order_by(mut self, column: &str, direction: SortDirection) -> Self {
        self.query = self.query.order_by(column, direction);
        self
    }

    /// Cap the number of results
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.query.limit = Some(limit);
        self
    }

    /// Skip leading results
    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.query.offset = Some(offset);
        self
    }

    /// The query assembled so far
    #[must_use]
    pub const fn as_query(&self) -> &Query {
        &self.query
    }

    /// Execute and return every match
    ///
    /// # Errors
    ///
    /// Returns the store's error unchanged
    pub async fn fetch_all(self) -> DatabaseResult<Vec<E>> {
        let store = self.store();
        store.find(self.query).await
    }

    /// Execute and return the first match
    ///
    /// # Errors
    ///
    /// Returns the store's error unchanged
    pub async fn fetch_one(self) -> DatabaseResult<Option<E>> {
        let store = self.store();
        store.find_one(self.query).await
    }

    /// Count matches, ignoring ordering and paging
    ///
    /// # Errors
    ///
    /// Returns the store's error unchanged
    pub async fn count(self) -> DatabaseResult<u64> {
        let store = self.store();
        store.count(self.query.filters).await
    }
}
