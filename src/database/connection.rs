// ABOUTME: Engine connection trait implemented by every storage backend
// ABOUTME: One connection is one open transaction; commit or rollback consumes it
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use super::errors::DatabaseError;
use super::query::{Condition, Query, Row};
use super::schema::TableDef;
use super::session::SessionState;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a checked-out connection/transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate the next identifier
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A pooled connection with an open transaction
///
/// Dropping a connection without calling [`EngineConnection::commit`] rolls
/// the transaction back and returns the connection to the pool.
#[async_trait]
pub trait EngineConnection: Send {
    /// Identifier of this connection
    fn id(&self) -> ConnectionId;

    /// Engine name for logs and errors
    fn engine(&self) -> &'static str;

    /// Apply transaction-scoped session state read by the visibility predicates
    async fn set_session(&mut self, session: &SessionState) -> Result<(), DatabaseError>;

    /// Session state currently applied, if any
    fn session(&self) -> Option<&SessionState>;

    /// Rows visible to the current session that match `query`
    async fn select(
        &mut self,
        table: &'static TableDef,
        query: &Query,
    ) -> Result<Vec<Row>, DatabaseError>;

    /// Number of visible rows matching `filters`
    async fn count(
        &mut self,
        table: &'static TableDef,
        filters: &[Condition],
    ) -> Result<u64, DatabaseError>;

    /// Insert one row, returning the stored row
    async fn insert(&mut self, table: &'static TableDef, row: Row) -> Result<Row, DatabaseError>;

    /// Apply `changes` to visible rows matching `filters`; returns affected rows
    async fn update(
        &mut self,
        table: &'static TableDef,
        filters: &[Condition],
        changes: Row,
    ) -> Result<u64, DatabaseError>;

    /// Delete visible rows matching `filters`; returns affected rows
    async fn delete(
        &mut self,
        table: &'static TableDef,
        filters: &[Condition],
    ) -> Result<u64, DatabaseError>;

    /// Run a raw SELECT and return each result row as a JSON object
    async fn raw_query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DatabaseError>;

    /// Commit and release the connection
    async fn commit(self: Box<Self>) -> Result<(), DatabaseError>;

    /// Roll back and release the connection
    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError>;
}
