// ABOUTME: Mutation subscribers invoked around every insert, update, and delete
// ABOUTME: SessionGuard reasserts tenant/user session state on the executing connection before each write
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Mutation Subscribers
//!
//! Every connection handed out by [`Database::begin`](super::Database::begin)
//! is wrapped in a [`SubscribedConnection`], so hooks fire for writes issued
//! through any path: the request transaction, an authorization transaction,
//! or a one-off autocommit statement.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, trace};

use super::connection::{ConnectionId, EngineConnection};
use super::errors::DatabaseError;
use super::query::{Condition, Query, Row};
use super::schema::TableDef;
use super::session::SessionState;
use crate::context;

/// Kind of write about to execute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// Single-row insert
    Insert,
    /// Filtered update
    Update,
    /// Filtered delete
    Delete,
}

/// Description of a write passed to subscribers
#[derive(Debug, Clone)]
pub struct MutationEvent {
    /// Target table
    pub table: &'static TableDef,
    /// Write kind
    pub kind: MutationKind,
    /// Primary key of the targeted row when the statement addresses exactly one
    pub entity_id: Option<String>,
}

impl MutationEvent {
    fn for_insert(table: &'static TableDef, row: &Row) -> Self {
        Self {
            table,
            kind: MutationKind::Insert,
            entity_id: row.get(table.primary_key).and_then(key_string),
        }
    }

    fn for_filtered(table: &'static TableDef, kind: MutationKind, filters: &[Condition]) -> Self {
        let entity_id = filters.iter().find_map(|f| match f {
            Condition::Eq(column, value) if column == table.primary_key => key_string(value),
            _ => None,
        });
        Self {
            table,
            kind,
            entity_id,
        }
    }
}

fn key_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Hook run around writes on the connection that executes them
#[async_trait]
pub trait MutationSubscriber: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Runs immediately before the write reaches the engine
    ///
    /// # Errors
    ///
    /// An error aborts the write and is returned to the caller
    async fn before_mutation(
        &self,
        _connection: &mut dyn EngineConnection,
        _event: &MutationEvent,
    ) -> Result<(), DatabaseError> {
        Ok(())
    }

    /// Runs after the write succeeded, with the affected row count
    ///
    /// # Errors
    ///
    /// An error is returned to the caller; the write stays in the open
    /// transaction and is discarded if the caller rolls back
    async fn after_mutation(
        &self,
        _connection: &mut dyn EngineConnection,
        _event: &MutationEvent,
        _affected: u64,
    ) -> Result<(), DatabaseError> {
        Ok(())
    }
}

/// Reasserts the context carrier's tenant and user as session state before
/// every write
///
/// Writes issued with no tenant in context proceed untouched and meet the
/// engine's default-deny posture.
#[derive(Debug, Default, Clone, Copy)]
pub struct SessionGuard;

#[async_trait]
impl MutationSubscriber for SessionGuard {
    fn name(&self) -> &'static str {
        "session_guard"
    }

    async fn before_mutation(
        &self,
        connection: &mut dyn EngineConnection,
        event: &MutationEvent,
    ) -> Result<(), DatabaseError> {
        let Some(store) = context::current() else {
            debug!(
                connection_id = %connection.id(),
                table = event.table.name,
                "no tenant context for mutation; relying on engine default deny"
            );
            return Ok(());
        };
        let session = SessionState::new(store.tenant_id().clone()).with_user(store.user_id());
        if connection.session() == Some(&session) {
            return Ok(());
        }
        trace!(
            connection_id = %connection.id(),
            tenant_id = %session.tenant_id,
            table = event.table.name,
            "session state asserted before mutation"
        );
        connection.set_session(&session).await
    }
}

/// Connection decorator dispatching mutation hooks
pub struct SubscribedConnection {
    inner: Box<dyn EngineConnection>,
    subscribers: Arc<[Arc<dyn MutationSubscriber>]>,
}

impl SubscribedConnection {
    /// Wrap `inner` so `subscribers` run around each write, in order
    #[must_use]
    pub fn new(
        inner: Box<dyn EngineConnection>,
        subscribers: Arc<[Arc<dyn MutationSubscriber>]>,
    ) -> Self {
        Self { inner, subscribers }
    }

    async fn before(&mut self, event: &MutationEvent) -> Result<(), DatabaseError> {
        for subscriber in self.subscribers.iter() {
            subscriber.before_mutation(self.inner.as_mut(), event).await?;
        }
        Ok(())
    }

    async fn after(&mut self, event: &MutationEvent, affected: u64) -> Result<(), DatabaseError> {
        for subscriber in self.subscribers.iter() {
            subscriber
                .after_mutation(self.inner.as_mut(), event, affected)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl EngineConnection for SubscribedConnection {
    fn id(&self) -> ConnectionId {
        self.inner.id()
    }

    fn engine(&self) -> &'static str {
        self.inner.engine()
    }

    async fn set_session(&mut self, session: &SessionState) -> Result<(), DatabaseError> {
        self.inner.set_session(session).await
    }

    fn session(&self) -> Option<&SessionState> {
        self.inner.session()
    }

    async fn select(
        &mut self,
        table: &'static TableDef,
        query: &Query,
    ) -> Result<Vec<Row>, DatabaseError> {
        self.inner.select(table, query).await
    }

    async fn count(
        &mut self,
        table: &'static TableDef,
        filters: &[Condition],
    ) -> Result<u64, DatabaseError> {
        self.inner.count(table, filters).await
    }

    async fn insert(&mut self, table: &'static TableDef, row: Row) -> Result<Row, DatabaseError> {
        let event = MutationEvent::for_insert(table, &row);
        self.before(&event).await?;
        let stored = self.inner.insert(table, row).await?;
        self.after(&event, 1).await?;
        Ok(stored)
    }

    async fn update(
        &mut self,
        table: &'static TableDef,
        filters: &[Condition],
        changes: Row,
    ) -> Result<u64, DatabaseError> {
        let event = MutationEvent::for_filtered(table, MutationKind::Update, filters);
        self.before(&event).await?;
        let affected = self.inner.update(table, filters, changes).await?;
        self.after(&event, affected).await?;
        Ok(affected)
    }

    async fn delete(
        &mut self,
        table: &'static TableDef,
        filters: &[Condition],
    ) -> Result<u64, DatabaseError> {
        let event = MutationEvent::for_filtered(table, MutationKind::Delete, filters);
        self.before(&event).await?;
        let affected = self.inner.delete(table, filters).await?;
        self.after(&event, affected).await?;
        Ok(affected)
    }

    async fn raw_query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DatabaseError> {
        self.inner.raw_query(sql, params).await
    }

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError> {
        self.inner.rollback().await
    }
}
