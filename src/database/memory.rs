// ABOUTME: In-process storage engine emulating transaction-scoped row-level security
// ABOUTME: Bounded connection pool, per-transaction write overlay, unique constraints, default-deny visibility
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # In-Process Engine
//!
//! Tables live in memory behind a `tokio` read/write lock. Each connection
//! owns one transaction: writes go to a private overlay that is visible to
//! the same connection (read-your-writes) and applied atomically on commit.
//! Rollback, or simply dropping the connection, discards the overlay.
//!
//! Tenant-scoped tables enforce the same predicate the PostgreSQL policies
//! do: a row is visible, updatable, and deletable only when its `tenant_id`
//! equals the session tenant, and inserts or updates that would produce a row
//! for another tenant fail with [`DatabaseError::PolicyViolation`]. A
//! connection without session state sees no tenant-scoped rows at all.
//!
//! Concurrent writers are checked optimistically: every row a transaction
//! stages remembers the committed version it was derived from, and commit
//! fails with [`DatabaseError::SerializationFailure`] when another
//! transaction committed a different version of that row in the meantime.

use std::collections::{BTreeMap, HashMap};
use std::mem;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{OwnedSemaphorePermit, RwLock, Semaphore};
use tokio::time::timeout;
use tracing::{debug, trace};

use super::connection::{ConnectionId, EngineConnection};
use super::errors::DatabaseError;
use super::query::{Condition, Query, Row};
use super::schema::{TableDef, TENANT_COLUMN};
use super::session::SessionState;

const ENGINE: &str = "memory";

type TableRows = BTreeMap<String, Row>;
// `None` marks a pending delete.
type Overlay = BTreeMap<String, Option<Row>>;
// Committed version of each staged row when it was first read; `None` means absent.
type Baseline = BTreeMap<String, Option<Row>>;

struct Shared {
    tables: RwLock<HashMap<&'static str, (&'static TableDef, TableRows)>>,
    permits: Arc<Semaphore>,
    max_connections: usize,
    acquire_timeout: Duration,
}

/// Handle to the in-process engine; cheap to clone
#[derive(Clone)]
pub struct MemoryEngine {
    shared: Arc<Shared>,
}

impl MemoryEngine {
    /// Create an empty engine with a bounded connection pool
    #[must_use]
    pub fn new(max_connections: u32, acquire_timeout: Duration) -> Self {
        let max_connections = max_connections.max(1) as usize;
        Self {
            shared: Arc::new(Shared {
                tables: RwLock::new(HashMap::new()),
                permits: Arc::new(Semaphore::new(max_connections)),
                max_connections,
                acquire_timeout,
            }),
        }
    }

    /// Register tables; already registered tables keep their rows
    pub async fn migrate(&self, tables: &[&'static TableDef]) {
        let mut registry = self.shared.tables.write().await;
        for table in tables {
            registry
                .entry(table.name)
                .or_insert_with(|| (*table, TableRows::new()));
        }
    }

    /// Check out a connection and open a transaction on it
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::PoolTimeout`] when no connection frees up
    /// within the acquire timeout
    pub async fn begin(&self) -> Result<MemoryConnection, DatabaseError> {
        let permit = timeout(
            self.shared.acquire_timeout,
            Arc::clone(&self.shared.permits).acquire_owned(),
        )
        .await
        .map_err(|_| DatabaseError::PoolTimeout)?
        .map_err(|_| DatabaseError::PoolClosed)?;

        let connection = MemoryConnection {
            id: ConnectionId::next(),
            shared: Arc::clone(&self.shared),
            session: None,
            pending: HashMap::new(),
            baseline: HashMap::new(),
            _permit: permit,
        };
        trace!(connection_id = %connection.id, "memory connection checked out");
        Ok(connection)
    }

    /// Connections currently checked out
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.shared.max_connections - self.shared.permits.available_permits()
    }
}

/// One checked-out connection with an open transaction
pub struct MemoryConnection {
    id: ConnectionId,
    shared: Arc<Shared>,
    session: Option<SessionState>,
    pending: HashMap<&'static str, Overlay>,
    baseline: HashMap<&'static str, Baseline>,
    _permit: OwnedSemaphorePermit,
}

impl MemoryConnection {
    /// Committed rows with this transaction's overlay applied, including rows
    /// the session cannot see
    async fn snapshot(&self, table: &'static TableDef) -> Result<TableRows, DatabaseError> {
        let (_, rows) = self.snapshot_for_write(table).await?;
        Ok(rows)
    }

    /// Like [`Self::snapshot`], also returning the committed rows it was built from
    async fn snapshot_for_write(
        &self,
        table: &'static TableDef,
    ) -> Result<(TableRows, TableRows), DatabaseError> {
        let tables = self.shared.tables.read().await;
        let (_, committed) = tables
            .get(table.name)
            .ok_or_else(|| DatabaseError::UnknownTable(table.name.to_owned()))?;
        let committed = committed.clone();
        drop(tables);
        let mut rows = committed.clone();
        if let Some(overlay) = self.pending.get(table.name) {
            apply_overlay(&mut rows, overlay);
        }
        Ok((committed, rows))
    }

    fn visible(&self, table: &TableDef, row: &Row) -> bool {
        if !table.tenant_scoped {
            return true;
        }
        self.session.as_ref().is_some_and(|session| {
            row.get(TENANT_COLUMN).and_then(Value::as_str) == Some(session.tenant_id.as_str())
        })
    }

    fn check_policy(&self, table: &TableDef, row: &Row) -> Result<(), DatabaseError> {
        if self.visible(table, row) {
            Ok(())
        } else {
            Err(DatabaseError::PolicyViolation {
                table: table.name.to_owned(),
            })
        }
    }

    fn stage(
        &mut self,
        table: &'static TableDef,
        committed: &TableRows,
        key: String,
        row: Option<Row>,
    ) {
        self.baseline
            .entry(table.name)
            .or_default()
            .entry(key.clone())
            .or_insert_with(|| committed.get(&key).cloned());
        self.pending.entry(table.name).or_default().insert(key, row);
    }
}

#[async_trait]
impl EngineConnection for MemoryConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn engine(&self) -> &'static str {
        ENGINE
    }

    async fn set_session(&mut self, session: &SessionState) -> Result<(), DatabaseError> {
        trace!(
            connection_id = %self.id,
            tenant_id = %session.tenant_id,
            "session state applied"
        );
        self.session = Some(session.clone());
        Ok(())
    }

    fn session(&self) -> Option<&SessionState> {
        self.session.as_ref()
    }

    async fn select(
        &mut self,
        table: &'static TableDef,
        query: &Query,
    ) -> Result<Vec<Row>, DatabaseError> {
        validate_filter_columns(table, &query.filters)?;
        let rows = self.snapshot(table).await?;
        let matching: Vec<Row> = rows
            .into_values()
            .filter(|row| self.visible(table, row) && query.matches(row))
            .collect();
        Ok(query.arrange(matching))
    }

    async fn count(
        &mut self,
        table: &'static TableDef,
        filters: &[Condition],
    ) -> Result<u64, DatabaseError> {
        validate_filter_columns(table, filters)?;
        let rows = self.snapshot(table).await?;
        let count = rows
            .values()
            .filter(|row| self.visible(table, row) && filters.iter().all(|f| f.matches(row)))
            .count();
        Ok(count as u64)
    }

    async fn insert(&mut self, table: &'static TableDef, row: Row) -> Result<Row, DatabaseError> {
        let row = normalize_row(table, row)?;
        self.check_policy(table, &row)?;
        let key = primary_key_of(table, &row)?;

        let (committed, rows) = self.snapshot_for_write(table).await?;
        if rows.contains_key(&key) {
            return Err(DatabaseError::UniqueViolation {
                table: table.name.to_owned(),
                key: table.primary_key.to_owned(),
            });
        }
        check_unique(table, &rows, &key, &row)?;

        self.stage(table, &committed, key, Some(row.clone()));
        Ok(row)
    }

    async fn update(
        &mut self,
        table: &'static TableDef,
        filters: &[Condition],
        changes: Row,
    ) -> Result<u64, DatabaseError> {
        validate_filter_columns(table, filters)?;
        for column in changes.keys() {
            if !table.has_column(column) {
                return Err(DatabaseError::UnknownColumn {
                    table: table.name.to_owned(),
                    column: column.clone(),
                });
            }
        }

        let (committed, mut working) = self.snapshot_for_write(table).await?;
        let targets: Vec<String> = working
            .iter()
            .filter(|(_, row)| self.visible(table, row) && filters.iter().all(|f| f.matches(row)))
            .map(|(key, _)| key.clone())
            .collect();

        let mut staged = Vec::with_capacity(targets.len());
        for key in targets {
            let Some(current) = working.get(&key) else {
                continue;
            };
            let mut updated = current.clone();
            for (column, value) in &changes {
                updated.insert(column.clone(), value.clone());
            }
            if primary_key_of(table, &updated)? != key {
                return Err(DatabaseError::QueryError {
                    context: format!("primary key of {} is immutable", table.name),
                });
            }
            self.check_policy(table, &updated)?;
            check_unique(table, &working, &key, &updated)?;
            working.insert(key.clone(), updated.clone());
            staged.push((key, updated));
        }

        let affected = staged.len() as u64;
        for (key, row) in staged {
            self.stage(table, &committed, key, Some(row));
        }
        Ok(affected)
    }

    async fn delete(
        &mut self,
        table: &'static TableDef,
        filters: &[Condition],
    ) -> Result<u64, DatabaseError> {
        validate_filter_columns(table, filters)?;
        let (committed, rows) = self.snapshot_for_write(table).await?;
        let targets: Vec<String> = rows
            .iter()
            .filter(|(_, row)| self.visible(table, row) && filters.iter().all(|f| f.matches(row)))
            .map(|(key, _)| key.clone())
            .collect();
        let affected = targets.len() as u64;
        for key in targets {
            self.stage(table, &committed, key, None);
        }
        Ok(affected)
    }

    async fn raw_query(&mut self, _sql: &str, _params: &[Value]) -> Result<Vec<Row>, DatabaseError> {
        Err(DatabaseError::Unsupported {
            engine: ENGINE,
            operation: "raw_query",
        })
    }

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        let mut this = self;
        let pending = mem::take(&mut this.pending);
        let baseline = mem::take(&mut this.baseline);
        let mut tables = this.shared.tables.write().await;

        // First committer wins: a row another transaction changed or removed
        // since this one read it fails the whole commit.
        for (name, rows) in &baseline {
            let (_, committed) = tables
                .get(name)
                .ok_or_else(|| DatabaseError::UnknownTable((*name).to_owned()))?;
            if let Some(key) = rows
                .iter()
                .find(|(key, read)| committed.get(*key) != read.as_ref())
                .map(|(key, _)| key)
            {
                debug!(
                    connection_id = %this.id,
                    table = %name,
                    key = %key,
                    "write conflict, commit refused"
                );
                return Err(DatabaseError::SerializationFailure {
                    table: (*name).to_owned(),
                });
            }
        }

        // Validate against the latest committed state before touching anything so
        // a conflicting concurrent commit leaves this transaction fully unapplied.
        let mut merged: Vec<(&'static str, TableRows)> = Vec::with_capacity(pending.len());
        for (name, overlay) in &pending {
            let (table, committed) = tables
                .get(name)
                .ok_or_else(|| DatabaseError::UnknownTable((*name).to_owned()))?;
            let mut rows = committed.clone();
            apply_overlay(&mut rows, overlay);
            for (key, row) in overlay {
                if let Some(row) = row {
                    check_unique(table, &rows, key, row)?;
                }
            }
            merged.push((*name, rows));
        }

        for (name, rows) in merged {
            if let Some((_, committed)) = tables.get_mut(name) {
                *committed = rows;
            }
        }
        drop(tables);
        debug!(connection_id = %this.id, "memory transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError> {
        let mut this = self;
        this.pending.clear();
        this.baseline.clear();
        debug!(connection_id = %this.id, "memory transaction rolled back");
        Ok(())
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            debug!(connection_id = %self.id, "discarding uncommitted writes");
        }
    }
}

fn apply_overlay(rows: &mut TableRows, overlay: &Overlay) {
    for (key, row) in overlay {
        match row {
            Some(row) => {
                rows.insert(key.clone(), row.clone());
            }
            None => {
                rows.remove(key);
            }
        }
    }
}

/// Reject unknown columns and fill omitted nullable columns with null
fn normalize_row(table: &TableDef, mut row: Row) -> Result<Row, DatabaseError> {
    if let Some(column) = row.keys().find(|c| !table.has_column(c)) {
        return Err(DatabaseError::UnknownColumn {
            table: table.name.to_owned(),
            column: column.clone(),
        });
    }
    for column in table.columns {
        let value = row.entry(column.name).or_insert(Value::Null);
        if value.is_null() && !column.nullable {
            return Err(DatabaseError::QueryError {
                context: format!(
                    "null value in column {} of {} violates not-null constraint",
                    column.name, table.name
                ),
            });
        }
    }
    Ok(row)
}

fn validate_filter_columns(table: &TableDef, filters: &[Condition]) -> Result<(), DatabaseError> {
    match filters.iter().find(|f| !table.has_column(f.column())) {
        Some(bad) => Err(DatabaseError::UnknownColumn {
            table: table.name.to_owned(),
            column: bad.column().to_owned(),
        }),
        None => Ok(()),
    }
}

fn primary_key_of(table: &TableDef, row: &Row) -> Result<String, DatabaseError> {
    match row.get(table.primary_key) {
        Some(Value::String(key)) => Ok(key.clone()),
        Some(Value::Number(key)) => Ok(key.to_string()),
        _ => Err(DatabaseError::QueryError {
            context: format!("{} requires a {} value", table.name, table.primary_key),
        }),
    }
}

/// Unique constraints span every row, not just the ones the session can see
fn check_unique(
    table: &TableDef,
    rows: &TableRows,
    own_key: &str,
    candidate: &Row,
) -> Result<(), DatabaseError> {
    for columns in table.unique {
        let values: Vec<&Value> = columns
            .iter()
            .map(|c| candidate.get(*c).unwrap_or(&Value::Null))
            .collect();
        // NULLs never collide, matching SQL semantics.
        if values.iter().any(|v| v.is_null()) {
            continue;
        }
        let clash = rows.iter().any(|(key, other)| {
            key != own_key
                && columns
                    .iter()
                    .zip(&values)
                    .all(|(c, v)| other.get(*c) == Some(*v))
        });
        if clash {
            return Err(DatabaseError::UniqueViolation {
                table: table.name.to_owned(),
                key: columns.join(", "),
            });
        }
    }
    Ok(())
}
