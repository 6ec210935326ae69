// ABOUTME: PostgreSQL engine backed by sqlx with forced row-level security policies
// ABOUTME: Session state is applied with set_config(..., true) so it dies with each transaction
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # PostgreSQL Engine
//!
//! Rows travel as `jsonb`: selects return `to_jsonb(t)` and writes go through
//! `jsonb_populate_record`, so one code path serves every table. Column names
//! are validated against the static [`TableDef`] before they are spliced into
//! SQL; values are always bound parameters.
//!
//! The application role must not own the tables or hold `BYPASSRLS`,
//! otherwise the policies created by [`TableDef::postgres_ddl`] do not apply.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query as SqlxQuery;
use sqlx::{Error as SqlxError, Postgres, Row as SqlxRow, Transaction};
use tracing::{debug, info};

use super::connection::{ConnectionId, EngineConnection};
use super::errors::DatabaseError;
use super::query::{Condition, Query, Row, SortDirection};
use super::schema::TableDef;
use super::session::{SessionState, TENANT_SETTING, USER_SETTING};

const ENGINE: &str = "postgresql";

/// Pooled PostgreSQL engine
#[derive(Clone)]
pub struct PostgresEngine {
    pool: PgPool,
}

impl PostgresEngine {
    /// Connect a bounded pool
    ///
    /// # Errors
    ///
    /// Returns an error if the server is unreachable or rejects the credentials
    pub async fn connect(
        connection_string: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, DatabaseError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(connection_string)
            .await
            .map_err(|e| map_sqlx_error("pool", e))?;
        info!(max_connections, "PostgreSQL pool connected");
        Ok(Self { pool })
    }

    /// Create tables, unique indexes, and row-level security policies
    ///
    /// # Errors
    ///
    /// Returns an error if any DDL statement fails
    pub async fn migrate(&self, tables: &[&'static TableDef]) -> Result<(), DatabaseError> {
        for table in tables {
            for statement in table.postgres_ddl() {
                sqlx::query(&statement)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| map_sqlx_error(table.name, e))?;
            }
            debug!(table = table.name, "table migrated");
        }
        Ok(())
    }

    /// Check out a connection and open a transaction on it
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::PoolTimeout`] when the pool is exhausted
    pub async fn begin(&self) -> Result<PostgresConnection, DatabaseError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("pool", e))?;
        Ok(PostgresConnection {
            id: ConnectionId::next(),
            tx,
            session: None,
        })
    }

    /// Connections currently checked out
    #[must_use]
    pub fn open_connections(&self) -> usize {
        (self.pool.size() as usize).saturating_sub(self.pool.num_idle())
    }
}

/// One pooled connection with an open transaction
pub struct PostgresConnection {
    id: ConnectionId,
    tx: Transaction<'static, Postgres>,
    session: Option<SessionState>,
}

#[async_trait]
impl EngineConnection for PostgresConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn engine(&self) -> &'static str {
        ENGINE
    }

    async fn set_session(&mut self, session: &SessionState) -> Result<(), DatabaseError> {
        sqlx::query("SELECT set_config($1, $2, true), set_config($3, $4, true)")
            .bind(TENANT_SETTING)
            .bind(session.tenant_id.as_str())
            .bind(USER_SETTING)
            .bind(session.user_setting_value())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("session", e))?;
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
        let mut sql = SqlBuilder::new(table);
        sql.push(&format!("SELECT to_jsonb(t) FROM \"{}\" AS t", table.name));
        sql.where_clause(&query.filters)?;
        if !query.order.is_empty() {
            let mut terms = Vec::with_capacity(query.order.len());
            for term in &query.order {
                let column = sql.column(&term.column)?;
                let direction = match term.direction {
                    SortDirection::Asc => "ASC",
                    SortDirection::Desc => "DESC",
                };
                terms.push(format!("t.\"{column}\" {direction}"));
            }
            sql.push(&format!(" ORDER BY {}", terms.join(", ")));
        }
        if let Some(limit) = query.limit {
            sql.push(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = query.offset {
            sql.push(&format!(" OFFSET {offset}"));
        }

        let rows = sql
            .build()
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error(table.name, e))?;
        rows.iter().map(decode_row).collect()
    }

    async fn count(
        &mut self,
        table: &'static TableDef,
        filters: &[Condition],
    ) -> Result<u64, DatabaseError> {
        let mut sql = SqlBuilder::new(table);
        sql.push(&format!("SELECT COUNT(*) FROM \"{}\" AS t", table.name));
        sql.where_clause(filters)?;
        let row = sql
            .build()
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error(table.name, e))?;
        let count: i64 = row
            .try_get(0)
            .map_err(|e| map_sqlx_error(table.name, e))?;
        Ok(count.max(0) as u64)
    }

    async fn insert(&mut self, table: &'static TableDef, row: Row) -> Result<Row, DatabaseError> {
        if let Some(column) = row.keys().find(|c| !table.has_column(c)) {
            return Err(DatabaseError::UnknownColumn {
                table: table.name.to_owned(),
                column: column.clone(),
            });
        }
        let sql = format!(
            "INSERT INTO \"{name}\" AS t SELECT * FROM jsonb_populate_record(NULL::\"{name}\", $1::jsonb) RETURNING to_jsonb(t)",
            name = table.name
        );
        let stored = sqlx::query(&sql)
            .bind(Value::Object(row))
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error(table.name, e))?;
        decode_row(&stored)
    }

    async fn update(
        &mut self,
        table: &'static TableDef,
        filters: &[Condition],
        changes: Row,
    ) -> Result<u64, DatabaseError> {
        if changes.is_empty() {
            return Ok(0);
        }
        let mut sql = SqlBuilder::new(table);
        let mut assignments = Vec::with_capacity(changes.len());
        for column in changes.keys() {
            let column = sql.column(column)?;
            assignments.push(format!("\"{column}\" = r.\"{column}\""));
        }
        let placeholder = sql.bind(Value::Object(changes));
        sql.push(&format!(
            "UPDATE \"{name}\" AS t SET {sets} FROM jsonb_populate_record(NULL::\"{name}\", {placeholder}::jsonb) AS r",
            name = table.name,
            sets = assignments.join(", "),
        ));
        sql.where_clause(filters)?;
        let result = sql
            .build()
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error(table.name, e))?;
        Ok(result.rows_affected())
    }

    async fn delete(
        &mut self,
        table: &'static TableDef,
        filters: &[Condition],
    ) -> Result<u64, DatabaseError> {
        let mut sql = SqlBuilder::new(table);
        sql.push(&format!("DELETE FROM \"{}\" AS t", table.name));
        sql.where_clause(filters)?;
        let result = sql
            .build()
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error(table.name, e))?;
        Ok(result.rows_affected())
    }

    async fn raw_query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DatabaseError> {
        let wrapped = format!("SELECT to_jsonb(q) FROM ({sql}) AS q");
        let mut query = sqlx::query(&wrapped);
        for param in params {
            query = bind_scalar(query, param.clone());
        }
        let rows = query
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("raw", e))?;
        rows.iter().map(decode_row).collect()
    }

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        let this = *self;
        this.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError> {
        let this = *self;
        this.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

/// Accumulates SQL text and jsonb parameters for one statement
struct SqlBuilder {
    table: &'static TableDef,
    sql: String,
    params: Vec<Value>,
}

impl SqlBuilder {
    fn new(table: &'static TableDef) -> Self {
        Self {
            table,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push(&mut self, fragment: &str) {
        self.sql.push_str(fragment);
    }

    fn bind(&mut self, value: Value) -> String {
        self.params.push(value);
        format!("${}", self.params.len())
    }

    fn column<'c>(&self, column: &'c str) -> Result<&'c str, DatabaseError> {
        if self.table.has_column(column) {
            Ok(column)
        } else {
            Err(DatabaseError::UnknownColumn {
                table: self.table.name.to_owned(),
                column: column.to_owned(),
            })
        }
    }

    fn where_clause(&mut self, filters: &[Condition]) -> Result<(), DatabaseError> {
        if filters.is_empty() {
            return Ok(());
        }
        let mut predicates = Vec::with_capacity(filters.len());
        for filter in filters {
            let column = self.column(filter.column())?;
            let lhs = format!("to_jsonb(t.\"{column}\")");
            let predicate = match filter {
                Condition::Eq(_, v) => format!("{lhs} = {}::jsonb", self.bind(v.clone())),
                Condition::Ne(_, v) => format!(
                    "t.\"{column}\" IS NOT NULL AND {lhs} <> {}::jsonb",
                    self.bind(v.clone())
                ),
                Condition::In(_, vs) => format!(
                    "{}::jsonb @> jsonb_build_array({lhs})",
                    self.bind(Value::Array(vs.clone()))
                ),
                Condition::Gt(_, v) => format!("{lhs} > {}::jsonb", self.bind(v.clone())),
                Condition::Gte(_, v) => format!("{lhs} >= {}::jsonb", self.bind(v.clone())),
                Condition::Lt(_, v) => format!("{lhs} < {}::jsonb", self.bind(v.clone())),
                Condition::Lte(_, v) => format!("{lhs} <= {}::jsonb", self.bind(v.clone())),
                Condition::IsNull(_) => format!("t.\"{column}\" IS NULL"),
            };
            predicates.push(predicate);
        }
        self.sql.push_str(" WHERE ");
        self.sql.push_str(&predicates.join(" AND "));
        Ok(())
    }

    fn build(&self) -> SqlxQuery<'_, Postgres, PgArguments> {
        let mut query = sqlx::query(&self.sql);
        for param in &self.params {
            query = query.bind(param.clone());
        }
        query
    }
}

fn bind_scalar(
    query: SqlxQuery<'_, Postgres, PgArguments>,
    value: Value,
) -> SqlxQuery<'_, Postgres, PgArguments> {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => query.bind(s),
        other => query.bind(other),
    }
}

fn decode_row(row: &PgRow) -> Result<Row, DatabaseError> {
    let value: Value = row
        .try_get(0)
        .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(DatabaseError::Serialization(format!(
            "expected a JSON object row, got {other}"
        ))),
    }
}

fn map_sqlx_error(table: &str, error: SqlxError) -> DatabaseError {
    match error {
        SqlxError::PoolTimedOut => DatabaseError::PoolTimeout,
        SqlxError::PoolClosed => DatabaseError::PoolClosed,
        SqlxError::Database(db) => match db.code().as_deref() {
            Some("42501") => DatabaseError::PolicyViolation {
                table: table.to_owned(),
            },
            Some("23505") => DatabaseError::UniqueViolation {
                table: table.to_owned(),
                key: db.constraint().unwrap_or("unique").to_owned(),
            },
            Some("40001") => DatabaseError::SerializationFailure {
                table: table.to_owned(),
            },
            _ => DatabaseError::QueryError {
                context: db.message().to_owned(),
            },
        },
        other => DatabaseError::QueryError {
            context: other.to_string(),
        },
    }
}
