// ABOUTME: Storage-layer error taxonomy shared by every engine
// ABOUTME: Distinguishes policy rejections, constraint violations, pool exhaustion, and closed transactions
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use thiserror::Error;

use super::connection::ConnectionId;

/// Errors produced by storage engines, transactions, and repositories
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Statement failed for an engine-specific reason
    #[error("query failed: {context}")]
    QueryError {
        /// Engine message
        context: String,
    },

    /// Row-visibility predicate rejected a write (`WITH CHECK` failure)
    #[error("row-level policy rejected write to {table}")]
    PolicyViolation {
        /// Table the write targeted
        table: String,
    },

    /// Unique or primary key constraint violated
    #[error("unique constraint violated on {table} ({key})")]
    UniqueViolation {
        /// Table the write targeted
        table: String,
        /// Constraint columns
        key: String,
    },

    /// A concurrent transaction committed a conflicting write first
    #[error("could not serialize access to {table} due to concurrent update")]
    SerializationFailure {
        /// Table holding the conflicting row
        table: String,
    },

    /// Table was never migrated
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// Column is not declared on the table
    #[error("unknown column {column} on {table}")]
    UnknownColumn {
        /// Table name
        table: String,
        /// Offending column
        column: String,
    },

    /// Transaction was already committed or rolled back
    #[error("transaction {0} is closed")]
    TransactionClosed(ConnectionId),

    /// A request transaction is already published in this scope
    #[error("a request transaction is already open in this scope")]
    TransactionAlreadyOpen,

    /// No tenant context is active
    #[error("unauthenticated context")]
    MissingContext,

    /// Pool did not yield a connection within the acquire timeout
    #[error("timed out waiting for a database connection")]
    PoolTimeout,

    /// Pool has been closed
    #[error("connection pool is closed")]
    PoolClosed,

    /// Operation is not available on this engine
    #[error("{operation} is not supported by the {engine} engine")]
    Unsupported {
        /// Engine name
        engine: &'static str,
        /// Operation attempted
        operation: &'static str,
    },

    /// Row could not be converted to or from an entity
    #[error("row conversion failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for DatabaseError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}
