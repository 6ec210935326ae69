// ABOUTME: Database facade selecting the storage engine and handing out subscribed transactions
// ABOUTME: Every connection passes through the mutation subscriber chain, SessionGuard first
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Database
//!
//! [`Database`] owns the connection pool of the configured engine. The only
//! way to obtain a connection is [`Database::begin`], which opens a
//! transaction and wraps it so the registered [`MutationSubscriber`]s see
//! every write. [`SessionGuard`] is always the first subscriber.

/// Engine connection trait and connection identifiers
pub mod connection;
/// Storage error types
pub mod errors;
/// In-process engine emulating row-level security
pub mod memory;
/// PostgreSQL engine with row-level security policies
#[cfg(feature = "postgresql")]
pub mod postgres;
/// Engine-neutral query description
pub mod query;
/// Static table definitions and DDL generation
pub mod schema;
/// Session-state contract read by the visibility predicates
pub mod session;
/// Mutation hooks and the session guard
pub mod subscriber;
/// Shareable transaction handle
pub mod transaction;

pub use connection::{ConnectionId, EngineConnection};
pub use errors::DatabaseError;
pub use query::{Condition, Query, Row, SortDirection};
pub use schema::{ColumnDef, ColumnType, TableDef, TENANT_COLUMN};
pub use session::{SessionState, TENANT_SETTING, USER_SETTING};
pub use subscriber::{MutationEvent, MutationKind, MutationSubscriber, SessionGuard};
pub use transaction::TransactionHandle;

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::environment::{DatabaseConfig, DatabaseUrl};
use memory::MemoryEngine;
#[cfg(feature = "postgresql")]
use postgres::PostgresEngine;
use subscriber::SubscribedConnection;

/// Result alias for storage operations
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Engine kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseType {
    /// In-process engine
    Memory,
    /// PostgreSQL server
    PostgreSQL,
}

#[derive(Clone)]
enum DatabaseBackend {
    Memory(MemoryEngine),
    #[cfg(feature = "postgresql")]
    PostgreSQL(PostgresEngine),
}

/// Pooled storage engine plus the mutation subscriber chain
#[derive(Clone)]
pub struct Database {
    backend: DatabaseBackend,
    subscribers: Arc<[Arc<dyn MutationSubscriber>]>,
}

impl Database {
    fn with_backend(backend: DatabaseBackend) -> Self {
        let guard: Arc<dyn MutationSubscriber> = Arc::new(SessionGuard);
        Self {
            backend,
            subscribers: Arc::from(vec![guard]),
        }
    }

    /// Connect the engine named by the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be reached, or if a PostgreSQL
    /// URL is configured without the `postgresql` feature
    pub async fn connect(config: &DatabaseConfig) -> DatabaseResult<Self> {
        let database = match &config.url {
            DatabaseUrl::Memory => Self::in_memory(config),
            #[cfg(feature = "postgresql")]
            DatabaseUrl::PostgreSQL { connection_string } => {
                Self::with_backend(DatabaseBackend::PostgreSQL(
                    PostgresEngine::connect(
                        connection_string,
                        config.max_connections,
                        config.acquire_timeout,
                    )
                    .await?,
                ))
            }
            #[cfg(not(feature = "postgresql"))]
            DatabaseUrl::PostgreSQL { .. } => {
                return Err(DatabaseError::Unsupported {
                    engine: "postgresql",
                    operation: "connect (build with --features postgresql)",
                })
            }
        };
        info!(backend = database.backend_info(), "database connected");
        Ok(database)
    }

    /// In-process engine with the given pool settings
    #[must_use]
    pub fn in_memory(config: &DatabaseConfig) -> Self {
        Self::with_backend(DatabaseBackend::Memory(MemoryEngine::new(
            config.max_connections,
            config.acquire_timeout,
        )))
    }

    /// Append a mutation subscriber after the existing ones
    #[must_use]
    pub fn with_subscriber(mut self, subscriber: Arc<dyn MutationSubscriber>) -> Self {
        let mut chain: Vec<Arc<dyn MutationSubscriber>> = self.subscribers.iter().cloned().collect();
        debug!(subscriber = subscriber.name(), "mutation subscriber registered");
        chain.push(subscriber);
        self.subscribers = Arc::from(chain);
        self
    }

    /// Names of the registered subscribers, in execution order
    #[must_use]
    pub fn subscriber_names(&self) -> Vec<&'static str> {
        self.subscribers.iter().map(|s| s.name()).collect()
    }

    /// Create the given tables if they do not exist
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the schema
    pub async fn migrate(&self, tables: &[&'static TableDef]) -> DatabaseResult<()> {
        match &self.backend {
            DatabaseBackend::Memory(engine) => {
                engine.migrate(tables).await;
                Ok(())
            }
            #[cfg(feature = "postgresql")]
            DatabaseBackend::PostgreSQL(engine) => engine.migrate(tables).await,
        }
    }

    /// Check out a connection and open a transaction with no session state
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::PoolTimeout`] when the pool is exhausted
    pub async fn begin(&self) -> DatabaseResult<TransactionHandle> {
        let raw: Box<dyn EngineConnection> = match &self.backend {
            DatabaseBackend::Memory(engine) => Box::new(engine.begin().await?),
            #[cfg(feature = "postgresql")]
            DatabaseBackend::PostgreSQL(engine) => Box::new(engine.begin().await?),
        };
        let connection = SubscribedConnection::new(raw, Arc::clone(&self.subscribers));
        let handle = TransactionHandle::new(Box::new(connection));
        debug!(connection_id = %handle.id(), "transaction opened");
        Ok(handle)
    }

    /// Connections currently checked out of the pool
    #[must_use]
    pub fn open_connections(&self) -> usize {
        match &self.backend {
            DatabaseBackend::Memory(engine) => engine.open_connections(),
            #[cfg(feature = "postgresql")]
            DatabaseBackend::PostgreSQL(engine) => engine.open_connections(),
        }
    }

    /// Get a descriptive string for the current database backend
    #[must_use]
    pub const fn backend_info(&self) -> &'static str {
        match &self.backend {
            DatabaseBackend::Memory(_) => "In-Process (Development and Tests)",
            #[cfg(feature = "postgresql")]
            DatabaseBackend::PostgreSQL(_) => "PostgreSQL (Row-Level Security)",
        }
    }

    /// Get the database type enum
    #[must_use]
    pub const fn database_type(&self) -> DatabaseType {
        match &self.backend {
            DatabaseBackend::Memory(_) => DatabaseType::Memory,
            #[cfg(feature = "postgresql")]
            DatabaseBackend::PostgreSQL(_) => DatabaseType::PostgreSQL,
        }
    }
}
