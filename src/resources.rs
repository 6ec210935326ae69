// ABOUTME: Shared server resources handed to routes and middleware
// ABOUTME: Configuration, database, token manager, authorization evaluator, and business services
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::sync::Arc;

use tessera_core::models::AuditEntry;
use tracing::info;

use crate::accounting::{self, AccountingService};
use crate::auth::AuthManager;
use crate::authorization::AuthorizationEvaluator;
use crate::config::environment::ServerConfig;
use crate::database::{Database, TableDef};
use crate::errors::AppResult;
use crate::permissions::{self, reconcile_permission_catalog};
use crate::repository::Entity;
use crate::security::AuditLedger;

/// Every table the application creates at startup
#[must_use]
pub fn application_tables() -> Vec<&'static TableDef> {
    let mut tables: Vec<&'static TableDef> = permissions::TABLES.to_vec();
    tables.extend(accounting::TABLES);
    tables.push(AuditEntry::TABLE);
    tables
}

/// Long-lived state shared by every request
pub struct ServerResources {
    /// Loaded configuration
    pub config: Arc<ServerConfig>,
    /// Storage engine with its subscriber chain
    pub database: Database,
    /// Token issuing and verification
    pub auth_manager: AuthManager,
    /// Permission decisions
    pub authorization: AuthorizationEvaluator,
    /// Accounting operations
    pub accounting: AccountingService,
}

impl ServerResources {
    /// Assemble resources around an already prepared database
    #[must_use]
    pub fn new(config: ServerConfig, database: Database) -> Self {
        let auth_manager = AuthManager::new(&config.auth);
        let authorization = AuthorizationEvaluator::new(database.clone());
        let accounting = AccountingService::new(&database);
        Self {
            config: Arc::new(config),
            database,
            auth_manager,
            authorization,
            accounting,
        }
    }

    /// Connect the configured engine, register the audit ledger, create
    /// tables, and reconcile the permission catalogue
    ///
    /// # Errors
    ///
    /// Returns an error if any startup step fails
    pub async fn initialize(config: ServerConfig) -> AppResult<Self> {
        let database = prepare_database(&config).await?;
        Ok(Self::new(config, database))
    }
}

/// Connect, register the audit ledger, migrate, and reconcile permissions
///
/// # Errors
///
/// Returns an error if any step fails
pub async fn prepare_database(config: &ServerConfig) -> AppResult<Database> {
    let database = Database::connect(&config.database)
        .await?
        .with_subscriber(Arc::new(AuditLedger));
    database.migrate(&application_tables()).await?;
    let inserted = reconcile_permission_catalog(&database).await?;
    info!(
        backend = database.backend_info(),
        subscribers = ?database.subscriber_names(),
        permissions_inserted = inserted,
        "database ready"
    );
    Ok(database)
}
