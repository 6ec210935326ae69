// ABOUTME: Permission catalogue seeding command
// ABOUTME: Idempotent; prints how many codes were inserted
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use tessera_server::config::environment::ServerConfig;
use tessera_server::errors::AppResult;
use tessera_server::permissions::Permission;
use tessera_server::resources::prepare_database;
use tracing::info;

/// Connect, migrate, and reconcile the permission catalogue
pub async fn seed(config: &ServerConfig) -> AppResult<()> {
    // prepare_database reconciles as its last step
    let database = prepare_database(config).await?;
    info!(backend = database.backend_info(), "permission catalogue seeded");
    for permission in Permission::ALL {
        println!("{:<16} {}", permission.code(), permission.description());
    }
    Ok(())
}
