// ABOUTME: Tenant bootstrap command creating built-in roles and an owner assignment
// ABOUTME: Runs inside a tenant scope and request transaction like any HTTP request would
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use tessera_core::models::{TenantId, UserId};
use tessera_server::auth::AuthManager;
use tessera_server::config::environment::{DatabaseUrl, ServerConfig};
use tessera_server::context::{self, TenantStore};
use tessera_server::errors::{AppError, AppResult};
use tessera_server::middleware::run_in_request_transaction;
use tessera_server::permissions::{provision_tenant_roles, OWNER_ROLE};
use tessera_server::resources::prepare_database;
use tracing::{info, warn};

/// Provision roles for `tenant` and print an owner token
pub async fn bootstrap(config: &ServerConfig, tenant: &str, owner: Option<&str>) -> AppResult<()> {
    let tenant_id = TenantId::parse(tenant)?;
    let owner = match owner {
        Some(raw) => raw
            .parse::<UserId>()
            .map_err(|e| AppError::invalid_input(format!("invalid owner id: {e}")))?,
        None => UserId::new_random(),
    };
    if config.database.url == DatabaseUrl::Memory {
        warn!("in-process database: bootstrapped roles vanish when this command exits");
    }

    let database = prepare_database(config).await?;
    let store = TenantStore::with_user(tenant_id.clone(), owner);
    let roles = context::scope(
        store,
        run_in_request_transaction(&database, provision_tenant_roles(&database, owner)),
    )
    .await?;
    info!(tenant_id = %tenant_id, owner = %owner, roles = roles.len(), "tenant bootstrapped");

    let token = AuthManager::new(&config.auth).generate_token(
        owner,
        &tenant_id,
        &[OWNER_ROLE.to_owned()],
    )?;
    println!("tenant:  {tenant_id}");
    println!("owner:   {owner}");
    for role in &roles {
        println!("role:    {} ({})", role.name, role.id);
    }
    println!("token:   {token}");
    Ok(())
}
