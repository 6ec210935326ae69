// ABOUTME: Token issuing command for existing users
// ABOUTME: Signs with JWT_SECRET; role names are embedded verbatim
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use tessera_core::models::{TenantId, UserId};
use tessera_server::auth::AuthManager;
use tessera_server::config::environment::ServerConfig;
use tessera_server::errors::{AppError, AppResult};

/// Print a signed token for `user` in `tenant`
pub fn issue(config: &ServerConfig, tenant: &str, user: &str, roles: &[String]) -> AppResult<()> {
    let tenant_id = TenantId::parse(tenant)?;
    let user_id = user
        .parse::<UserId>()
        .map_err(|e| AppError::invalid_input(format!("invalid user id: {e}")))?;
    let token = AuthManager::new(&config.auth).generate_token(user_id, &tenant_id, roles)?;
    println!("{token}");
    Ok(())
}
