// ABOUTME: Operator CLI for permission seeding, tenant bootstrap, and token issuing
// ABOUTME: Reads the same environment configuration as the server
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Tessera CLI
//!
//! ```bash
//! # Insert missing permission codes
//! cargo run --bin tessera-cli -- seed-permissions
//!
//! # Create the built-in roles for a tenant and make a user its owner
//! cargo run --bin tessera-cli -- bootstrap-tenant --tenant aaa
//!
//! # Mint a token for an existing user
//! cargo run --bin tessera-cli -- issue-token --tenant aaa --user <uuid> --role accountant
//! ```

mod commands;

use clap::{Parser, Subcommand};

use tessera_server::config::environment::{DatabaseUrl, ServerConfig};
use tessera_server::errors::AppResult;
use tessera_server::logging::init_logging;

#[derive(Parser)]
#[command(
    name = "tessera-cli",
    about = "Tessera operator tool",
    long_about = "Seed permissions, bootstrap tenants, and issue tokens"
)]
struct Cli {
    /// Database URL override
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Insert any permission codes missing from the catalogue
    SeedPermissions,

    /// Create built-in roles for a tenant and assign the owner role
    BootstrapTenant {
        /// Tenant id
        #[arg(long)]
        tenant: String,

        /// Owner user id; a new one is generated when omitted
        #[arg(long)]
        owner: Option<String>,
    },

    /// Issue a signed token
    IssueToken {
        /// Tenant id
        #[arg(long)]
        tenant: String,

        /// User id
        #[arg(long)]
        user: String,

        /// Role names to embed; repeatable
        #[arg(long = "role")]
        roles: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let cli = Cli::parse();

    let mut config = ServerConfig::from_env()?;
    if let Some(url) = cli.database_url {
        config.database.url = DatabaseUrl::parse_url(&url)?;
    }
    init_logging(&config.logging)?;

    match cli.command {
        Command::SeedPermissions => commands::permissions::seed(&config).await,
        Command::BootstrapTenant { tenant, owner } => {
            commands::tenant::bootstrap(&config, &tenant, owner.as_deref()).await
        }
        Command::IssueToken {
            tenant,
            user,
            roles,
        } => commands::token::issue(&config, &tenant, &user, &roles),
    }
}
