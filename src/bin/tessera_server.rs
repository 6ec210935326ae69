// ABOUTME: Server binary: configuration, logging, database preparation, and HTTP serving
// ABOUTME: Startup reconciles the permission catalogue before accepting requests
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Tessera Server
//!
//! ```bash
//! JWT_SECRET=... DATABASE_URL=postgres://app@localhost/tessera cargo run --bin tessera-server
//!
//! # Override the port
//! cargo run --bin tessera-server -- --port 9090
//! ```

use std::sync::Arc;

use clap::Parser;
use tracing::info;

use tessera_server::config::environment::{DatabaseUrl, ServerConfig};
use tessera_server::errors::AppResult;
use tessera_server::logging::init_logging;
use tessera_server::resources::ServerResources;
use tessera_server::server::serve;

#[derive(Parser)]
#[command(
    name = "tessera-server",
    about = "Tessera multi-tenant server",
    long_about = "Serve the tenant-scoped HTTP API; configuration comes from the environment"
)]
struct ServerArgs {
    /// HTTP port override
    #[arg(long)]
    port: Option<u16>,

    /// Database URL override
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let args = ServerArgs::parse();

    let mut config = ServerConfig::from_env()?;
    if let Some(port) = args.port {
        config.http_port = port;
    }
    if let Some(url) = args.database_url {
        config.database.url = DatabaseUrl::parse_url(&url)?;
    }

    init_logging(&config.logging)?;
    info!(
        port = config.http_port,
        engine = config.database.url.engine_name(),
        tenant_header = %config.tenant_header,
        "starting tessera-server"
    );

    let resources = Arc::new(ServerResources::initialize(config).await?);
    serve(resources).await
}
