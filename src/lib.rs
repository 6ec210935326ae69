// ABOUTME: Main library entry point for the Tessera multi-tenant server
// ABOUTME: Tenant-scoped execution core: context carrier, request transaction, routed repositories
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![deny(unsafe_code)]

//! # Tessera Server
//!
//! A multi-tenant backend in which every row belongs to exactly one tenant
//! and is invisible to every other tenant, even when application code
//! forgets to filter.
//!
//! ## Request pipeline
//!
//! - **Tenant gate**: reads the tenant header and opens a context scope
//! - **Authentication**: verifies the bearer token and records the user
//! - **Authorization**: loads permissions in its own scoped transaction
//! - **Request transaction**: one transaction per request with session
//!   state set, published in the context carrier
//! - **Repositories**: resolve the published transaction on every call
//! - **Mutation subscribers**: reassert session state before each write and
//!   append to the audit ledger afterwards
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use tessera_server::config::environment::ServerConfig;
//! use tessera_server::errors::AppResult;
//! use tessera_server::resources::ServerResources;
//!
//! #[tokio::main]
//! async fn main() -> AppResult<()> {
//!     let config = ServerConfig::from_env()?;
//!     let resources = Arc::new(ServerResources::initialize(config).await?);
//!     tessera_server::server::serve(resources).await
//! }
//! ```

/// Accounting business module
pub mod accounting;

/// JWT issuing and verification
pub mod auth;

/// Authorization evaluator
pub mod authorization;

/// Environment configuration
pub mod config;

/// Task-local context carrier
pub mod context;

/// Storage engines, session state, and mutation subscribers
pub mod database;

/// Application error types
pub mod errors;

/// Tracing subscriber setup
pub mod logging;

/// Request pipeline middleware
pub mod middleware;

/// Permission catalogue and tenant roles
pub mod permissions;

/// Context-routed repositories
pub mod repository;

/// Shared server resources
pub mod resources;

/// HTTP routes
pub mod routes;

/// Audit ledger
pub mod security;

/// HTTP server assembly
pub mod server;
