// ABOUTME: Shared model types for the Tessera tenant-scoped execution core
// ABOUTME: Tenant and user identifiers plus audit ledger entries used across crates
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Tessera Core
//!
//! Identifier newtypes and audit records shared between the server crate and
//! its tooling. Nothing here touches the database or the async runtime.

/// Identifier and audit models
pub mod models;
