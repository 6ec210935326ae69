// ABOUTME: Security collaborators layered on the tenant-scoped execution core
// ABOUTME: Currently the mutation audit ledger
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

/// Who-changed-what ledger written alongside every mutation
pub mod audit;

pub use audit::AuditLedger;
