// ABOUTME: Read access to the tenant's audit ledger
// ABOUTME: Newest entries first, bounded page size
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tessera_core::models::AuditEntry;

use super::guarded;
use crate::database::SortDirection;
use crate::errors::AppError;
use crate::permissions::Permission;
use crate::repository::Repository;
use crate::resources::ServerResources;

const DEFAULT_PAGE_SIZE: u64 = 50;
const MAX_PAGE_SIZE: u64 = 500;

/// Query string of `GET /api/audit`
#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    /// Page size, capped at 500
    pub limit: Option<u64>,
    /// Entries to skip
    pub offset: Option<u64>,
    /// Only entries for this table
    pub table: Option<String>,
}

/// Audit routes
pub struct AuditRoutes;

impl AuditRoutes {
    /// `GET /api/audit`
    pub fn routes(resources: &Arc<ServerResources>) -> Router {
        Router::new()
            .route(
                "/api/audit",
                guarded(get(Self::handle_list), resources, Permission::AuditRead),
            )
            .with_state(Arc::clone(resources))
    }

    async fn handle_list(
        State(resources): State<Arc<ServerResources>>,
        Query(params): Query<AuditQuery>,
    ) -> Result<Json<Vec<AuditEntry>>, AppError> {
        let ledger: Repository<AuditEntry> = Repository::new(resources.database.clone());
        let mut query = ledger.query();
        if let Some(table) = params.table {
            query = query.eq("table_name", table);
        }
        let entries = query
            .order_by("recorded_at", SortDirection::Desc)
            .limit(params.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE))
            .offset(params.offset.unwrap_or(0))
            .fetch_all()
            .await?;
        Ok(Json(entries))
    }
}
