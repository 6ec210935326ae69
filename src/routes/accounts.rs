// ABOUTME: Route handlers for accounts, journal entries, and the trial balance
// ABOUTME: Handlers never name a tenant; the request transaction and repositories supply it
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;

use super::guarded;
use crate::accounting::{Account, NewAccount, NewJournalEntry, PostedEntry, TrialBalance};
use crate::errors::AppError;
use crate::permissions::Permission;
use crate::resources::ServerResources;

/// Body of `PATCH /api/accounts/:id`
#[derive(Debug, Deserialize)]
pub struct RenameAccountRequest {
    /// New display name
    pub name: String,
}

/// Accounting routes
pub struct AccountingRoutes;

impl AccountingRoutes {
    /// Create all accounting routes
    pub fn routes(resources: &Arc<ServerResources>) -> Router {
        Router::new()
            .route(
                "/api/accounts",
                guarded(get(Self::handle_list), resources, Permission::AccountsRead).merge(
                    guarded(post(Self::handle_create), resources, Permission::AccountsWrite),
                ),
            )
            .route(
                "/api/accounts/:id",
                guarded(get(Self::handle_get), resources, Permission::AccountsRead)
                    .merge(guarded(
                        patch(Self::handle_rename),
                        resources,
                        Permission::AccountsWrite,
                    ))
                    .merge(guarded(
                        delete(Self::handle_delete),
                        resources,
                        Permission::AccountsWrite,
                    )),
            )
            .route(
                "/api/journal-entries",
                guarded(post(Self::handle_post_entry), resources, Permission::JournalPost),
            )
            .route(
                "/api/reports/trial-balance",
                guarded(
                    get(Self::handle_trial_balance),
                    resources,
                    Permission::ReportsRead,
                ),
            )
            .with_state(Arc::clone(resources))
    }

    async fn handle_list(
        State(resources): State<Arc<ServerResources>>,
    ) -> Result<Json<Vec<Account>>, AppError> {
        Ok(Json(resources.accounting.list_accounts().await?))
    }

    async fn handle_create(
        State(resources): State<Arc<ServerResources>>,
        Json(request): Json<NewAccount>,
    ) -> Result<impl IntoResponse, AppError> {
        let account = resources.accounting.create_account(request).await?;
        Ok((StatusCode::CREATED, Json(account)))
    }

    async fn handle_get(
        State(resources): State<Arc<ServerResources>>,
        Path(id): Path<String>,
    ) -> Result<Json<Account>, AppError> {
        Ok(Json(resources.accounting.get_account(&id).await?))
    }

    async fn handle_rename(
        State(resources): State<Arc<ServerResources>>,
        Path(id): Path<String>,
        Json(request): Json<RenameAccountRequest>,
    ) -> Result<Json<Account>, AppError> {
        Ok(Json(
            resources
                .accounting
                .rename_account(&id, &request.name)
                .await?,
        ))
    }

    async fn handle_delete(
        State(resources): State<Arc<ServerResources>>,
        Path(id): Path<String>,
    ) -> Result<StatusCode, AppError> {
        resources.accounting.delete_account(&id).await?;
        Ok(StatusCode::NO_CONTENT)
    }

    async fn handle_post_entry(
        State(resources): State<Arc<ServerResources>>,
        Json(request): Json<NewJournalEntry>,
    ) -> Result<(StatusCode, Json<PostedEntry>), AppError> {
        let posted = resources.accounting.post_journal_entry(request).await?;
        Ok((StatusCode::CREATED, Json(posted)))
    }

    async fn handle_trial_balance(
        State(resources): State<Arc<ServerResources>>,
    ) -> Result<Json<TrialBalance>, AppError> {
        Ok(Json(resources.accounting.trial_balance().await?))
    }
}
