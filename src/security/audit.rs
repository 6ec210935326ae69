// ABOUTME: Audit ledger recording who changed what after every successful mutation
// ABOUTME: Stamps tenant and user from the context carrier and writes on the executing connection
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Audit Ledger
//!
//! [`AuditLedger`] is a [`MutationSubscriber`] registered after the session
//! guard. It writes one `audit_log` row per mutating statement on the same
//! connection, so the entry commits or rolls back with the change it
//! describes. Identity comes from the context carrier; the ledger never
//! defines session state of its own.

use async_trait::async_trait;
use tessera_core::models::{AuditAction, AuditEntry};
use tracing::{debug, info};

use crate::context;
use crate::database::{
    ColumnDef, DatabaseError, EngineConnection, MutationEvent, MutationKind, MutationSubscriber,
    TableDef,
};
use crate::repository::{to_row, Entity};

impl Entity for AuditEntry {
    const TABLE: &'static TableDef = &TableDef {
        name: "audit_log",
        primary_key: "id",
        columns: &[
            ColumnDef::text("id"),
            ColumnDef::text("tenant_id"),
            ColumnDef::text("user_id").nullable(),
            ColumnDef::text("table_name"),
            ColumnDef::text("entity_id").nullable(),
            ColumnDef::text("action"),
            ColumnDef::bigint("affected"),
            ColumnDef::timestamp("recorded_at"),
        ],
        tenant_scoped: true,
        unique: &[],
    };

    fn id(&self) -> &str {
        &self.id
    }
}

const fn action_for(kind: MutationKind) -> AuditAction {
    match kind {
        MutationKind::Insert => AuditAction::Insert,
        MutationKind::Update => AuditAction::Update,
        MutationKind::Delete => AuditAction::Delete,
    }
}

/// Mutation subscriber appending to the `audit_log` table
#[derive(Debug, Default, Clone, Copy)]
pub struct AuditLedger;

#[async_trait]
impl MutationSubscriber for AuditLedger {
    fn name(&self) -> &'static str {
        "audit_ledger"
    }

    async fn after_mutation(
        &self,
        connection: &mut dyn EngineConnection,
        event: &MutationEvent,
        affected: u64,
    ) -> Result<(), DatabaseError> {
        if event.table.name == AuditEntry::TABLE.name || affected == 0 {
            return Ok(());
        }
        let Some(store) = context::current() else {
            debug!(table = event.table.name, "mutation outside tenant context not audited");
            return Ok(());
        };

        let entry = AuditEntry::new(
            store.tenant_id().clone(),
            event.table.name,
            action_for(event.kind),
            affected,
        )
        .with_user_id(store.user_id())
        .with_entity_id(event.entity_id.clone());

        info!(
            tenant_id = %entry.tenant_id,
            user_id = ?entry.user_id,
            table = %entry.table_name,
            entity_id = ?entry.entity_id,
            action = entry.action.as_str(),
            affected,
            "mutation audited"
        );
        connection.insert(AuditEntry::TABLE, to_row(&entry)?).await?;
        Ok(())
    }
}
