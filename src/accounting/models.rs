// ABOUTME: Chart-of-accounts and journal entities stored in tenant-scoped tables
// ABOUTME: Amounts are integer minor units; each journal line is debit-only or credit-only
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tessera_core::models::{TenantId, UserId};

use crate::database::{ColumnDef, TableDef};
use crate::repository::Entity;

/// Classification of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    /// Resources owned
    Asset,
    /// Obligations owed
    Liability,
    /// Owner's residual interest
    Equity,
    /// Income
    Revenue,
    /// Costs
    Expense,
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Asset => "asset",
            Self::Liability => "liability",
            Self::Equity => "equity",
            Self::Revenue => "revenue",
            Self::Expense => "expense",
        };
        f.write_str(name)
    }
}

/// Ledger account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account id
    pub id: String,
    /// Owning tenant
    pub tenant_id: TenantId,
    /// Account code, unique within the tenant
    pub code: String,
    /// Display name
    pub name: String,
    /// Classification
    pub kind: AccountKind,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Entity for Account {
    const TABLE: &'static TableDef = &TableDef {
        name: "accounts",
        primary_key: "id",
        columns: &[
            ColumnDef::text("id"),
            ColumnDef::text("tenant_id"),
            ColumnDef::text("code"),
            ColumnDef::text("name"),
            ColumnDef::text("kind"),
            ColumnDef::timestamp("created_at"),
        ],
        tenant_scoped: true,
        unique: &[&["tenant_id", "code"]],
    };

    fn id(&self) -> &str {
        &self.id
    }
}

/// Header of a posted journal entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Entry id
    pub id: String,
    /// Owning tenant
    pub tenant_id: TenantId,
    /// Free-text memo
    pub description: String,
    /// User who posted the entry
    pub posted_by: Option<UserId>,
    /// Posting time
    pub posted_at: DateTime<Utc>,
}

impl Entity for JournalEntry {
    const TABLE: &'static TableDef = &TableDef {
        name: "journal_entries",
        primary_key: "id",
        columns: &[
            ColumnDef::text("id"),
            ColumnDef::text("tenant_id"),
            ColumnDef::text("description"),
            ColumnDef::text("posted_by").nullable(),
            ColumnDef::timestamp("posted_at"),
        ],
        tenant_scoped: true,
        unique: &[],
    };

    fn id(&self) -> &str {
        &self.id
    }
}

/// One side of a journal entry against one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalLine {
    /// Line id
    pub id: String,
    /// Owning tenant
    pub tenant_id: TenantId,
    /// Parent entry
    pub entry_id: String,
    /// Account posted to
    pub account_id: String,
    /// Debit amount in minor units
    pub debit: i64,
    /// Credit amount in minor units
    pub credit: i64,
}

impl Entity for JournalLine {
    const TABLE: &'static TableDef = &TableDef {
        name: "journal_lines",
        primary_key: "id",
        columns: &[
            ColumnDef::text("id"),
            ColumnDef::text("tenant_id"),
            ColumnDef::text("entry_id"),
            ColumnDef::text("account_id"),
            ColumnDef::bigint("debit"),
            ColumnDef::bigint("credit"),
        ],
        tenant_scoped: true,
        unique: &[],
    };

    fn id(&self) -> &str {
        &self.id
    }
}

/// Request to create an account
#[derive(Debug, Clone, Deserialize)]
pub struct NewAccount {
    /// Account code
    pub code: String,
    /// Display name
    pub name: String,
    /// Classification
    pub kind: AccountKind,
}

/// Request to post one line
#[derive(Debug, Clone, Deserialize)]
pub struct NewJournalLine {
    /// Code of the account to post to
    pub account_code: String,
    /// Debit amount; zero or omitted for a credit line
    #[serde(default)]
    pub debit: i64,
    /// Credit amount; zero or omitted for a debit line
    #[serde(default)]
    pub credit: i64,
}

/// Request to post a journal entry
#[derive(Debug, Clone, Deserialize)]
pub struct NewJournalEntry {
    /// Free-text memo
    #[serde(default)]
    pub description: String,
    /// Lines; debits must equal credits
    pub lines: Vec<NewJournalLine>,
}

/// A posted entry with its lines
#[derive(Debug, Clone, Serialize)]
pub struct PostedEntry {
    /// Header
    pub entry: JournalEntry,
    /// Lines in request order
    pub lines: Vec<JournalLine>,
}

/// Per-account totals
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrialBalanceRow {
    /// Account id
    pub account_id: String,
    /// Account code
    pub code: String,
    /// Account name
    pub name: String,
    /// Sum of debits
    pub debit: i64,
    /// Sum of credits
    pub credit: i64,
    /// Debits minus credits
    pub balance: i64,
}

/// Trial balance over every account with postings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrialBalance {
    /// Rows ordered by account code
    pub accounts: Vec<TrialBalanceRow>,
    /// Sum of all debits
    pub total_debit: i64,
    /// Sum of all credits
    pub total_credit: i64,
    /// Total debits minus total credits; zero for a consistent ledger
    pub balance: i64,
}
