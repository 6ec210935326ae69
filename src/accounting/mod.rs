// ABOUTME: Accounting module exercising the tenant-scoped core: accounts, journal posting, trial balance
// ABOUTME: All storage goes through context-routed repositories; no method takes a tenant or connection
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

/// Accounting entities and request/response types
pub mod models;

pub use models::{
    Account, AccountKind, JournalEntry, JournalLine, NewAccount, NewJournalEntry, NewJournalLine,
    PostedEntry, TrialBalance, TrialBalanceRow,
};

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::info;
use uuid::Uuid;

use crate::context;
use crate::database::{Database, SortDirection, TableDef};
use crate::errors::{AppError, AppResult};
use crate::repository::{Entity, Repository};

/// Tables owned by this module
pub const TABLES: [&TableDef; 3] = [Account::TABLE, JournalEntry::TABLE, JournalLine::TABLE];

/// Accounting operations for the tenant in context
///
/// Visibility is enforced by the storage engine: an account of another
/// tenant is indistinguishable from one that does not exist.
#[derive(Clone)]
pub struct AccountingService {
    accounts: Repository<Account>,
    entries: Repository<JournalEntry>,
    lines: Repository<JournalLine>,
}

impl AccountingService {
    /// Service backed by `database`
    #[must_use]
    pub fn new(database: &Database) -> Self {
        Self {
            accounts: Repository::new(database.clone()),
            entries: Repository::new(database.clone()),
            lines: Repository::new(database.clone()),
        }
    }

    /// Create an account
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank code or name, or a conflict
    /// when the code is already used in this tenant
    pub async fn create_account(&self, request: NewAccount) -> AppResult<Account> {
        let tenant_id = context::require_tenant_id()?;
        let code = request.code.trim();
        let name = request.name.trim();
        if code.is_empty() {
            return Err(AppError::missing_field("code"));
        }
        if name.is_empty() {
            return Err(AppError::missing_field("name"));
        }
        let account = self
            .accounts
            .insert(&Account {
                id: Uuid::new_v4().to_string(),
                tenant_id,
                code: code.to_owned(),
                name: name.to_owned(),
                kind: request.kind,
                created_at: Utc::now(),
            })
            .await?;
        info!(account_id = %account.id, code = %account.code, "account created");
        Ok(account)
    }

    /// Every visible account, ordered by code
    ///
    /// # Errors
    ///
    /// Returns an error outside a tenant scope or if the lookup fails
    pub async fn list_accounts(&self) -> AppResult<Vec<Account>> {
        context::require_tenant_id()?;
        Ok(self
            .accounts
            .query()
            .order_by("code", SortDirection::Asc)
            .fetch_all()
            .await?)
    }

    /// One account by id
    ///
    /// # Errors
    ///
    /// Returns not found when the account is absent or belongs to another
    /// tenant
    pub async fn get_account(&self, id: &str) -> AppResult<Account> {
        context::require_tenant_id()?;
        self.accounts
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("account {id}")))
    }

    /// Rename an account
    ///
    /// # Errors
    ///
    /// Returns not found when no visible row was affected
    pub async fn rename_account(&self, id: &str, name: &str) -> AppResult<Account> {
        context::require_tenant_id()?;
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::missing_field("name"));
        }
        let mut changes = Map::new();
        changes.insert("name".to_owned(), Value::String(name.to_owned()));
        if self.accounts.patch(id, changes).await? == 0 {
            return Err(AppError::not_found(format!("account {id}")));
        }
        self.get_account(id).await
    }

    /// Delete an account without postings
    ///
    /// # Errors
    ///
    /// Returns a validation error when lines reference the account, or not
    /// found when no visible row was affected
    pub async fn delete_account(&self, id: &str) -> AppResult<()> {
        context::require_tenant_id()?;
        let postings = self.lines.query().eq("account_id", id).count().await?;
        if postings > 0 {
            return Err(AppError::invalid_input(format!(
                "account {id} has {postings} posted lines"
            )));
        }
        if self.accounts.delete(id).await? == 0 {
            return Err(AppError::not_found(format!("account {id}")));
        }
        info!(account_id = %id, "account deleted");
        Ok(())
    }

    /// Post a balanced journal entry
    ///
    /// Every line must carry exactly one positive side and name an account
    /// visible in this tenant; total debits must equal total credits.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty, unbalanced, or malformed
    /// entry, or for an unknown account code
    pub async fn post_journal_entry(&self, request: NewJournalEntry) -> AppResult<PostedEntry> {
        let tenant_id = context::require_tenant_id()?;
        validate_lines(&request.lines)?;

        let codes: HashSet<&str> = request
            .lines
            .iter()
            .map(|line| line.account_code.as_str())
            .collect();
        let accounts: HashMap<String, Account> = self
            .accounts
            .query()
            .is_in("code", codes.iter().map(|c| (*c).to_owned()))
            .fetch_all()
            .await?
            .into_iter()
            .map(|account| (account.code.clone(), account))
            .collect();
        if let Some(unknown) = codes.iter().find(|code| !accounts.contains_key(**code)) {
            return Err(AppError::invalid_input(format!(
                "unknown account code {unknown}"
            )));
        }

        let entry = self
            .entries
            .insert(&JournalEntry {
                id: Uuid::new_v4().to_string(),
                tenant_id: tenant_id.clone(),
                description: request.description.trim().to_owned(),
                posted_by: context::current_user_id(),
                posted_at: Utc::now(),
            })
            .await?;

        let mut lines = Vec::with_capacity(request.lines.len());
        for line in &request.lines {
            let account_id = accounts
                .get(&line.account_code)
                .map(|account| account.id.clone())
                .ok_or_else(|| {
                    AppError::invalid_input(format!("unknown account code {}", line.account_code))
                })?;
            lines.push(
                self.lines
                    .insert(&JournalLine {
                        id: Uuid::new_v4().to_string(),
                        tenant_id: tenant_id.clone(),
                        entry_id: entry.id.clone(),
                        account_id,
                        debit: line.debit,
                        credit: line.credit,
                    })
                    .await?,
            );
        }

        info!(entry_id = %entry.id, lines = lines.len(), "journal entry posted");
        Ok(PostedEntry { entry, lines })
    }

    /// Debit and credit totals for every account with postings
    ///
    /// # Errors
    ///
    /// Returns an error outside a tenant scope, if a lookup fails, or if a
    /// total exceeds the amount range
    pub async fn trial_balance(&self) -> AppResult<TrialBalance> {
        context::require_tenant_id()?;
        let totals = tally(self.lines.query().fetch_all().await?)?;
        if totals.is_empty() {
            return Ok(TrialBalance {
                accounts: Vec::new(),
                total_debit: 0,
                total_credit: 0,
                balance: 0,
            });
        }

        let accounts = self
            .accounts
            .query()
            .is_in("id", totals.keys().cloned())
            .fetch_all()
            .await?;
        let mut rows: BTreeMap<String, TrialBalanceRow> = BTreeMap::new();
        for account in accounts {
            let (debit, credit) = totals.get(&account.id).copied().unwrap_or_default();
            rows.insert(
                account.code.clone(),
                TrialBalanceRow {
                    account_id: account.id,
                    code: account.code,
                    name: account.name,
                    debit,
                    credit,
                    balance: difference(debit, credit)?,
                },
            );
        }
        let mut total_debit: i64 = 0;
        let mut total_credit: i64 = 0;
        for row in rows.values() {
            total_debit = sum(total_debit, row.debit)?;
            total_credit = sum(total_credit, row.credit)?;
        }
        Ok(TrialBalance {
            accounts: rows.into_values().collect(),
            total_debit,
            total_credit,
            balance: difference(total_debit, total_credit)?,
        })
    }
}

/// Debit and credit totals per account id
fn tally(lines: impl IntoIterator<Item = JournalLine>) -> AppResult<HashMap<String, (i64, i64)>> {
    let mut totals: HashMap<String, (i64, i64)> = HashMap::new();
    for line in lines {
        let entry = totals.entry(line.account_id).or_insert((0, 0));
        entry.0 = sum(entry.0, line.debit)?;
        entry.1 = sum(entry.1, line.credit)?;
    }
    Ok(totals)
}

fn sum(total: i64, amount: i64) -> AppResult<i64> {
    total
        .checked_add(amount)
        .ok_or_else(|| AppError::invalid_input("trial balance total overflows the amount range"))
}

fn difference(debit: i64, credit: i64) -> AppResult<i64> {
    debit
        .checked_sub(credit)
        .ok_or_else(|| AppError::invalid_input("trial balance overflows the amount range"))
}

fn validate_lines(lines: &[NewJournalLine]) -> AppResult<()> {
    if lines.is_empty() {
        return Err(AppError::invalid_input("journal entry has no lines"));
    }
    let mut debits: i64 = 0;
    let mut credits: i64 = 0;
    for (index, line) in lines.iter().enumerate() {
        if line.debit < 0 || line.credit < 0 {
            return Err(AppError::invalid_input(format!(
                "line {index}: amounts must not be negative"
            )));
        }
        match (line.debit > 0, line.credit > 0) {
            (true, true) => {
                return Err(AppError::invalid_input(format!(
                    "line {index}: a line is either a debit or a credit"
                )))
            }
            (false, false) => {
                return Err(AppError::invalid_input(format!(
                    "line {index}: amount must be positive"
                )))
            }
            _ => {}
        }
        debits = debits
            .checked_add(line.debit)
            .ok_or_else(|| AppError::invalid_input("debit total overflows"))?;
        credits = credits
            .checked_add(line.credit)
            .ok_or_else(|| AppError::invalid_input("credit total overflows"))?;
    }
    if debits != credits {
        return Err(AppError::invalid_input(format!(
            "entry is unbalanced: debits {debits} != credits {credits}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCode;
    use tessera_core::models::TenantId;

    fn line(code: &str, debit: i64, credit: i64) -> NewJournalLine {
        NewJournalLine {
            account_code: code.to_owned(),
            debit,
            credit,
        }
    }

    #[test]
    fn balanced_lines_pass() {
        assert!(validate_lines(&[line("1000", 1000, 0), line("4000", 0, 1000)]).is_ok());
    }

    #[test]
    fn malformed_lines_are_rejected() {
        assert!(validate_lines(&[]).is_err());
        assert!(validate_lines(&[line("1000", 1000, 0), line("4000", 0, 900)]).is_err());
        assert!(validate_lines(&[line("1000", 500, 500)]).is_err());
        assert!(validate_lines(&[line("1000", 0, 0)]).is_err());
        assert!(validate_lines(&[line("1000", -5, 0), line("4000", 0, -5)]).is_err());
    }

    fn posted(account_id: &str, debit: i64, credit: i64) -> JournalLine {
        JournalLine {
            id: Uuid::new_v4().to_string(),
            tenant_id: TenantId::parse("aaa").unwrap(),
            entry_id: Uuid::new_v4().to_string(),
            account_id: account_id.to_owned(),
            debit,
            credit,
        }
    }

    #[test]
    fn tally_sums_per_account() {
        let totals = tally(vec![
            posted("cash", 700, 0),
            posted("cash", 300, 0),
            posted("sales", 0, 1000),
        ])
        .unwrap();
        assert_eq!(totals["cash"], (1000, 0));
        assert_eq!(totals["sales"], (0, 1000));
    }

    #[test]
    fn tally_rejects_totals_beyond_the_amount_range() {
        let err = tally(vec![
            posted("cash", i64::MAX, 0),
            posted("sales", 0, i64::MAX),
            posted("cash", i64::MAX, 0),
            posted("sales", 0, i64::MAX),
        ])
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);
        assert!(sum(i64::MAX, 1).is_err());
        assert_eq!(difference(i64::MAX, i64::MAX).unwrap(), 0);
    }
}
