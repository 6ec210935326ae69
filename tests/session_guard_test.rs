// ABOUTME: Integration tests for the mutation session guard and the audit ledger subscriber
// ABOUTME: Writes on ad-hoc transactions pick up context identity; writes without context meet default deny
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use anyhow::Result;
use chrono::Utc;
use serde_json::{json, Map};
use tessera_core::models::{AuditEntry, UserId};
use tessera_server::accounting::{Account, AccountKind};
use tessera_server::context::{self, TenantStore};
use tessera_server::database::{DatabaseError, Query, SessionState};
use tessera_server::errors::AppResult;
use tessera_server::repository::Repository;
use uuid::Uuid;

fn account(tenant_id: &str, code: &str) -> Account {
    Account {
        id: Uuid::new_v4().to_string(),
        tenant_id: common::tenant(tenant_id),
        code: code.to_owned(),
        name: format!("Account {code}"),
        kind: AccountKind::Expense,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn guard_runs_before_the_audit_ledger() -> Result<()> {
    let database = common::create_test_database().await?;
    assert_eq!(database.subscriber_names(), vec!["session_guard", "audit_ledger"]);
    Ok(())
}

#[tokio::test]
async fn ad_hoc_transaction_without_session_state_gets_it_from_context() -> Result<()> {
    let database = common::create_test_database().await?;
    let transaction = database.begin().await?;
    let on_transaction: Repository<Account> = Repository::bound_to(transaction.clone());
    let created = account("aaa", "5000");

    context::scope(TenantStore::new(common::tenant("aaa")), async {
        assert!(transaction.lock().await?.session().is_none());
        on_transaction.insert(&created).await?;
        let session = transaction.lock().await?.session().cloned().unwrap();
        assert_eq!(session.tenant_id.as_str(), "aaa");
        Ok::<_, anyhow::Error>(())
    })
    .await?;
    transaction.commit().await?;

    let accounts: Repository<Account> = Repository::new(database.clone());
    let found = common::in_request(&database, "aaa", None, async {
        AppResult::Ok(accounts.find_by_id(&created.id).await?)
    })
    .await?;
    assert_eq!(found, Some(created));
    Ok(())
}

#[tokio::test]
async fn guard_replaces_stale_session_state() -> Result<()> {
    let database = common::create_test_database().await?;
    let transaction = database.begin().await?;
    transaction
        .lock()
        .await?
        .set_session(&SessionState::new(common::tenant("bbb")))
        .await?;
    let on_transaction: Repository<Account> = Repository::bound_to(transaction.clone());

    context::scope(TenantStore::new(common::tenant("aaa")), async {
        on_transaction.insert(&account("aaa", "5000")).await
    })
    .await?;
    let session = transaction.lock().await?.session().cloned().unwrap();
    assert_eq!(session.tenant_id.as_str(), "aaa");
    transaction.rollback().await?;
    Ok(())
}

#[tokio::test]
async fn mutation_without_context_is_denied_by_the_engine() -> Result<()> {
    let database = common::create_test_database().await?;
    let transaction = database.begin().await?;
    let on_transaction: Repository<Account> = Repository::bound_to(transaction.clone());

    let err = on_transaction
        .insert(&account("aaa", "5000"))
        .await
        .unwrap_err();
    assert!(matches!(err, DatabaseError::PolicyViolation { .. }));
    assert!(on_transaction.find(Query::new()).await?.is_empty());
    transaction.rollback().await?;
    Ok(())
}

#[tokio::test]
async fn ledger_stamps_tenant_and_user_and_skips_no_op_writes() -> Result<()> {
    let database = common::create_test_database().await?;
    let accounts: Repository<Account> = Repository::new(database.clone());
    let ledger: Repository<AuditEntry> = Repository::new(database.clone());
    let user = UserId::new_random();
    let created = account("aaa", "1000");

    common::in_request(&database, "aaa", Some(user), async {
        accounts.insert(&created).await?;
        let mut changes = Map::new();
        changes.insert("name".to_owned(), json!("Cash"));
        accounts.patch(&created.id, changes.clone()).await?;
        // Matches nothing, so nothing is recorded.
        accounts.patch("missing", changes).await?;
        AppResult::Ok(())
    })
    .await?;

    let entries = common::in_request(&database, "aaa", None, async {
        AppResult::Ok(ledger.query().eq("table_name", "accounts").fetch_all().await?)
    })
    .await?;
    let mut actions: Vec<&str> = entries.iter().map(|e| e.action.as_str()).collect();
    actions.sort_unstable();
    assert_eq!(actions, vec!["insert", "update"]);
    for entry in &entries {
        assert_eq!(entry.tenant_id.as_str(), "aaa");
        assert_eq!(entry.user_id, Some(user));
        assert_eq!(entry.entity_id.as_deref(), Some(created.id.as_str()));
        assert_eq!(entry.affected, 1);
    }

    let foreign = common::in_request(&database, "bbb", None, async {
        AppResult::Ok(ledger.query().count().await?)
    })
    .await?;
    assert_eq!(foreign, 0);
    Ok(())
}
