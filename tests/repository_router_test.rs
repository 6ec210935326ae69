// ABOUTME: Integration tests for context-routed repositories
// ABOUTME: Per-call resolution, cross-tenant invisibility, and fail-closed access outside a scope
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use anyhow::Result;
use chrono::Utc;
use serde_json::{json, Map, Value};
use tessera_server::accounting::{Account, AccountKind};
use tessera_server::context::{self, TenantStore};
use tessera_server::database::{Condition, Database, DatabaseError, Query, SortDirection};
use tessera_server::errors::AppResult;
use tessera_server::repository::Repository;
use uuid::Uuid;

fn account(tenant_id: &str, code: &str) -> Account {
    Account {
        id: Uuid::new_v4().to_string(),
        tenant_id: common::tenant(tenant_id),
        code: code.to_owned(),
        name: format!("Account {code}"),
        kind: AccountKind::Asset,
        created_at: Utc::now(),
    }
}

async fn seed_account(database: &Database, tenant_id: &str, code: &str) -> Result<Account> {
    let accounts: Repository<Account> = Repository::new(database.clone());
    let created = account(tenant_id, code);
    let stored = common::in_request(database, tenant_id, None, async {
        Ok(accounts.insert(&created).await?)
    })
    .await?;
    Ok(stored)
}

#[tokio::test]
async fn resolution_changes_when_a_transaction_is_published() -> Result<()> {
    let database = common::create_test_database().await?;
    let accounts: Repository<Account> = Repository::new(database.clone());
    let store = TenantStore::new(common::tenant("aaa"));

    context::scope(store.clone(), async {
        assert_eq!(accounts.resolved_connection(), None);

        let transaction = database.begin().await?;
        store.publish_transaction(transaction.clone())?;
        assert_eq!(accounts.resolved_connection(), Some(transaction.id()));

        transaction.rollback().await?;
        assert_eq!(accounts.resolved_connection(), None);
        Ok::<_, anyhow::Error>(())
    })
    .await?;
    assert_eq!(database.open_connections(), 0);
    Ok(())
}

#[tokio::test]
async fn repository_bound_to_the_published_transaction_is_not_rerouted() -> Result<()> {
    let database = common::create_test_database().await?;
    let transaction = database.begin().await?;
    let bound: Repository<Account> = Repository::bound_to(transaction.clone());
    let store = TenantStore::new(common::tenant("aaa"));
    store.publish_transaction(transaction.clone())?;

    context::scope(store, async {
        let resolved = bound.resolve();
        assert!(resolved.is_bound_to(&transaction));
    })
    .await;
    transaction.rollback().await?;
    Ok(())
}

#[tokio::test]
async fn builder_resolves_at_execution_not_construction() -> Result<()> {
    let database = common::create_test_database().await?;
    let accounts: Repository<Account> = Repository::new(database.clone());
    let store = TenantStore::new(common::tenant("aaa"));

    let visible = context::scope(store.clone(), async {
        let pending_query = accounts.query().eq("code", "1000");

        let transaction = database.begin().await?;
        transaction
            .lock()
            .await?
            .set_session(&store.session_state())
            .await?;
        store.publish_transaction(transaction.clone())?;
        accounts.insert(&account("aaa", "1000")).await?;

        // Uncommitted, so only the published transaction can see it.
        let found = pending_query.fetch_all().await?;
        transaction.rollback().await?;
        Ok::<_, anyhow::Error>(found)
    })
    .await?;
    assert_eq!(visible.len(), 1);
    Ok(())
}

#[tokio::test]
async fn other_tenant_reads_nothing_and_writes_affect_zero_rows() -> Result<()> {
    let database = common::create_test_database().await?;
    let created = seed_account(&database, "aaa", "1000").await?;
    let accounts: Repository<Account> = Repository::new(database.clone());

    let (found, listed, patched, deleted) = common::in_request(&database, "bbb", None, async {
        let found = accounts.find_by_id(&created.id).await?;
        let listed = accounts.find(Query::new()).await?;
        let mut changes = Map::new();
        changes.insert("name".to_owned(), json!("hijacked"));
        let patched = accounts.patch(&created.id, changes).await?;
        let deleted = accounts.delete(&created.id).await?;
        AppResult::Ok((found, listed, patched, deleted))
    })
    .await?;
    assert!(found.is_none());
    assert!(listed.is_empty());
    assert_eq!(patched, 0);
    assert_eq!(deleted, 0);

    let after = common::in_request(&database, "aaa", None, async {
        Ok(accounts.find_by_id(&created.id).await?)
    })
    .await?
    .expect("row survives in its own tenant");
    assert_eq!(after, created);
    Ok(())
}

#[tokio::test]
async fn full_surface_works_inside_one_request() -> Result<()> {
    let database = common::create_test_database().await?;
    let accounts: Repository<Account> = Repository::new(database.clone());

    common::in_request(&database, "aaa", None, async {
        for code in ["1000", "1100", "2000", "4000"] {
            accounts.insert(&account("aaa", code)).await?;
        }
        assert_eq!(accounts.count(Vec::new()).await?, 4);

        let assets_over_1000 = accounts
            .query()
            .gt("code", "1000")
            .lt("code", "4000")
            .order_by("code", SortDirection::Asc)
            .fetch_all()
            .await?;
        let codes: Vec<&str> = assets_over_1000.iter().map(|a| a.code.as_str()).collect();
        assert_eq!(codes, vec!["1100", "2000"]);

        let first = accounts
            .query()
            .order_by("code", SortDirection::Desc)
            .fetch_one()
            .await?
            .unwrap();
        assert_eq!(first.code, "4000");

        let mut renamed = first.clone();
        renamed.name = "Revenue".to_owned();
        assert_eq!(accounts.update(&renamed).await?, 1);
        assert_eq!(
            accounts.find_by_id(&first.id).await?.unwrap().name,
            "Revenue"
        );

        let mut changes = Map::new();
        changes.insert("kind".to_owned(), Value::String("liability".to_owned()));
        let touched = accounts
            .update_where(
                vec![Condition::In(
                    "code".to_owned(),
                    vec![json!("2000"), json!("1100")],
                )],
                changes,
            )
            .await?;
        assert_eq!(touched, 2);

        let removed = accounts
            .delete_where(vec![Condition::Gte("code".to_owned(), json!("2000"))])
            .await?;
        assert_eq!(removed, 2);
        assert_eq!(accounts.query().count().await?, 2);
        assert_eq!(accounts.query().limit(1).offset(1).fetch_all().await?.len(), 1);
        Ok(())
    })
    .await?;
    Ok(())
}

#[tokio::test]
async fn unscoped_pool_access_fails_closed() -> Result<()> {
    let database = common::create_test_database().await?;
    seed_account(&database, "aaa", "1000").await?;
    let accounts: Repository<Account> = Repository::new(database.clone());

    assert!(accounts.find(Query::new()).await?.is_empty());
    let err = accounts.insert(&account("aaa", "2000")).await.unwrap_err();
    assert!(matches!(err, DatabaseError::PolicyViolation { .. }));
    assert_eq!(database.open_connections(), 0);
    Ok(())
}

#[tokio::test]
async fn scoped_pool_access_applies_the_context_tenant() -> Result<()> {
    let database = common::create_test_database().await?;
    seed_account(&database, "aaa", "1000").await?;
    let accounts: Repository<Account> = Repository::new(database.clone());

    let seen = context::scope(TenantStore::new(common::tenant("aaa")), async {
        accounts.find(Query::new()).await
    })
    .await?;
    assert_eq!(seen.len(), 1);
    Ok(())
}

#[tokio::test]
async fn raw_query_is_forwarded_and_unsupported_in_process() -> Result<()> {
    let database = common::create_test_database().await?;
    let accounts: Repository<Account> = Repository::new(database.clone());
    let err = accounts
        .raw_query("SELECT 1", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, DatabaseError::Unsupported { .. }));
    Ok(())
}
