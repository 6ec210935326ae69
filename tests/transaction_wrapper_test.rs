// ABOUTME: Integration tests for the transactional request wrapper
// ABOUTME: Commit on success, rollback on error or cancellation, write conflicts, no transaction without a tenant
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use std::time::Duration;

use anyhow::Result;
use tessera_core::models::UserId;
use tessera_server::accounting::{AccountKind, AccountingService, NewAccount};
use tessera_server::context::{self, TenantStore};
use tessera_server::errors::{AppError, AppResult, ErrorCode};
use tessera_server::middleware::{run_in_request_transaction, RequestTransaction};
use tokio::time::{sleep, timeout};

fn new_account(code: &str) -> NewAccount {
    NewAccount {
        code: code.to_owned(),
        name: format!("Account {code}"),
        kind: AccountKind::Asset,
    }
}

#[tokio::test]
async fn success_commits_and_releases_the_connection() -> Result<()> {
    let database = common::create_test_database().await?;
    let accounting = AccountingService::new(&database);

    let created = common::in_request(&database, "aaa", None, async {
        let created = accounting.create_account(new_account("1000")).await?;
        assert_eq!(database.open_connections(), 1);
        AppResult::Ok(created)
    })
    .await?;
    assert_eq!(database.open_connections(), 0);

    let listed = common::in_request(&database, "aaa", None, accounting.list_accounts()).await?;
    assert_eq!(listed, vec![created]);
    Ok(())
}

#[tokio::test]
async fn error_rolls_back_every_write_of_the_request() -> Result<()> {
    let database = common::create_test_database().await?;
    let accounting = AccountingService::new(&database);

    let err = common::in_request(&database, "aaa", None, async {
        accounting.create_account(new_account("1000")).await?;
        accounting.create_account(new_account("2000")).await?;
        Err::<(), _>(AppError::invalid_input("handler failed late"))
    })
    .await
    .unwrap_err();
    assert_eq!(err.message, "handler failed late");
    assert_eq!(database.open_connections(), 0);

    for tenant_id in ["aaa", "bbb"] {
        let listed =
            common::in_request(&database, tenant_id, None, accounting.list_accounts()).await?;
        assert!(listed.is_empty(), "tenant {tenant_id} sees rolled back rows");
    }
    Ok(())
}

#[tokio::test]
async fn cancellation_discards_the_transaction() -> Result<()> {
    let database = common::create_test_database().await?;
    let accounting = AccountingService::new(&database);

    let outcome = timeout(
        Duration::from_millis(50),
        common::in_request(&database, "aaa", None, async {
            accounting.create_account(new_account("1000")).await?;
            sleep(Duration::from_secs(5)).await;
            AppResult::Ok(())
        }),
    )
    .await;
    assert!(outcome.is_err(), "request should have been cancelled");
    assert_eq!(database.open_connections(), 0);

    let listed = common::in_request(&database, "aaa", None, accounting.list_accounts()).await?;
    assert!(listed.is_empty());
    Ok(())
}

#[tokio::test]
async fn request_transaction_cannot_be_reentered() -> Result<()> {
    let database = common::create_test_database().await?;
    context::scope(TenantStore::new(common::tenant("aaa")), async {
        let first = RequestTransaction::begin(&database).await?.unwrap();
        let err = RequestTransaction::begin(&database).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);
        first.commit().await?;
        assert_eq!(database.open_connections(), 0);
        Ok::<_, anyhow::Error>(())
    })
    .await
}

#[tokio::test]
async fn session_state_carries_tenant_and_user() -> Result<()> {
    let database = common::create_test_database().await?;
    let user = UserId::new_random();
    context::scope(TenantStore::with_user(common::tenant("aaa"), user), async {
        let transaction = RequestTransaction::begin(&database).await?.unwrap();
        {
            let connection = transaction.handle().lock().await?;
            let session = connection.session().unwrap();
            assert_eq!(session.tenant_id.as_str(), "aaa");
            assert_eq!(session.user_id, Some(user));
        }
        assert!(context::current_transaction()
            .is_some_and(|tx| tx.same_as(transaction.handle())));
        transaction.rollback().await?;
        assert!(context::current_transaction().is_none());
        Ok::<_, anyhow::Error>(())
    })
    .await
}

#[tokio::test]
async fn no_tenant_means_no_transaction_and_no_access() -> Result<()> {
    let database = common::create_test_database().await?;
    let accounting = AccountingService::new(&database);

    assert!(RequestTransaction::begin(&database).await?.is_none());

    let err = run_in_request_transaction(&database, accounting.list_accounts())
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::AuthRequired);
    assert_eq!(err.message, "unauthenticated context");
    assert_eq!(database.open_connections(), 0);
    Ok(())
}

#[tokio::test]
async fn concurrent_delete_is_not_undone_by_a_later_update_commit() -> Result<()> {
    let database = common::create_test_database().await?;
    let accounting = AccountingService::new(&database);
    let create = accounting.create_account(new_account("1000"));
    let account = common::in_request(&database, "aaa", None, create).await?;

    context::scope(TenantStore::new(common::tenant("aaa")), async {
        let renaming = RequestTransaction::begin(&database).await?.unwrap();
        let renamed = accounting.rename_account(&account.id, "Renamed").await?;
        assert_eq!(renamed.name, "Renamed");

        let delete = accounting.delete_account(&account.id);
        common::in_request(&database, "aaa", None, delete).await?;

        let err = renaming.commit().await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Conflict);
        Ok::<_, anyhow::Error>(())
    })
    .await?;
    assert_eq!(database.open_connections(), 0);

    let listed = common::in_request(&database, "aaa", None, accounting.list_accounts()).await?;
    assert!(listed.is_empty(), "deleted account came back: {listed:?}");
    Ok(())
}

#[tokio::test]
async fn failed_commit_fails_the_wrapped_operation() -> Result<()> {
    let database = common::create_test_database().await?;
    let accounting = AccountingService::new(&database);
    let create = accounting.create_account(new_account("1000"));
    let account = common::in_request(&database, "aaa", None, create).await?;

    let err = common::in_request(&database, "aaa", None, async {
        let renamed = accounting.rename_account(&account.id, "Mine").await?;
        let theirs = accounting.rename_account(&account.id, "Theirs");
        common::in_request(&database, "aaa", None, theirs).await?;
        AppResult::Ok(renamed)
    })
    .await
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::Conflict);
    assert_eq!(database.open_connections(), 0);

    let stored =
        common::in_request(&database, "aaa", None, accounting.get_account(&account.id)).await?;
    assert_eq!(stored.name, "Theirs");
    Ok(())
}
