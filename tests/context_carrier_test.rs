// ABOUTME: Integration tests for the task-local context carrier
// ABOUTME: Concurrent isolation across suspension points, shadowing, spawned tasks, and publish rules
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use std::time::Duration;

use anyhow::Result;
use tessera_core::models::UserId;
use tessera_server::context::{self, TenantStore};
use tessera_server::database::DatabaseError;
use tokio::task::{self, JoinSet};
use tokio::time::sleep;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_scopes_never_observe_each_other() -> Result<()> {
    let mut tasks = JoinSet::new();
    for i in 0..64_u64 {
        tasks.spawn(async move {
            let tenant_id = format!("tenant-{i}");
            let store = TenantStore::new(common::tenant(&tenant_id));
            context::scope(store, async move {
                for round in 0..10_u64 {
                    if round % 2 == 0 {
                        task::yield_now().await;
                    } else {
                        sleep(Duration::from_millis((i + round) % 3)).await;
                    }
                    let seen = context::require_tenant_id().unwrap();
                    assert_eq!(seen.as_str(), tenant_id);
                }
            })
            .await;
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined?;
    }
    Ok(())
}

#[tokio::test]
async fn nested_scope_shadows_then_reverts() {
    let outer = TenantStore::new(common::tenant("aaa"));
    context::scope(outer, async {
        assert_eq!(context::require_tenant_id().unwrap().as_str(), "aaa");
        let inner_user = UserId::new_random();
        context::scope(
            TenantStore::with_user(common::tenant("bbb"), inner_user),
            async {
                sleep(Duration::from_millis(1)).await;
                assert_eq!(context::require_tenant_id().unwrap().as_str(), "bbb");
                assert_eq!(context::current_user_id(), Some(inner_user));
            },
        )
        .await;
        assert_eq!(context::require_tenant_id().unwrap().as_str(), "aaa");
        assert_eq!(context::current_user_id(), None);
    })
    .await;
    assert!(context::current().is_none());
}

#[tokio::test]
async fn plain_spawn_does_not_inherit_but_scoped_spawn_does() -> Result<()> {
    let store = TenantStore::new(common::tenant("aaa"));
    let (plain, scoped) = context::scope(store, async {
        let plain = tokio::spawn(async { context::current().is_some() });
        let scoped = context::spawn_in_scope(async {
            context::require_tenant_id().map(|t| t.to_string())
        });
        (plain.await, scoped.await)
    })
    .await;
    assert!(!plain?);
    assert_eq!(scoped??, "aaa");
    Ok(())
}

#[tokio::test]
async fn transaction_is_published_once_and_hidden_after_close() -> Result<()> {
    let database = common::create_test_database().await?;
    let store = TenantStore::new(common::tenant("aaa"));

    let first = database.begin().await?;
    store.publish_transaction(first.clone())?;
    assert!(store.transaction().is_some_and(|tx| tx.same_as(&first)));

    let second = database.begin().await?;
    let err = store.publish_transaction(second.clone()).unwrap_err();
    assert!(matches!(err, DatabaseError::TransactionAlreadyOpen));
    second.rollback().await?;

    first.commit().await?;
    assert!(store.transaction().is_none());
    assert!(store.has_published_transaction());
    assert_eq!(database.open_connections(), 0);
    Ok(())
}

#[tokio::test]
async fn user_is_recorded_at_most_once() {
    let store = TenantStore::new(common::tenant("aaa"));
    let user = UserId::new_random();
    store.set_user_id(user).unwrap();
    assert!(store.set_user_id(UserId::new_random()).is_err());
    let session = store.session_state();
    assert_eq!(session.tenant_id.as_str(), "aaa");
    assert_eq!(session.user_id, Some(user));
}
