// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use super::{ConnRegistry, DialogRegistry};
use crate::hub::conn::ConnHandle;
use crate::test_support::wait_until;

fn registries() -> (Arc<ConnRegistry>, Arc<DialogRegistry>) {
    let conns = Arc::new(ConnRegistry::new());
    let dialogs = Arc::new(DialogRegistry::new(Arc::clone(&conns), 16, Duration::from_secs(1)));
    (conns, dialogs)
}

#[tokio::test]
async fn register_returns_replaced_connection() {
    let conns = ConnRegistry::new();
    let (first, _rx1) = ConnHandle::new("alice", 4);
    let (second, _rx2) = ConnHandle::new("alice", 4);

    assert!(conns.register(Arc::clone(&first)).await.is_none());
    let replaced = conns.register(Arc::clone(&second)).await;
    assert_eq!(replaced.map(|c| c.serial()), Some(first.serial()));
    assert_eq!(conns.len().await, 1);
    assert_eq!(conns.get("alice").await.map(|c| c.serial()), Some(second.serial()));
}

#[tokio::test]
async fn stale_deregister_keeps_newer_connection() {
    let conns = ConnRegistry::new();
    let (first, _rx1) = ConnHandle::new("alice", 4);
    let (second, _rx2) = ConnHandle::new("alice", 4);
    conns.register(Arc::clone(&first)).await;
    conns.register(Arc::clone(&second)).await;

    assert!(!conns.deregister(&first).await);
    assert!(conns.get("alice").await.is_some());

    assert!(conns.deregister(&second).await);
    assert!(conns.get("alice").await.is_none());
    assert!(conns.is_empty().await);
}

#[tokio::test]
async fn get_or_create_returns_same_instance() {
    let (_conns, dialogs) = registries();
    let a = dialogs.get_or_create("d1").await;
    let b = dialogs.get_or_create("d1").await;
    assert_eq!(a.generation(), b.generation());
    assert_eq!(dialogs.len().await, 1);
}

#[tokio::test]
async fn concurrent_first_joins_share_one_dialog() -> anyhow::Result<()> {
    let (conns, dialogs) = registries();
    let mut tasks = Vec::new();
    let mut mailboxes = Vec::new();
    for i in 0..16 {
        let (conn, rx) = ConnHandle::new(format!("user-{i}"), 64);
        conns.register(Arc::clone(&conn)).await;
        mailboxes.push(rx);
        let dialogs = Arc::clone(&dialogs);
        tasks.push(tokio::spawn(async move { dialogs.join("d1", conn).await }));
    }
    for task in tasks {
        assert!(task.await?);
    }

    assert_eq!(dialogs.len().await, 1);
    let handle = dialogs.get("d1").await.ok_or_else(|| anyhow::anyhow!("dialog missing"))?;
    let members = handle.members(Duration::from_secs(1)).await.unwrap_or_default();
    assert_eq!(members.len(), 16);
    Ok(())
}

#[tokio::test]
async fn leave_and_emit_skip_inactive_dialogs() {
    let (_conns, dialogs) = registries();
    let (conn, _rx) = ConnHandle::new("alice", 4);
    assert!(!dialogs.leave("ghost", &conn).await);
    let env = crate::envelope::Envelope::new("ghost", crate::envelope::Event::Send, "alice");
    assert!(!dialogs.emit(env).await);
    assert!(dialogs.is_empty().await);
}

#[tokio::test]
async fn snapshot_is_sorted() {
    let (_conns, dialogs) = registries();
    for id in ["zeta", "alpha", "mid"] {
        dialogs.get_or_create(id).await;
    }
    let ids: Vec<String> =
        dialogs.snapshot().await.iter().map(|h| h.id().to_owned()).collect();
    assert_eq!(ids, vec!["alpha", "mid", "zeta"]);
}

#[tokio::test]
async fn retired_dialog_is_replaced_by_new_generation() -> anyhow::Result<()> {
    let (conns, dialogs) = registries();
    let (conn, _rx) = ConnHandle::new("alice", 8);
    conns.register(Arc::clone(&conn)).await;

    assert!(dialogs.join("d1", Arc::clone(&conn)).await);
    let first = dialogs.get("d1").await.ok_or_else(|| anyhow::anyhow!("dialog missing"))?;

    assert!(dialogs.leave("d1", &conn).await);

    let probe = Arc::clone(&dialogs);
    wait_until(move || {
        let probe = Arc::clone(&probe);
        async move { probe.get("d1").await.is_none() }
    })
    .await?;
    wait_until(|| {
        let stopped = first.is_stopped();
        async move { stopped }
    })
    .await?;

    assert!(dialogs.join("d1", conn).await);
    let second = dialogs.get("d1").await.ok_or_else(|| anyhow::anyhow!("dialog missing"))?;
    assert!(second.generation() > first.generation());
    Ok(())
}
