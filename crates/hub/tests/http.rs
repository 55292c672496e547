// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the hub HTTP API.
//!
//! Uses `axum_test::TestServer`, so no real TCP is needed.

use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use tokio::sync::mpsc;

use dialog_hub::envelope::{Envelope, Event};
use dialog_hub::hub::conn::ConnSession;
use dialog_hub::state::HubState;
use dialog_hub::test_support::{recv_event, HubBuilder};
use dialog_hub::transport::build_router;

fn test_server(state: Arc<HubState>) -> anyhow::Result<TestServer> {
    TestServer::new(build_router(state)).map_err(|e| anyhow::anyhow!("{e}"))
}

/// A connected user; members stay seated while this is alive.
type Seat = (ConnSession, mpsc::Receiver<Envelope>);

/// Connect `user` and join each of `dialogs`, waiting for the joins to land.
async fn seat(state: &HubState, user: &str, dialogs: &[&str]) -> anyhow::Result<Seat> {
    let (mut session, mut rx) = state.hub.connect(user).await;
    for id in dialogs {
        state.hub.inbound(&mut session, Envelope::new(*id, Event::Join, "")).await;
        recv_event(&mut rx, Event::Joined).await?;
    }
    Ok((session, rx))
}

#[tokio::test]
async fn health_reports_counts() -> anyhow::Result<()> {
    let state = HubBuilder::new().build_state();
    let _alice = seat(&state, "alice", &["d1"]).await?;
    let _bob = seat(&state, "bob", &["d1", "d2"]).await?;

    let server = test_server(state)?;
    let resp = server.get("/api/v1/health").await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "running");
    assert_eq!(body["connections"], 2);
    assert_eq!(body["dialogs"], 2);
    Ok(())
}

#[tokio::test]
async fn list_dialogs_returns_member_counts() -> anyhow::Result<()> {
    let state = HubBuilder::new().build_state();
    let _alice = seat(&state, "alice", &["d1", "d2"]).await?;
    let _bob = seat(&state, "bob", &["d2"]).await?;

    let server = test_server(state)?;
    let resp = server.get("/api/v1/dialogs").await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    let dialogs = body["dialogs"].as_array().cloned().unwrap_or_default();
    assert_eq!(dialogs.len(), 2);
    assert_eq!(dialogs[0]["id"], "d1");
    assert_eq!(dialogs[0]["members"], 1);
    assert_eq!(dialogs[1]["id"], "d2");
    assert_eq!(dialogs[1]["members"], 2);
    Ok(())
}

#[tokio::test]
async fn dialog_detail_lists_members() -> anyhow::Result<()> {
    let state = HubBuilder::new().build_state();
    let _bob = seat(&state, "bob", &["d1"]).await?;
    let _alice = seat(&state, "alice", &["d1"]).await?;

    let server = test_server(state)?;
    let resp = server.get("/api/v1/dialogs/d1").await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    assert_eq!(body["id"], "d1");
    assert_eq!(body["members"], serde_json::json!(["alice", "bob"]));
    Ok(())
}

#[tokio::test]
async fn inactive_dialog_returns_404() -> anyhow::Result<()> {
    let server = test_server(HubBuilder::new().build_state())?;
    let resp = server.get("/api/v1/dialogs/nope").await;
    resp.assert_status(StatusCode::NOT_FOUND);

    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "DIALOG_NOT_FOUND");
    Ok(())
}

#[tokio::test]
async fn auth_token_guards_introspection() -> anyhow::Result<()> {
    let server = test_server(HubBuilder::new().auth_token("secret-token").build_state())?;

    // Health skips auth
    server.get("/api/v1/health").await.assert_status_ok();

    // No token → 401
    let resp = server.get("/api/v1/dialogs").await;
    resp.assert_status(StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    // Wrong token → 401
    let resp = server
        .get("/api/v1/dialogs")
        .add_header(
            axum::http::header::AUTHORIZATION,
            axum::http::HeaderValue::from_static("Bearer wrong-token"),
        )
        .await;
    resp.assert_status(StatusCode::UNAUTHORIZED);

    // Correct token → 200
    let resp = server
        .get("/api/v1/dialogs")
        .add_header(
            axum::http::header::AUTHORIZATION,
            axum::http::HeaderValue::from_static("Bearer secret-token"),
        )
        .await;
    resp.assert_status_ok();
    Ok(())
}
