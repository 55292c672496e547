// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests that spawn the real `dialog-hub` binary and chat
//! over real sockets.

use std::time::Duration;

use dialog_hub_specs::{free_port, hub_binary, ChatClient, HubProcess};

const TIMEOUT: Duration = Duration::from_secs(10);

// -- HTTP ---------------------------------------------------------------------

#[tokio::test]
async fn http_health() -> anyhow::Result<()> {
    let hub = HubProcess::start()?;
    hub.wait_healthy(TIMEOUT).await?;

    let resp: serde_json::Value =
        reqwest::get(format!("{}/api/v1/health", hub.base_url())).await?.json().await?;

    assert_eq!(resp["status"], "running");
    assert_eq!(resp["connections"], 0);
    assert_eq!(resp["dialogs"], 0);
    Ok(())
}

#[tokio::test]
async fn http_auth_required_when_token_set() -> anyhow::Result<()> {
    let hub = HubProcess::build().auth_token("smoke-secret").spawn()?;
    hub.wait_healthy(TIMEOUT).await?;

    let client = reqwest::Client::new();
    let url = format!("{}/api/v1/dialogs", hub.base_url());
    let resp = client.get(&url).send().await?;
    assert_eq!(resp.status().as_u16(), 401);

    let resp = client.get(&url).bearer_auth("smoke-secret").send().await?;
    assert!(resp.status().is_success());
    Ok(())
}

// -- Chat ---------------------------------------------------------------------

#[tokio::test]
async fn chat_roundtrip() -> anyhow::Result<()> {
    let hub = HubProcess::start()?;
    hub.wait_healthy(TIMEOUT).await?;

    let mut u1 = ChatClient::connect(&hub.ws_url("u1")).await?;
    let mut u2 = ChatClient::connect(&hub.ws_url("u2")).await?;
    u1.join("d1", TIMEOUT).await?;
    let joined = u2.join("d1", TIMEOUT).await?;
    assert_eq!(joined["members"], serde_json::json!(["u1", "u2"]));

    u1.send(serde_json::json!({"dialog_id": "d1", "event": "send", "body": "hi"})).await?;
    let got = u2.recv_event("send", TIMEOUT).await?;
    assert_eq!(got["author_id"], "u1");
    assert_eq!(got["body"], "hi");

    let detail: serde_json::Value =
        reqwest::get(format!("{}/api/v1/dialogs/d1", hub.base_url())).await?.json().await?;
    assert_eq!(detail["members"], serde_json::json!(["u1", "u2"]));

    u1.close().await?;
    let left = u2.recv_event("left", TIMEOUT).await?;
    assert_eq!(left["author_id"], "u1");
    Ok(())
}

#[tokio::test]
async fn chat_with_auth_token() -> anyhow::Result<()> {
    let hub = HubProcess::build().auth_token("smoke-secret").spawn()?;
    hub.wait_healthy(TIMEOUT).await?;

    let anonymous = format!("ws://127.0.0.1:{}/ws?user_id=u1", hub.port());
    assert!(ChatClient::connect(&anonymous).await.is_err());

    let mut u1 = ChatClient::connect(&hub.ws_url("u1")).await?;
    u1.join("d1", TIMEOUT).await?;
    Ok(())
}

#[tokio::test]
async fn unreachable_store_refuses_join() -> anyhow::Result<()> {
    let dead = format!("http://127.0.0.1:{}", free_port()?);
    let hub = HubProcess::build().http_store(&dead).spawn()?;
    hub.wait_healthy(TIMEOUT).await?;

    let mut u1 = ChatClient::connect(&hub.ws_url("u1")).await?;
    u1.send(serde_json::json!({"dialog_id": "d1", "event": "join"})).await?;
    let err = u1.recv_event("error", TIMEOUT).await?;
    assert_eq!(err["author_id"], "STORE_UNAVAILABLE");
    Ok(())
}

// -- Process ------------------------------------------------------------------

#[tokio::test]
async fn invalid_config_exits_with_2() -> anyhow::Result<()> {
    let binary = hub_binary();
    anyhow::ensure!(binary.exists(), "dialog-hub binary not found at {}", binary.display());

    let status = std::process::Command::new(&binary)
        .args(["--port", &free_port()?.to_string(), "--store", "http"])
        .env_remove("DIALOG_HUB_STORE_URL")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()?;
    assert_eq!(status.code(), Some(2));
    Ok(())
}

#[tokio::test]
async fn sigterm_shuts_down_cleanly() -> anyhow::Result<()> {
    let mut hub = HubProcess::start()?;
    hub.wait_healthy(TIMEOUT).await?;
    let _client = ChatClient::connect(&hub.ws_url("u1")).await?;

    let killed = std::process::Command::new("kill")
        .args(["-TERM", &hub.pid().to_string()])
        .status()?;
    assert!(killed.success());

    let status = hub.wait_exit(TIMEOUT).await?;
    assert!(status.success(), "exit status: {status:?}");
    Ok(())
}
