// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary smoke tests.
//!
//! Spawns the real `dialog-hub` binary as a subprocess and exercises it
//! over HTTP and WebSocket.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Once;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Resolve the path to the compiled `dialog-hub` binary.
pub fn hub_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("dialog-hub")
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// A running `dialog-hub` process that is killed on drop.
pub struct HubProcess {
    child: Child,
    port: u16,
    auth_token: Option<String>,
}

/// Builder for the flags a [`HubProcess`] is started with.
#[derive(Default)]
pub struct HubProcessBuilder {
    auth_token: Option<String>,
    store_url: Option<String>,
}

impl HubProcessBuilder {
    /// Require a bearer token (`--auth-token`).
    pub fn auth_token(mut self, token: &str) -> Self {
        self.auth_token = Some(token.to_owned());
        self
    }

    /// Use the HTTP store against `url` (`--store http --store-url`).
    pub fn http_store(mut self, url: &str) -> Self {
        self.store_url = Some(url.to_owned());
        self
    }

    /// Spawn the hub with the configured flags.
    pub fn spawn(self) -> anyhow::Result<HubProcess> {
        ensure_crypto();
        let binary = hub_binary();
        anyhow::ensure!(binary.exists(), "dialog-hub binary not found at {}", binary.display());

        let port = free_port()?;
        let mut args: Vec<String> = vec![
            "--host".into(),
            "127.0.0.1".into(),
            "--port".into(),
            port.to_string(),
            "--log-format".into(),
            "text".into(),
            "--log-level".into(),
            "warn".into(),
            "--store-timeout-ms".into(),
            "1000".into(),
        ];
        if let Some(ref token) = self.auth_token {
            args.extend(["--auth-token".into(), token.clone()]);
        }
        if let Some(ref url) = self.store_url {
            args.extend(["--store".into(), "http".into(), "--store-url".into(), url.clone()]);
        }

        let child = Command::new(&binary)
            .args(&args)
            .env_remove("DIALOG_HUB_AUTH_TOKEN")
            .env_remove("DIALOG_HUB_STORE")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        Ok(HubProcess { child, port, auth_token: self.auth_token })
    }
}

impl HubProcess {
    /// Create a builder for custom flags.
    pub fn build() -> HubProcessBuilder {
        HubProcessBuilder::default()
    }

    /// Spawn the hub with defaults (memory store, no auth).
    pub fn start() -> anyhow::Result<Self> {
        Self::build().spawn()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Base URL for HTTP requests.
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// WebSocket URL for `user`, carrying the auth token if one is set.
    pub fn ws_url(&self, user: &str) -> String {
        match self.auth_token {
            Some(ref t) => format!("ws://127.0.0.1:{}/ws?user_id={user}&token={t}", self.port),
            None => format!("ws://127.0.0.1:{}/ws?user_id={user}", self.port),
        }
    }

    /// Poll health until responsive.
    pub async fn wait_healthy(&self, timeout: Duration) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        let client = reqwest::Client::new();
        let url = format!("{}/api/v1/health", self.base_url());
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("dialog-hub did not become healthy within {timeout:?}");
            }
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Wait for the process to exit within `timeout`.
    pub async fn wait_exit(
        &mut self,
        timeout: Duration,
    ) -> anyhow::Result<std::process::ExitStatus> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("dialog-hub did not exit within {timeout:?}");
            }
            if let Some(status) = self.child.try_wait()? {
                return Ok(status);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

impl Drop for HubProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A chat client connected to a running hub.
pub struct ChatClient {
    ws: WsStream,
}

impl ChatClient {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let (ws, _) = tokio_tungstenite::connect_async(url).await?;
        Ok(Self { ws })
    }

    /// Send one envelope as a JSON text frame.
    pub async fn send(&mut self, value: serde_json::Value) -> anyhow::Result<()> {
        self.ws.send(Message::Text(value.to_string().into())).await?;
        Ok(())
    }

    /// Receive frames until one with `event` arrives.
    pub async fn recv_event(
        &mut self,
        event: &str,
        timeout: Duration,
    ) -> anyhow::Result<serde_json::Value> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let msg = tokio::time::timeout_at(deadline, self.ws.next())
                .await
                .map_err(|_| anyhow::anyhow!("no {event} frame within {timeout:?}"))?
                .ok_or_else(|| anyhow::anyhow!("ws stream ended"))??;
            if let Message::Text(text) = msg {
                let value: serde_json::Value = serde_json::from_str(&text)?;
                if value["event"] == event {
                    return Ok(value);
                }
            }
        }
    }

    /// Join `dialog` and wait for the own `joined` frame.
    pub async fn join(
        &mut self,
        dialog: &str,
        timeout: Duration,
    ) -> anyhow::Result<serde_json::Value> {
        self.send(serde_json::json!({"dialog_id": dialog, "event": "join"})).await?;
        self.recv_event("joined", timeout).await
    }

    pub async fn close(mut self) -> anyhow::Result<()> {
        self.ws.close(None).await?;
        Ok(())
    }
}
