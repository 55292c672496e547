// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

/// What to do with a `send` whose persistence call fails.
///
/// - `Gate`: fan-out only happens after the store accepted the message; on
///   failure the author gets an `error` envelope and nobody else sees it.
/// - `BestEffort`: the failure is logged and fan-out proceeds anyway.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PersistPolicy {
    #[default]
    Gate,
    BestEffort,
}

impl std::fmt::Display for PersistPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gate => f.write_str("gate"),
            Self::BestEffort => f.write_str("best-effort"),
        }
    }
}

impl std::str::FromStr for PersistPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gate" => Ok(Self::Gate),
            "best-effort" | "best_effort" => Ok(Self::BestEffort),
            other => anyhow::bail!("invalid persist policy: {other}"),
        }
    }
}

/// Which message/dialog store backs the hub.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Memory,
    Http,
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => f.write_str("memory"),
            Self::Http => f.write_str("http"),
        }
    }
}

impl std::str::FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "http" => Ok(Self::Http),
            other => anyhow::bail!("invalid store kind: {other}"),
        }
    }
}

/// Real-time dialog hub for chat WebSocket connections.
#[derive(Debug, Clone, Parser)]
#[command(name = "dialog-hub", version, about)]
pub struct HubConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "DIALOG_HUB_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 9900, env = "DIALOG_HUB_PORT")]
    pub port: u16,

    /// Bearer token required on every route. If unset, auth is disabled.
    #[arg(long, env = "DIALOG_HUB_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Log format (json or text).
    #[arg(long, env = "DIALOG_HUB_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "DIALOG_HUB_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Outbound mailbox capacity per connection.
    #[arg(long, default_value_t = 64, env = "DIALOG_HUB_MAILBOX_CAPACITY")]
    pub mailbox_capacity: usize,

    /// Command queue capacity per dialog.
    #[arg(long, default_value_t = 256, env = "DIALOG_HUB_DIALOG_QUEUE")]
    pub dialog_queue: usize,

    /// WebSocket ping interval in milliseconds.
    #[arg(long, default_value_t = 30000, env = "DIALOG_HUB_PING_MS")]
    pub ping_ms: u64,

    /// Upper bound on any handoff into a dialog queue, in milliseconds.
    #[arg(long, default_value_t = 2000, env = "DIALOG_HUB_HANDOFF_TIMEOUT_MS")]
    pub handoff_timeout_ms: u64,

    /// Store backend (memory or http).
    #[arg(long, default_value = "memory", env = "DIALOG_HUB_STORE")]
    pub store: StoreKind,

    /// Base URL of the backend REST API (required for `--store http`).
    #[arg(long, env = "DIALOG_HUB_STORE_URL")]
    pub store_url: Option<String>,

    /// Bearer token sent to the backend REST API.
    #[arg(long, env = "DIALOG_HUB_STORE_TOKEN")]
    pub store_token: Option<String>,

    /// Timeout for a single store call, in milliseconds.
    #[arg(long, default_value_t = 5000, env = "DIALOG_HUB_STORE_TIMEOUT_MS")]
    pub store_timeout_ms: u64,

    /// Whether fan-out waits for the message to persist (gate or best-effort).
    #[arg(long, default_value = "gate", env = "DIALOG_HUB_PERSIST_POLICY")]
    pub persist_policy: PersistPolicy,
}

impl HubConfig {
    /// Validate option combinations that clap cannot express.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.mailbox_capacity == 0 {
            anyhow::bail!("--mailbox-capacity must be greater than zero");
        }
        if self.dialog_queue == 0 {
            anyhow::bail!("--dialog-queue must be greater than zero");
        }
        if self.ping_ms == 0 {
            anyhow::bail!("--ping-ms must be greater than zero");
        }
        if self.store == StoreKind::Http && self.store_url.is_none() {
            anyhow::bail!("--store http requires --store-url");
        }
        Ok(())
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_ms)
    }

    /// A peer that has sent nothing (not even a pong) for this long is dead.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_ms.saturating_mul(2))
    }

    pub fn handoff_timeout(&self) -> Duration {
        Duration::from_millis(self.handoff_timeout_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 9900,
            auth_token: None,
            log_format: "text".to_owned(),
            log_level: "info".to_owned(),
            mailbox_capacity: 64,
            dialog_queue: 256,
            ping_ms: 30000,
            handoff_timeout_ms: 2000,
            store: StoreKind::Memory,
            store_url: None,
            store_token: None,
            store_timeout_ms: 5000,
            persist_policy: PersistPolicy::Gate,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
