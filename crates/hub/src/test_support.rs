// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: builders, stub stores, and assertion helpers.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{HubConfig, PersistPolicy};
use crate::envelope::{Envelope, Event};
use crate::error::StoreError;
use crate::hub::Hub;
use crate::state::HubState;
use crate::store::memory::MemoryStore;
use crate::store::{
    DialogInfo, DialogStore, MessageStore, NewMessage, StoreFuture, StoredMessage, Stores,
};

/// Default wait for envelopes that are expected to arrive.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// How long to watch a mailbox that is expected to stay empty.
pub const QUIET_PERIOD: Duration = Duration::from_millis(100);

/// Builder for constructing a [`Hub`] in tests with sensible defaults.
pub struct HubBuilder {
    config: HubConfig,
    stores: Option<Stores>,
}

impl Default for HubBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HubBuilder {
    pub fn new() -> Self {
        let config = HubConfig { port: 0, handoff_timeout_ms: 500, ..HubConfig::default() };
        Self { config, stores: None }
    }

    pub fn mailbox_capacity(mut self, n: usize) -> Self {
        self.config.mailbox_capacity = n;
        self
    }

    pub fn dialog_queue(mut self, n: usize) -> Self {
        self.config.dialog_queue = n;
        self
    }

    pub fn persist_policy(mut self, policy: PersistPolicy) -> Self {
        self.config.persist_policy = policy;
        self
    }

    pub fn auth_token(mut self, t: impl Into<String>) -> Self {
        self.config.auth_token = Some(t.into());
        self
    }

    pub fn ping_ms(mut self, ms: u64) -> Self {
        self.config.ping_ms = ms;
        self
    }

    pub fn store_timeout_ms(mut self, ms: u64) -> Self {
        self.config.store_timeout_ms = ms;
        self
    }

    pub fn stores(mut self, stores: Stores) -> Self {
        self.stores = Some(stores);
        self
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn build(self) -> Arc<Hub> {
        let stores =
            self.stores.unwrap_or_else(|| Stores::shared(Arc::new(MemoryStore::new())));
        Arc::new(Hub::new(&self.config, stores))
    }

    /// Build the full server state around a fresh hub.
    pub fn build_state(self) -> Arc<HubState> {
        let config = self.config.clone();
        let hub = self.build();
        Arc::new(HubState::new(config, hub, CancellationToken::new()))
    }
}

/// Store whose calls fail (or succeed) on demand, recording what it saw.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_sends: AtomicBool,
    fail_reads: AtomicBool,
    send_calls: AtomicUsize,
    read_calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn send_calls(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }

    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.inner
    }
}

impl MessageStore for FlakyStore {
    fn send_message<'a>(
        &'a self,
        dialog_id: &'a str,
        message: &'a NewMessage,
    ) -> StoreFuture<'a, StoredMessage> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_sends.load(Ordering::SeqCst) {
            return Box::pin(async { Err(StoreError::Unavailable("injected".to_owned())) });
        }
        self.inner.send_message(dialog_id, message)
    }

    fn read_message<'a>(
        &'a self,
        _dialog_id: &'a str,
        _message_id: &'a str,
        _user_id: &'a str,
    ) -> StoreFuture<'a, ()> {
        // Receipts for any message ID are accepted.
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Box::pin(async { Err(StoreError::Unavailable("injected".to_owned())) });
        }
        Box::pin(async { Ok(()) })
    }
}

impl DialogStore for FlakyStore {
    fn get_dialog<'a>(&'a self, dialog_id: &'a str) -> StoreFuture<'a, DialogInfo> {
        self.inner.get_dialog(dialog_id)
    }
}

/// Store whose calls never complete, for exercising store timeouts.
pub struct StalledStore;

impl MessageStore for StalledStore {
    fn send_message<'a>(
        &'a self,
        _: &'a str,
        _: &'a NewMessage,
    ) -> StoreFuture<'a, StoredMessage> {
        Box::pin(std::future::pending())
    }

    fn read_message<'a>(&'a self, _: &'a str, _: &'a str, _: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(std::future::pending())
    }
}

impl DialogStore for StalledStore {
    fn get_dialog<'a>(&'a self, dialog_id: &'a str) -> StoreFuture<'a, DialogInfo> {
        let info = DialogInfo { id: dialog_id.to_owned(), ..Default::default() };
        Box::pin(async move { Ok(info) })
    }
}

/// Receive the next envelope from a mailbox, failing after [`RECV_TIMEOUT`].
pub async fn recv(rx: &mut mpsc::Receiver<Envelope>) -> anyhow::Result<Envelope> {
    tokio::time::timeout(RECV_TIMEOUT, rx.recv())
        .await
        .map_err(|_| anyhow::anyhow!("mailbox recv timeout"))?
        .ok_or_else(|| anyhow::anyhow!("mailbox closed"))
}

/// Receive envelopes until one with `event` arrives, skipping others.
pub async fn recv_event(
    rx: &mut mpsc::Receiver<Envelope>,
    event: Event,
) -> anyhow::Result<Envelope> {
    loop {
        let env = recv(rx).await?;
        if env.event == event {
            return Ok(env);
        }
    }
}

/// Assert that nothing arrives in the mailbox for [`QUIET_PERIOD`].
pub async fn assert_quiet(rx: &mut mpsc::Receiver<Envelope>) -> anyhow::Result<()> {
    match tokio::time::timeout(QUIET_PERIOD, rx.recv()).await {
        Err(_) => Ok(()),
        Ok(None) => Ok(()),
        Ok(Some(env)) => anyhow::bail!("unexpected envelope: {env:?}"),
    }
}

/// Poll `check` until it returns true, failing after [`RECV_TIMEOUT`].
pub async fn wait_until<F, Fut>(mut check: F) -> anyhow::Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
    loop {
        if check().await {
            return Ok(());
        }
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("condition not met before deadline");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Spawn an HTTP server on a random port for integration testing.
///
/// Returns the bound address and a join handle for the server task.
pub async fn spawn_http_server(
    state: Arc<HubState>,
) -> anyhow::Result<(std::net::SocketAddr, tokio::task::JoinHandle<()>)> {
    let router = crate::transport::build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Ok((addr, handle))
}

/// Convert any `Result<T, E: Display>` into `anyhow::Result<T>`.
pub trait AnyhowExt<T> {
    fn anyhow(self) -> anyhow::Result<T>;
}

impl<T, E: std::fmt::Display> AnyhowExt<T> for Result<T, E> {
    fn anyhow(self) -> anyhow::Result<T> {
        self.map_err(|e| anyhow::anyhow!("{e}"))
    }
}

/// Assert that an expression is `Err` and its message contains a substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}
