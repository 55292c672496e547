// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-socket connection handle and mailbox.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::envelope::Envelope;

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// Result of a non-blocking delivery attempt into a mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// Mailbox was full; the connection has been kicked.
    SlowConsumer,
    /// Mailbox already closed or connection already kicked.
    Closed,
}

/// Shared handle to one live connection.
///
/// The handle is what the registry stores and what dialogs deliver into.
/// Only [`ConnHandle::deliver`] writes to the mailbox and it never blocks.
/// Kicking cancels the token both socket loops watch; after that no further
/// envelope is accepted.
#[derive(Debug)]
pub struct ConnHandle {
    user_id: String,
    serial: u64,
    mailbox: mpsc::Sender<Envelope>,
    kicked: CancellationToken,
}

impl ConnHandle {
    /// Create a handle and the receiving half of its mailbox.
    pub fn new(
        user_id: impl Into<String>,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = Arc::new(Self {
            user_id: user_id.into(),
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
            mailbox: tx,
            kicked: CancellationToken::new(),
        });
        (handle, rx)
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Process-unique serial distinguishing reconnects of the same user.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Non-blocking send. A full mailbox kicks the connection.
    pub fn deliver(&self, envelope: Envelope) -> Delivery {
        if self.kicked.is_cancelled() {
            return Delivery::Closed;
        }
        match self.mailbox.try_send(envelope) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(
                    user_id = %self.user_id,
                    serial = self.serial,
                    "mailbox full, dropping slow consumer"
                );
                self.kick();
                Delivery::SlowConsumer
            }
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Close the mailbox: both socket loops observe this and exit.
    pub fn kick(&self) {
        self.kicked.cancel();
    }

    pub fn is_kicked(&self) -> bool {
        self.kicked.is_cancelled()
    }

    /// Token cancelled when the connection is kicked.
    pub fn kicked(&self) -> &CancellationToken {
        &self.kicked
    }
}

/// State owned by a connection's read loop.
#[derive(Debug)]
pub struct ConnSession {
    handle: Arc<ConnHandle>,
    joined: BTreeSet<String>,
}

impl ConnSession {
    pub fn new(handle: Arc<ConnHandle>) -> Self {
        Self { handle, joined: BTreeSet::new() }
    }

    pub fn handle(&self) -> &Arc<ConnHandle> {
        &self.handle
    }

    pub fn user_id(&self) -> &str {
        self.handle.user_id()
    }

    pub fn has_joined(&self, dialog_id: &str) -> bool {
        self.joined.contains(dialog_id)
    }

    /// Dialogs this connection has joined, in ID order.
    pub fn joined(&self) -> impl Iterator<Item = &str> {
        self.joined.iter().map(String::as_str)
    }

    pub(crate) fn mark_joined(&mut self, dialog_id: &str) {
        self.joined.insert(dialog_id.to_owned());
    }

    pub(crate) fn mark_left(&mut self, dialog_id: &str) -> bool {
        self.joined.remove(dialog_id)
    }

    pub(crate) fn take_joined(&mut self) -> BTreeSet<String> {
        std::mem::take(&mut self.joined)
    }
}

#[cfg(test)]
#[path = "conn_tests.rs"]
mod tests;
