// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The dialog hub: connection and dialog registries plus the router.

pub mod conn;
pub mod dialog;
pub mod registry;
pub mod router;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::HubConfig;
use crate::envelope::Envelope;
use crate::store::Stores;
use conn::{ConnHandle, ConnSession};
use registry::{ConnRegistry, DialogRegistry};
use router::Router;

/// Dialog membership, connection registry and routing for one process.
pub struct Hub {
    conns: Arc<ConnRegistry>,
    dialogs: Arc<DialogRegistry>,
    router: Router,
    mailbox_capacity: usize,
}

impl Hub {
    pub fn new(config: &HubConfig, stores: Stores) -> Self {
        let conns = Arc::new(ConnRegistry::new());
        let dialogs = Arc::new(DialogRegistry::new(
            Arc::clone(&conns),
            config.dialog_queue,
            config.handoff_timeout(),
        ));
        let router = Router::new(
            Arc::clone(&conns),
            Arc::clone(&dialogs),
            stores,
            config.persist_policy,
            config.store_timeout(),
        );
        Self { conns, dialogs, router, mailbox_capacity: config.mailbox_capacity }
    }

    pub fn connections(&self) -> &Arc<ConnRegistry> {
        &self.conns
    }

    pub fn dialogs(&self) -> &Arc<DialogRegistry> {
        &self.dialogs
    }

    /// Register a new connection for `user_id`, kicking any connection it
    /// replaces. Returns the session for the read loop and the mailbox
    /// receiver for the write loop.
    pub async fn connect(&self, user_id: &str) -> (ConnSession, mpsc::Receiver<Envelope>) {
        let (handle, mailbox) = ConnHandle::new(user_id, self.mailbox_capacity);
        if let Some(replaced) = self.conns.register(Arc::clone(&handle)).await {
            debug!(user_id, serial = replaced.serial(), "replacing stale connection");
            replaced.kick();
        }
        info!(user_id, serial = handle.serial(), "connection registered");
        (ConnSession::new(handle), mailbox)
    }

    /// Handle one decoded frame. The author is always the session's user.
    pub async fn inbound(&self, session: &mut ConnSession, mut envelope: Envelope) {
        envelope.author_id = session.user_id().to_owned();
        self.router.route(session, envelope).await;
    }

    /// Tear down a connection: leave its dialogs, deregister, close the mailbox.
    pub async fn disconnect(&self, session: &mut ConnSession) {
        self.router.leave_all(session).await;
        let handle = Arc::clone(session.handle());
        self.conns.deregister(&handle).await;
        handle.kick();
        info!(user_id = handle.user_id(), serial = handle.serial(), "connection closed");
    }
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
