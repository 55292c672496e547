// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identity-keyed lookup tables for live connections and dialogs.
//!
//! Locks guard the maps only. They are never held across a channel send or
//! a call into another component.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use crate::envelope::Envelope;
use crate::hub::conn::ConnHandle;
use crate::hub::dialog::{self, DialogCommand, DialogHandle, HandoffError};

/// Live connections by user ID.
#[derive(Default)]
pub struct ConnRegistry {
    conns: RwLock<HashMap<String, Arc<ConnHandle>>>,
}

impl ConnRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Returns the connection it replaced for the
    /// same user, which the caller is expected to kick.
    pub async fn register(&self, conn: Arc<ConnHandle>) -> Option<Arc<ConnHandle>> {
        let user_id = conn.user_id().to_owned();
        self.conns.write().await.insert(user_id, conn)
    }

    /// Remove `conn` if it is still the registered connection for its user.
    /// Returns false (and changes nothing) otherwise.
    pub async fn deregister(&self, conn: &ConnHandle) -> bool {
        let mut conns = self.conns.write().await;
        match conns.get(conn.user_id()) {
            Some(current) if current.serial() == conn.serial() => {
                conns.remove(conn.user_id());
                true
            }
            _ => false,
        }
    }

    /// `None` means the user is currently offline.
    pub async fn get(&self, user_id: &str) -> Option<Arc<ConnHandle>> {
        self.conns.read().await.get(user_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.conns.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.conns.read().await.is_empty()
    }
}

/// Active dialogs by dialog ID, with create-on-demand.
pub struct DialogRegistry {
    dialogs: RwLock<HashMap<String, DialogHandle>>,
    conns: Arc<ConnRegistry>,
    queue: usize,
    handoff_timeout: Duration,
    next_generation: AtomicU64,
}

impl DialogRegistry {
    pub fn new(conns: Arc<ConnRegistry>, queue: usize, handoff_timeout: Duration) -> Self {
        Self {
            dialogs: RwLock::new(HashMap::new()),
            conns,
            queue,
            handoff_timeout,
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn connections(&self) -> &Arc<ConnRegistry> {
        &self.conns
    }

    pub fn handoff_timeout(&self) -> Duration {
        self.handoff_timeout
    }

    /// Return the active dialog for `id`, starting one if there is none.
    ///
    /// Lookup and insert happen under one write lock, so concurrent first
    /// joiners always get the same instance.
    pub async fn get_or_create(self: &Arc<Self>, id: &str) -> DialogHandle {
        let mut dialogs = self.dialogs.write().await;
        if let Some(handle) = dialogs.get(id) {
            return handle.clone();
        }
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let handle = dialog::spawn(id, generation, self.queue, Arc::clone(self));
        dialogs.insert(id.to_owned(), handle.clone());
        handle
    }

    /// `None` means the dialog is not active.
    pub async fn get(&self, id: &str) -> Option<DialogHandle> {
        self.dialogs.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.dialogs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.dialogs.read().await.is_empty()
    }

    /// Handles of all active dialogs, sorted by ID.
    pub async fn snapshot(&self) -> Vec<DialogHandle> {
        let mut handles: Vec<DialogHandle> = self.dialogs.read().await.values().cloned().collect();
        handles.sort_by(|a, b| a.id().cmp(b.id()));
        handles
    }

    /// Submit a join, creating the dialog if needed. A dialog that stopped
    /// between lookup and send is replaced by a fresh one once.
    pub async fn join(self: &Arc<Self>, id: &str, conn: Arc<ConnHandle>) -> bool {
        let mut cmd = DialogCommand::Join(conn);
        for _ in 0..2 {
            let handle = self.get_or_create(id).await;
            match handle.submit(cmd, self.handoff_timeout).await {
                Ok(()) => return true,
                Err(HandoffError::Stopped(back)) => cmd = back,
                Err(HandoffError::TimedOut) => {
                    warn!(dialog_id = id, "join handoff timed out");
                    return false;
                }
            }
        }
        warn!(dialog_id = id, "join lost: dialog kept stopping");
        false
    }

    /// Submit a leave for `conn`. An inactive dialog has no members, so there
    /// is nothing to do.
    pub async fn leave(&self, id: &str, conn: &ConnHandle) -> bool {
        let cmd =
            DialogCommand::Leave { user_id: conn.user_id().to_owned(), serial: conn.serial() };
        self.submit_active(id, cmd).await
    }

    /// Submit an envelope for fan-out to the dialog named in it.
    pub async fn emit(&self, envelope: Envelope) -> bool {
        let id = envelope.dialog_id.clone();
        self.submit_active(&id, DialogCommand::Emit(envelope)).await
    }

    async fn submit_active(&self, id: &str, cmd: DialogCommand) -> bool {
        let Some(handle) = self.get(id).await else {
            return false;
        };
        match handle.submit(cmd, self.handoff_timeout).await {
            Ok(()) => true,
            Err(HandoffError::Stopped(_)) => false,
            Err(HandoffError::TimedOut) => {
                warn!(dialog_id = id, "dialog handoff timed out");
                false
            }
        }
    }

    /// Called by a dialog loop whose membership became empty.
    ///
    /// Under the map lock: if more commands are already queued the dialog
    /// keeps running (returns false). Otherwise it is removed from the map
    /// and its queue is closed, so later senders see it as stopped.
    pub(crate) async fn retire(
        &self,
        id: &str,
        generation: u64,
        rx: &mut mpsc::Receiver<DialogCommand>,
    ) -> bool {
        let mut dialogs = self.dialogs.write().await;
        if !rx.is_empty() {
            return false;
        }
        if dialogs.get(id).is_some_and(|h| h.generation() == generation) {
            dialogs.remove(id);
        }
        rx.close();
        debug!(dialog_id = id, generation, "dialog retired");
        true
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
