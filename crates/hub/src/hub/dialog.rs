// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dialog event loop.
//!
//! Each active dialog runs one task that owns its membership map. Joins,
//! leaves and emits arrive on a single bounded channel and are applied in
//! arrival order; nothing outside the loop reads or writes membership. When
//! the last member leaves the loop retires itself from the registry and
//! exits. A later join for the same ID creates a fresh dialog.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::envelope::Envelope;
use crate::hub::conn::{ConnHandle, Delivery};
use crate::hub::registry::DialogRegistry;

/// Work submitted to a dialog loop.
#[derive(Debug)]
pub enum DialogCommand {
    Join(Arc<ConnHandle>),
    /// Remove `user_id` if its presence still belongs to connection `serial`.
    Leave { user_id: String, serial: u64 },
    /// Fan out to every member except the author.
    Emit(Envelope),
    /// Snapshot of the current member list.
    Members(oneshot::Sender<Vec<String>>),
}

/// Why a command could not be handed to a dialog.
#[derive(Debug)]
pub enum HandoffError {
    /// The dialog already stopped; the command is handed back.
    Stopped(DialogCommand),
    /// The queue stayed full for the whole handoff window; the command is lost.
    TimedOut,
}

/// Cloneable sending side of a dialog loop.
#[derive(Debug, Clone)]
pub struct DialogHandle {
    id: Arc<str>,
    generation: u64,
    tx: mpsc::Sender<DialogCommand>,
}

impl DialogHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Distinguishes successive dialogs created under the same ID.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_stopped(&self) -> bool {
        self.tx.is_closed()
    }

    /// Enqueue a command, waiting at most `timeout` for queue space.
    pub async fn submit(&self, cmd: DialogCommand, timeout: Duration) -> Result<(), HandoffError> {
        match self.tx.send_timeout(cmd, timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Closed(cmd)) => Err(HandoffError::Stopped(cmd)),
            Err(SendTimeoutError::Timeout(_)) => Err(HandoffError::TimedOut),
        }
    }

    /// Ask the loop for its member list. `None` if stopped or unresponsive.
    pub async fn members(&self, timeout: Duration) -> Option<Vec<String>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.submit(DialogCommand::Members(reply_tx), timeout).await.ok()?;
        tokio::time::timeout(timeout, reply_rx).await.ok()?.ok()
    }
}

/// Start a dialog loop and return its handle.
pub(crate) fn spawn(
    id: &str,
    generation: u64,
    queue: usize,
    registry: Arc<DialogRegistry>,
) -> DialogHandle {
    let (tx, rx) = mpsc::channel(queue.max(1));
    let dialog = Dialog { id: id.to_owned(), generation, members: BTreeMap::new(), registry };
    tokio::spawn(dialog.run(rx));
    DialogHandle { id: Arc::from(id), generation, tx }
}

struct Dialog {
    id: String,
    generation: u64,
    /// user ID -> serial of the connection that joined.
    members: BTreeMap<String, u64>,
    registry: Arc<DialogRegistry>,
}

impl Dialog {
    async fn run(mut self, mut rx: mpsc::Receiver<DialogCommand>) {
        debug!(dialog_id = %self.id, generation = self.generation, "dialog started");

        while let Some(cmd) = rx.recv().await {
            self.apply(cmd).await;
            if self.members.is_empty()
                && self.registry.retire(&self.id, self.generation, &mut rx).await
            {
                break;
            }
        }

        // Anything queued between the empty check and the close.
        let mut rejoin = Vec::new();
        while let Ok(cmd) = rx.try_recv() {
            match cmd {
                DialogCommand::Join(conn) => rejoin.push(conn),
                DialogCommand::Members(reply) => {
                    let _ = reply.send(Vec::new());
                }
                other => {
                    debug!(dialog_id = %self.id, cmd = ?other, "dropping command after stop");
                }
            }
        }

        debug!(dialog_id = %self.id, generation = self.generation, "dialog stopped");

        for conn in rejoin {
            self.registry.join(&self.id, conn).await;
        }
    }

    async fn apply(&mut self, cmd: DialogCommand) {
        match cmd {
            DialogCommand::Join(conn) => self.join(conn).await,
            DialogCommand::Leave { user_id, serial } => self.leave(&user_id, serial).await,
            DialogCommand::Emit(envelope) => {
                let author = envelope.author_id.clone();
                self.broadcast(envelope, Some(author)).await;
            }
            DialogCommand::Members(reply) => {
                let _ = reply.send(self.member_list());
            }
        }
    }

    fn member_list(&self) -> Vec<String> {
        self.members.keys().cloned().collect()
    }

    async fn join(&mut self, conn: Arc<ConnHandle>) {
        if conn.is_kicked() {
            return;
        }
        let user_id = conn.user_id().to_owned();
        match self.members.insert(user_id.clone(), conn.serial()) {
            Some(_) => {
                // Already a member (possibly on a new socket): reply to the joiner only.
                let envelope = Envelope::joined(&self.id, &user_id, self.member_list());
                if conn.deliver(envelope) != Delivery::Delivered {
                    self.members.remove(&user_id);
                    if !self.members.is_empty() {
                        let envelope = Envelope::left(&self.id, &user_id, self.member_list());
                        self.broadcast(envelope, None).await;
                    }
                }
            }
            None => {
                info!(
                    dialog_id = %self.id,
                    user_id = %user_id,
                    members = self.members.len(),
                    "member joined"
                );
                let envelope = Envelope::joined(&self.id, &user_id, self.member_list());
                self.broadcast(envelope, None).await;
            }
        }
    }

    async fn leave(&mut self, user_id: &str, serial: u64) {
        if self.members.get(user_id) != Some(&serial) {
            return;
        }
        self.members.remove(user_id);
        info!(dialog_id = %self.id, user_id, members = self.members.len(), "member left");
        if !self.members.is_empty() {
            let envelope = Envelope::left(&self.id, user_id, self.member_list());
            self.broadcast(envelope, None).await;
        }
    }

    /// Deliver to every member except `skip`; members that cannot take the
    /// envelope are removed and announced with `left`.
    async fn broadcast(&mut self, envelope: Envelope, skip: Option<String>) {
        let mut pending = vec![(envelope, skip)];
        while let Some((envelope, skip)) = pending.pop() {
            let dropped = self.fan_out(&envelope, skip.as_deref()).await;
            for user_id in &dropped {
                self.members.remove(user_id);
            }
            if self.members.is_empty() {
                break;
            }
            for user_id in dropped {
                pending.push((Envelope::left(&self.id, &user_id, self.member_list()), None));
            }
        }
    }

    async fn fan_out(&self, envelope: &Envelope, skip: Option<&str>) -> Vec<String> {
        let conns = self.registry.connections();
        let mut dropped = Vec::new();
        for (user_id, serial) in &self.members {
            if skip == Some(user_id.as_str()) {
                continue;
            }
            // Gone or replaced without a leave reaching us.
            let conn = match conns.get(user_id).await {
                Some(conn) if conn.serial() == *serial => conn,
                _ => {
                    debug!(dialog_id = %self.id, user_id = %user_id, "dropping stale member");
                    dropped.push(user_id.clone());
                    continue;
                }
            };
            match conn.deliver(envelope.clone()) {
                Delivery::Delivered => {}
                Delivery::SlowConsumer | Delivery::Closed => dropped.push(user_id.clone()),
            }
        }
        dropped
    }
}

#[cfg(test)]
#[path = "dialog_tests.rs"]
mod tests;
