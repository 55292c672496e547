// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatch of inbound envelopes by event type.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::PersistPolicy;
use crate::envelope::{Envelope, Event};
use crate::error::{HubError, StoreError};
use crate::hub::conn::ConnSession;
use crate::hub::registry::{ConnRegistry, DialogRegistry};
use crate::store::{NewMessage, Stores};

/// Stateless router from a connection's envelopes to dialogs and peers.
pub struct Router {
    conns: Arc<ConnRegistry>,
    dialogs: Arc<DialogRegistry>,
    stores: Stores,
    policy: PersistPolicy,
    store_timeout: Duration,
}

impl Router {
    pub fn new(
        conns: Arc<ConnRegistry>,
        dialogs: Arc<DialogRegistry>,
        stores: Stores,
        policy: PersistPolicy,
        store_timeout: Duration,
    ) -> Self {
        Self { conns, dialogs, stores, policy, store_timeout }
    }

    /// Route one envelope whose `author_id` is already the connection's user.
    pub async fn route(&self, session: &mut ConnSession, envelope: Envelope) {
        if envelope.dialog_id.is_empty() {
            debug!(user_id = session.user_id(), event = %envelope.event, "envelope without dialog");
            return;
        }
        match envelope.event {
            Event::Join => self.join(session, &envelope.dialog_id).await,
            Event::Leave => self.leave(session, &envelope.dialog_id).await,
            Event::Send => self.send(session, envelope).await,
            Event::Read => self.read(session, envelope).await,
            Event::Joined | Event::Left => {
                if session.has_joined(&envelope.dialog_id) {
                    self.dialogs.emit(envelope).await;
                }
            }
            Event::Error | Event::Unknown(_) => {
                debug!(user_id = session.user_id(), event = %envelope.event, "dropping envelope");
            }
        }
    }

    /// Leave every dialog this connection joined.
    pub async fn leave_all(&self, session: &mut ConnSession) {
        for dialog_id in session.take_joined() {
            self.dialogs.leave(&dialog_id, session.handle()).await;
        }
    }

    async fn join(&self, session: &mut ConnSession, dialog_id: &str) {
        let lookup = self.stores.dialogs.get_dialog(dialog_id);
        let refusal = match tokio::time::timeout(self.store_timeout, lookup).await {
            Ok(Ok(info)) if info.admits(session.user_id()) => None,
            Ok(Ok(_)) => Some(StoreError::Forbidden),
            Ok(Err(e)) => Some(e),
            Err(_) => Some(StoreError::Unavailable("dialog store timed out".to_owned())),
        };
        if let Some(e) = refusal {
            warn!(dialog_id, user_id = session.user_id(), err = %e, "join refused");
            self.reply_error(session, dialog_id, e.code(), format!("join refused: {e}"));
            return;
        }

        if self.dialogs.join(dialog_id, Arc::clone(session.handle())).await {
            session.mark_joined(dialog_id);
        }
    }

    async fn leave(&self, session: &mut ConnSession, dialog_id: &str) {
        session.mark_left(dialog_id);
        self.dialogs.leave(dialog_id, session.handle()).await;
    }

    async fn send(&self, session: &mut ConnSession, mut envelope: Envelope) {
        if !session.has_joined(&envelope.dialog_id) {
            debug!(
                dialog_id = %envelope.dialog_id,
                user_id = session.user_id(),
                "send from non-member dropped"
            );
            return;
        }

        let message =
            NewMessage { author_id: envelope.author_id.clone(), body: envelope.body.clone() };
        let persist = self.stores.messages.send_message(&envelope.dialog_id, &message);
        match tokio::time::timeout(self.store_timeout, persist).await {
            Ok(Ok(stored)) => {
                envelope.message_id = Some(stored.id);
                envelope.sent_at = Some(stored.sent_at);
            }
            Ok(Err(e)) => {
                if !self.persist_failed(session, &envelope.dialog_id, e) {
                    return;
                }
            }
            Err(_) => {
                let e = StoreError::Unavailable("message store timed out".to_owned());
                if !self.persist_failed(session, &envelope.dialog_id, e) {
                    return;
                }
            }
        }

        self.dialogs.emit(envelope).await;
    }

    async fn read(&self, session: &mut ConnSession, envelope: Envelope) {
        if !session.has_joined(&envelope.dialog_id) {
            debug!(
                dialog_id = %envelope.dialog_id,
                user_id = session.user_id(),
                "read from non-member dropped"
            );
            return;
        }
        let ack = self.stores.messages.read_message(
            &envelope.dialog_id,
            &envelope.body,
            &envelope.author_id,
        );
        let outcome = match tokio::time::timeout(self.store_timeout, ack).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Unavailable("message store timed out".to_owned())),
        };
        if let Err(e) = outcome {
            if !self.persist_failed(session, &envelope.dialog_id, e) {
                return;
            }
        }

        let Some(dst) = envelope.dst.as_deref() else {
            return;
        };
        match self.conns.get(dst).await {
            Some(peer) => {
                peer.deliver(envelope);
            }
            None => debug!(dialog_id = %envelope.dialog_id, dst, "read receipt target offline"),
        }
    }

    /// Apply the persist policy to a failed store call. Returns whether
    /// delivery should go ahead.
    fn persist_failed(&self, session: &ConnSession, dialog_id: &str, err: StoreError) -> bool {
        match self.policy {
            PersistPolicy::Gate => {
                warn!(dialog_id, user_id = session.user_id(), err = %err, "persist failed");
                self.reply_error(session, dialog_id, err.code(), format!("not delivered: {err}"));
                false
            }
            PersistPolicy::BestEffort => {
                warn!(
                    dialog_id,
                    user_id = session.user_id(),
                    err = %err,
                    "persist failed, delivering anyway"
                );
                true
            }
        }
    }

    fn reply_error(&self, session: &ConnSession, dialog_id: &str, code: HubError, msg: String) {
        session.handle().deliver(Envelope::error(dialog_id, code, msg));
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
