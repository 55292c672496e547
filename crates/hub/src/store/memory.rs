// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-local store used by default and in tests.

use std::collections::HashMap;

use tokio::sync::RwLock;

use super::{DialogInfo, DialogStore, MessageStore, NewMessage, StoreFuture, StoredMessage};
use crate::error::StoreError;
use crate::state::epoch_ms;

/// In-memory message and dialog store.
///
/// In open mode (the default) an unknown dialog is created on first lookup
/// with no participant restriction. [`MemoryStore::strict`] only knows the
/// dialogs seeded with [`MemoryStore::create_dialog`].
pub struct MemoryStore {
    dialogs: RwLock<HashMap<String, DialogInfo>>,
    strict: bool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self { dialogs: RwLock::new(HashMap::new()), strict: false }
    }

    pub fn strict() -> Self {
        Self { dialogs: RwLock::new(HashMap::new()), strict: true }
    }

    /// Seed a dialog with a participant list (empty = open to everyone).
    pub async fn create_dialog(&self, dialog_id: &str, participants: &[&str]) {
        let info = DialogInfo {
            id: dialog_id.to_owned(),
            participants: participants.iter().map(|p| (*p).to_owned()).collect(),
            history: Vec::new(),
        };
        self.dialogs.write().await.insert(dialog_id.to_owned(), info);
    }

    /// Snapshot of a dialog's recorded history.
    pub async fn history(&self, dialog_id: &str) -> Vec<StoredMessage> {
        self.dialogs.read().await.get(dialog_id).map(|d| d.history.clone()).unwrap_or_default()
    }

    async fn lookup(&self, dialog_id: &str) -> Result<DialogInfo, StoreError> {
        if let Some(info) = self.dialogs.read().await.get(dialog_id) {
            return Ok(info.clone());
        }
        if self.strict {
            return Err(StoreError::NotFound);
        }
        let mut dialogs = self.dialogs.write().await;
        let info = dialogs
            .entry(dialog_id.to_owned())
            .or_insert_with(|| DialogInfo { id: dialog_id.to_owned(), ..Default::default() });
        Ok(info.clone())
    }
}

impl MessageStore for MemoryStore {
    fn send_message<'a>(
        &'a self,
        dialog_id: &'a str,
        message: &'a NewMessage,
    ) -> StoreFuture<'a, StoredMessage> {
        Box::pin(async move {
            self.lookup(dialog_id).await?;
            let mut dialogs = self.dialogs.write().await;
            let dialog = dialogs.get_mut(dialog_id).ok_or(StoreError::NotFound)?;
            if !dialog.admits(&message.author_id) {
                return Err(StoreError::Forbidden);
            }
            let stored = StoredMessage {
                id: uuid::Uuid::new_v4().to_string(),
                dialog_id: dialog_id.to_owned(),
                author_id: message.author_id.clone(),
                body: message.body.clone(),
                sent_at: epoch_ms(),
                read_by: Vec::new(),
            };
            dialog.history.push(stored.clone());
            Ok(stored)
        })
    }

    fn read_message<'a>(
        &'a self,
        dialog_id: &'a str,
        message_id: &'a str,
        user_id: &'a str,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut dialogs = self.dialogs.write().await;
            let dialog = dialogs.get_mut(dialog_id).ok_or(StoreError::NotFound)?;
            if !dialog.admits(user_id) {
                return Err(StoreError::Forbidden);
            }
            let message =
                dialog.history.iter_mut().find(|m| m.id == message_id).ok_or(StoreError::NotFound)?;
            if !message.read_by.iter().any(|u| u == user_id) {
                message.read_by.push(user_id.to_owned());
            }
            Ok(())
        })
    }
}

impl DialogStore for MemoryStore {
    fn get_dialog<'a>(&'a self, dialog_id: &'a str) -> StoreFuture<'a, DialogInfo> {
        Box::pin(self.lookup(dialog_id))
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
