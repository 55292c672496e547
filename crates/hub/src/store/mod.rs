// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message persistence and dialog metadata collaborators.
//!
//! The hub never stores chat history itself. It calls out to a
//! [`MessageStore`] when a `send` or `read` arrives and to a [`DialogStore`]
//! to validate a dialog before the first join. Two adapters exist: an
//! in-process [`memory::MemoryStore`] and [`http::HttpStore`], which talks to
//! the backend REST API.

pub mod http;
pub mod memory;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{HubConfig, StoreKind};
use crate::error::StoreError;

/// Boxed future returned by store calls.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// A message as submitted by the hub for persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub author_id: String,
    pub body: String,
}

/// A message as recorded by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub dialog_id: String,
    pub author_id: String,
    pub body: String,
    /// Epoch millis assigned by the store.
    pub sent_at: u64,
    #[serde(default)]
    pub read_by: Vec<String>,
}

/// Dialog metadata: who may take part and what was said so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogInfo {
    pub id: String,
    /// Empty means the dialog is open to any authenticated user.
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub history: Vec<StoredMessage>,
}

impl DialogInfo {
    pub fn admits(&self, user_id: &str) -> bool {
        self.participants.is_empty() || self.participants.iter().any(|p| p == user_id)
    }
}

/// Persists chat messages and read receipts.
pub trait MessageStore: Send + Sync {
    fn send_message<'a>(
        &'a self,
        dialog_id: &'a str,
        message: &'a NewMessage,
    ) -> StoreFuture<'a, StoredMessage>;

    fn read_message<'a>(
        &'a self,
        dialog_id: &'a str,
        message_id: &'a str,
        user_id: &'a str,
    ) -> StoreFuture<'a, ()>;
}

/// Looks up dialog metadata.
pub trait DialogStore: Send + Sync {
    fn get_dialog<'a>(&'a self, dialog_id: &'a str) -> StoreFuture<'a, DialogInfo>;
}

/// The pair of store handles the hub depends on.
#[derive(Clone)]
pub struct Stores {
    pub messages: Arc<dyn MessageStore>,
    pub dialogs: Arc<dyn DialogStore>,
}

impl Stores {
    /// Use one object for both roles.
    pub fn shared<S: MessageStore + DialogStore + 'static>(store: Arc<S>) -> Self {
        Self { messages: store.clone(), dialogs: store }
    }

    /// Build the adapter selected by `--store`.
    pub fn from_config(config: &HubConfig) -> anyhow::Result<Self> {
        match config.store {
            StoreKind::Memory => Ok(Self::shared(Arc::new(memory::MemoryStore::new()))),
            StoreKind::Http => {
                let url = config
                    .store_url
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("--store http requires --store-url"))?;
                let store =
                    http::HttpStore::new(url, config.store_token.clone(), config.store_timeout())?;
                Ok(Self::shared(Arc::new(store)))
            }
        }
    }
}
