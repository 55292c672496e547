// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store adapter backed by the social-network REST API.

use std::sync::Once;
use std::time::Duration;

use reqwest::{Client, StatusCode, Url};
use serde::Serialize;

use super::{DialogInfo, DialogStore, MessageStore, NewMessage, StoreFuture, StoredMessage};
use crate::error::StoreError;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

#[derive(Debug, Serialize)]
struct ReadReceipt<'a> {
    user_id: &'a str,
}

/// HTTP client for the backend's dialog and message endpoints.
pub struct HttpStore {
    base: Url,
    auth_token: Option<String>,
    client: Client,
}

impl HttpStore {
    pub fn new(
        base_url: String,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        ensure_crypto();
        let base = Url::parse(&base_url)?;
        anyhow::ensure!(!base.cannot_be_a_base(), "store url {base_url} cannot be a base");
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { base, auth_token, client })
    }

    /// Append `segments` to the base path, percent-encoding each one so
    /// client-supplied IDs cannot add segments or a query.
    fn url(&self, segments: &[&str]) -> Result<Url, StoreError> {
        if let Some(bad) = segments.iter().find(|s| matches!(**s, "" | "." | "..")) {
            return Err(StoreError::Rejected(format!("invalid id {bad:?}")));
        }
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| StoreError::Unavailable("store url cannot be a base".to_owned()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn execute(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, StoreError> {
        let resp = self
            .apply_auth(req)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let text = resp.text().await.unwrap_or_default();
        Err(classify(status, text))
    }
}

/// Map a non-success backend status onto a store outcome.
fn classify(status: StatusCode, text: String) -> StoreError {
    match status {
        StatusCode::NOT_FOUND => StoreError::NotFound,
        StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => StoreError::Forbidden,
        s if s.is_client_error() => StoreError::Rejected(if text.is_empty() {
            s.to_string()
        } else {
            text
        }),
        s => StoreError::Unavailable(s.to_string()),
    }
}

impl MessageStore for HttpStore {
    fn send_message<'a>(
        &'a self,
        dialog_id: &'a str,
        message: &'a NewMessage,
    ) -> StoreFuture<'a, StoredMessage> {
        Box::pin(async move {
            let req = self.client.post(self.url(&["dialogs", dialog_id, "messages"])?);
            let resp = self.execute(req.json(message)).await?;
            resp.json::<StoredMessage>()
                .await
                .map_err(|e| StoreError::Unavailable(format!("bad response: {e}")))
        })
    }

    fn read_message<'a>(
        &'a self,
        dialog_id: &'a str,
        message_id: &'a str,
        user_id: &'a str,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let url = self.url(&["dialogs", dialog_id, "messages", message_id, "read"])?;
            let req = self.client.post(url).json(&ReadReceipt { user_id });
            self.execute(req).await?;
            Ok(())
        })
    }
}

impl DialogStore for HttpStore {
    fn get_dialog<'a>(&'a self, dialog_id: &'a str) -> StoreFuture<'a, DialogInfo> {
        Box::pin(async move {
            let req = self.client.get(self.url(&["dialogs", dialog_id])?);
            let resp = self.execute(req).await?;
            let mut info = resp
                .json::<DialogInfo>()
                .await
                .map_err(|e| StoreError::Unavailable(format!("bad response: {e}")))?;
            if info.id.is_empty() {
                info.id = dialog_id.to_owned();
            }
            Ok(info)
        })
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
