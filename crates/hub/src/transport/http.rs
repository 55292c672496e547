// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read-only HTTP handlers: health and dialog introspection.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::HubError;
use crate::state::HubState;

// -- Response types -----------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub connections: usize,
    pub dialogs: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DialogSummary {
    pub id: String,
    pub members: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DialogListResponse {
    pub dialogs: Vec<DialogSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DialogDetail {
    pub id: String,
    pub generation: u64,
    pub members: Vec<String>,
}

// -- Handlers -----------------------------------------------------------------

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<HubState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "running".to_owned(),
        connections: s.hub.connections().len().await,
        dialogs: s.hub.dialogs().len().await,
    })
}

/// `GET /api/v1/dialogs`: active dialogs with their member counts.
///
/// A dialog that stops while the list is being built is left out.
pub async fn list_dialogs(State(s): State<Arc<HubState>>) -> impl IntoResponse {
    let timeout = s.config.handoff_timeout();
    let mut dialogs = Vec::new();
    for handle in s.hub.dialogs().snapshot().await {
        if let Some(members) = handle.members(timeout).await {
            dialogs.push(DialogSummary { id: handle.id().to_owned(), members: members.len() });
        }
    }
    Json(DialogListResponse { dialogs })
}

/// `GET /api/v1/dialogs/{id}`: member list of one active dialog.
pub async fn dialog_members(
    State(s): State<Arc<HubState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let Some(handle) = s.hub.dialogs().get(&id).await else {
        return HubError::DialogNotFound.to_http_response("dialog not active").into_response();
    };
    match handle.members(s.config.handoff_timeout()).await {
        Some(members) => {
            Json(DialogDetail { id, generation: handle.generation(), members }).into_response()
        }
        None => HubError::DialogNotFound.to_http_response("dialog not active").into_response(),
    }
}
