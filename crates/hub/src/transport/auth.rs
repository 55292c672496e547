// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::HubError;
use crate::state::HubState;

/// Header set by the fronting auth proxy.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Constant-time string comparison to prevent timing side-channel attacks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Validate a Bearer token from HTTP headers.
pub fn validate_bearer(headers: &HeaderMap, expected: Option<&str>) -> Result<(), HubError> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let header =
        headers.get("authorization").and_then(|v| v.to_str().ok()).ok_or(HubError::Unauthorized)?;

    let token = header.strip_prefix("Bearer ").ok_or(HubError::Unauthorized)?;
    if constant_time_eq(token, expected) {
        Ok(())
    } else {
        Err(HubError::Unauthorized)
    }
}

/// Validate the `token` query parameter of a WebSocket upgrade.
pub fn validate_ws_token(token: Option<&str>, expected: Option<&str>) -> Result<(), HubError> {
    let Some(expected) = expected else {
        return Ok(());
    };
    match token {
        Some(t) if constant_time_eq(t, expected) => Ok(()),
        _ => Err(HubError::Unauthorized),
    }
}

/// Resolve the connecting user: the proxy header wins over the query param.
/// Blank values count as absent.
pub fn resolve_identity(headers: &HeaderMap, query_user: Option<&str>) -> Result<String, HubError> {
    let from_header = headers.get(USER_ID_HEADER).and_then(|v| v.to_str().ok());
    from_header
        .or(query_user)
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_owned)
        .ok_or(HubError::Unauthorized)
}

/// Axum middleware that enforces Bearer token authentication.
///
/// Exempt: `/api/v1/health` and the WebSocket upgrade, which checks its
/// `?token=` itself.
pub async fn auth_layer(
    state: State<Arc<HubState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let path = req.uri().path();
    if path == "/api/v1/health" || path == "/ws" {
        return next.run(req).await;
    }

    if let Err(code) = validate_bearer(req.headers(), state.config.auth_token.as_deref()) {
        return code.to_http_response("unauthorized").into_response();
    }

    next.run(req).await
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
