// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for the hub HTTP surface and server-generated `error` envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HubError {
    Unauthorized,
    BadRequest,
    DialogNotFound,
    Forbidden,
    StoreUnavailable,
    Internal,
}

impl HubError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::BadRequest => 400,
            Self::DialogNotFound => 404,
            Self::Forbidden => 403,
            Self::StoreUnavailable => 502,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::BadRequest => "BAD_REQUEST",
            Self::DialogNotFound => "DIALOG_NOT_FOUND",
            Self::Forbidden => "FORBIDDEN",
            Self::StoreUnavailable => "STORE_UNAVAILABLE",
            Self::Internal => "INTERNAL",
        }
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }

    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { error: self.to_error_body(message) };
        (status, Json(body))
    }
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a failed call into the message or dialog store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The dialog (or message) does not exist.
    NotFound,
    /// The user is not a participant of the dialog.
    Forbidden,
    /// The store refused the request for another reason.
    Rejected(String),
    /// The store could not be reached or did not answer in time.
    Unavailable(String),
}

impl StoreError {
    /// Map onto the wire-level code reported to clients.
    pub fn code(&self) -> HubError {
        match self {
            Self::NotFound => HubError::DialogNotFound,
            Self::Forbidden => HubError::Forbidden,
            Self::Rejected(_) => HubError::BadRequest,
            Self::Unavailable(_) => HubError::StoreUnavailable,
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("not found"),
            Self::Forbidden => f.write_str("not a participant"),
            Self::Rejected(reason) => write!(f, "rejected: {reason}"),
            Self::Unavailable(reason) => write!(f, "store unavailable: {reason}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}
