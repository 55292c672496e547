// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire envelope exchanged with chat clients over WebSocket text frames.
//!
//! Clients send `{"dialog_id", "event", "author_id", "dst", "body"}`. The
//! hub never trusts `author_id` from the wire; the connection stamps its own
//! identity before routing. Server-generated envelopes may carry extra fields
//! (`members`, `message_id`, `sent_at`) that are omitted when empty.

use serde::{Deserialize, Serialize};

use crate::error::HubError;

/// Envelope event kind.
///
/// Unknown event strings decode to [`Event::Unknown`] instead of failing, so
/// the router can discard them without treating the whole frame as malformed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Event {
    Join,
    Leave,
    Joined,
    Left,
    Send,
    Read,
    /// Server-only: a request from this client failed.
    Error,
    Unknown(String),
}

impl Event {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Join => "join",
            Self::Leave => "leave",
            Self::Joined => "joined",
            Self::Left => "left",
            Self::Send => "send",
            Self::Read => "read",
            Self::Error => "error",
            Self::Unknown(other) => other,
        }
    }
}

impl From<String> for Event {
    fn from(s: String) -> Self {
        match s.as_str() {
            "join" => Self::Join,
            "leave" => Self::Leave,
            "joined" => Self::Joined,
            "left" => Self::Left,
            "send" => Self::Send,
            "read" => Self::Read,
            "error" => Self::Error,
            _ => Self::Unknown(s),
        }
    }
}

impl From<Event> for String {
    fn from(event: Event) -> Self {
        match event {
            Event::Unknown(s) => s,
            other => other.as_str().to_owned(),
        }
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded WebSocket text frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub dialog_id: String,
    pub event: Event,
    #[serde(default)]
    pub author_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst: Option<String>,
    #[serde(default)]
    pub body: String,
    /// Current member list, on `joined`/`left` notifications.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,
    /// Store-assigned ID of a persisted `send`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Store timestamp (epoch millis) of a persisted `send`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<u64>,
}

impl Envelope {
    pub fn new(dialog_id: impl Into<String>, event: Event, author_id: impl Into<String>) -> Self {
        Self {
            dialog_id: dialog_id.into(),
            event,
            author_id: author_id.into(),
            dst: None,
            body: String::new(),
            members: Vec::new(),
            message_id: None,
            sent_at: None,
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_dst(mut self, dst: impl Into<String>) -> Self {
        self.dst = Some(dst.into());
        self
    }

    /// `joined` notification announcing `user_id` with the resulting member list.
    pub fn joined(dialog_id: &str, user_id: &str, members: Vec<String>) -> Self {
        let mut env = Self::new(dialog_id, Event::Joined, user_id);
        env.members = members;
        env
    }

    /// `left` notification announcing `user_id` with the remaining member list.
    pub fn left(dialog_id: &str, user_id: &str, members: Vec<String>) -> Self {
        let mut env = Self::new(dialog_id, Event::Left, user_id);
        env.members = members;
        env
    }

    /// Server-generated failure report addressed back to the requesting user.
    pub fn error(dialog_id: &str, code: HubError, message: impl Into<String>) -> Self {
        Self::new(dialog_id, Event::Error, code.as_str()).with_body(message)
    }

    /// Decode a client text frame.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Encode for a server text frame.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
