// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chat WebSocket handler.
//!
//! Each socket runs two tasks. The read loop decodes frames and hands them
//! to the hub; the write loop drains the connection's mailbox and pings the
//! peer. They share only the mailbox and the connection's kick token.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::envelope::Envelope;
use crate::hub::conn::ConnSession;
use crate::hub::Hub;
use crate::state::HubState;
use crate::transport::auth;

/// Query parameters for the WS upgrade.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
    /// Identity for clients that cannot set the `x-user-id` header.
    pub user_id: Option<String>,
}

/// `GET /ws`: upgrade to a chat connection.
pub async fn ws_handler(
    State(state): State<Arc<HubState>>,
    headers: HeaderMap,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    if let Err(code) =
        auth::validate_ws_token(query.token.as_deref(), state.config.auth_token.as_deref())
    {
        return code.to_http_response("unauthorized").into_response();
    }
    let user_id = match auth::resolve_identity(&headers, query.user_id.as_deref()) {
        Ok(u) => u,
        Err(code) => return code.to_http_response("missing user identity").into_response(),
    };

    ws.on_upgrade(move |socket| handle_connection(state, socket, user_id)).into_response()
}

async fn handle_connection(state: Arc<HubState>, socket: WebSocket, user_id: String) {
    let hub = Arc::clone(&state.hub);
    let (mut session, mailbox) = hub.connect(&user_id).await;
    let kicked = session.handle().kicked().clone();
    let (ws_tx, ws_rx) = socket.split();

    let writer =
        tokio::spawn(write_loop(ws_tx, mailbox, kicked.clone(), state.config.ping_interval()));

    read_loop(&hub, &mut session, ws_rx, &kicked, &state.shutdown, state.config.idle_timeout())
        .await;

    hub.disconnect(&mut session).await;
    let _ = writer.await;
}

async fn read_loop(
    hub: &Hub,
    session: &mut ConnSession,
    mut ws_rx: SplitStream<WebSocket>,
    kicked: &CancellationToken,
    shutdown: &CancellationToken,
    idle: Duration,
) {
    loop {
        let frame = tokio::select! {
            _ = kicked.cancelled() => break,
            _ = shutdown.cancelled() => break,
            frame = tokio::time::timeout(idle, ws_rx.next()) => frame,
        };
        match frame {
            Err(_) => {
                debug!(user_id = session.user_id(), "peer idle, closing");
                break;
            }
            Ok(None) | Ok(Some(Ok(Message::Close(_)))) => break,
            Ok(Some(Err(e))) => {
                debug!(user_id = session.user_id(), err = %e, "socket read failed");
                break;
            }
            Ok(Some(Ok(Message::Text(text)))) => match Envelope::decode(text.as_str()) {
                Ok(envelope) => hub.inbound(session, envelope).await,
                Err(e) => debug!(user_id = session.user_id(), err = %e, "malformed frame"),
            },
            // Binary frames carry nothing; ping/pong only reset the idle timer.
            Ok(Some(Ok(_))) => {}
        }
    }
}

async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut mailbox: mpsc::Receiver<Envelope>,
    kicked: CancellationToken,
    ping_every: Duration,
) {
    let start = tokio::time::Instant::now() + ping_every;
    let mut ping = tokio::time::interval_at(start, ping_every);

    loop {
        tokio::select! {
            _ = kicked.cancelled() => break,
            envelope = mailbox.recv() => {
                let Some(envelope) = envelope else { break };
                let text = match envelope.encode() {
                    Ok(t) => t,
                    Err(e) => {
                        warn!(err = %e, "failed to encode envelope");
                        continue;
                    }
                };
                if ws_tx.send(Message::Text(text.into())).await.is_err() {
                    kicked.cancel();
                    break;
                }
            }
            _ = ping.tick() => {
                if ws_tx.send(Message::Ping(Default::default())).await.is_err() {
                    kicked.cancel();
                    break;
                }
            }
        }
    }

    mailbox.close();
    let _ = ws_tx.send(Message::Close(None)).await;
}
