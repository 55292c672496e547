// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dialog hub: real-time WebSocket fan-out for chat dialogs.

pub mod config;
pub mod envelope;
pub mod error;
pub mod hub;
pub mod state;
pub mod store;
pub mod test_support;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::HubConfig;
use crate::hub::Hub;
use crate::state::HubState;
use crate::store::Stores;
use crate::transport::build_router;

/// Run the hub server until SIGTERM/SIGINT.
pub async fn run(config: HubConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let stores = Stores::from_config(&config)?;
    let hub = Arc::new(Hub::new(&config, stores));
    let state = Arc::new(HubState::new(config.clone(), hub, shutdown.clone()));

    spawn_signal_handler(shutdown.clone());

    let listener = TcpListener::bind(&addr).await?;
    info!(
        store = %config.store,
        persist_policy = %config.persist_policy,
        "dialog-hub listening on {addr}"
    );
    let router = build_router(state);
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    info!("dialog-hub stopped");
    Ok(())
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();

        tokio::select! {
            _ = async {
                match sigterm {
                    Some(ref mut s) => s.recv().await,
                    None => std::future::pending().await,
                }
            } => {
                info!("received SIGTERM");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received SIGINT");
            }
        }
        shutdown.cancel();
    });
}
