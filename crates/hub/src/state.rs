// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::HubConfig;
use crate::hub::Hub;

/// Shared server state handed to every axum handler.
pub struct HubState {
    pub config: HubConfig,
    pub hub: Arc<Hub>,
    pub shutdown: CancellationToken,
}

impl HubState {
    pub fn new(config: HubConfig, hub: Arc<Hub>, shutdown: CancellationToken) -> Self {
        Self { config, hub, shutdown }
    }
}

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
