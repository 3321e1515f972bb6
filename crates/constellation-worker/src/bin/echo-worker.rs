// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Demo worker: echoes the method, path and body of every proxied request.
//!
//! ```sh
//! CONSTELLATION_CONTROLLER_ADDR=127.0.0.1:8001 cargo run --bin echo-worker
//! ```

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use constellation_protocol::{HeaderMultimap, MessageFrame};
use constellation_worker::{RequestHandler, WorkerConfig, WorkerConnection};

struct EchoHandler;

#[async_trait]
impl RequestHandler for EchoHandler {
    async fn handle(
        &self,
        request: MessageFrame,
    ) -> constellation_worker::Result<Option<MessageFrame>> {
        let method = request.method.as_deref().unwrap_or("-");
        let path = request
            .url
            .as_ref()
            .map(|u| u.path().to_string())
            .unwrap_or_else(|| "-".to_string());

        let mut body = format!("{method} {path}\n").into_bytes();
        body.extend_from_slice(&request.data);

        let response =
            MessageFrame::response(200, Some("text/plain"), HeaderMultimap::new(), body)?;
        Ok(Some(response))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = WorkerConfig::from_env()?;
    info!(controller = %config.controller_addr, "starting echo worker");

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
                cancel.cancel();
            }
        });
    }

    let connection = WorkerConnection::new(config, Arc::new(EchoHandler));
    connection.run(cancel).await?;
    Ok(())
}
