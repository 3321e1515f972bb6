// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Constellation controller entry point.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tracing::{error, info};

use constellation_controller::channel::run_channel_server;
use constellation_controller::config::{DEFAULT_SETTINGS_PATH, Settings};
use constellation_controller::state::Controller;
use constellation_controller::{http, logging};
use constellation_protocol::ChannelServer;

#[tokio::main]
async fn main() -> Result<()> {
    let settings_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_SETTINGS_PATH.to_string());
    let settings = Settings::load(&settings_path)
        .with_context(|| format!("loading settings from {settings_path}"))?;

    logging::init(&settings.logging)?;

    info!(
        webserver = %format!("{}:{}", settings.webserver.hostname, settings.webserver.port),
        socket_port = settings.socket.port,
        heartbeat_interval_ms = settings.heartbeat.interval_ms,
        proxy_timeout_ms = settings.proxy.timeout_ms,
        "starting Constellation controller"
    );

    let controller = Controller::new(settings.clone());

    // One channel listener per configured socket hostname. Certificates are
    // self-signed over the hostname set; workers verify them only when
    // Socket.Ssl is enabled on their side.
    let subject_names = settings.socket.hostnames.clone();
    for hostname in &settings.socket.hostnames {
        let addr: SocketAddr = tokio::net::lookup_host((hostname.as_str(), settings.socket.port))
            .await
            .with_context(|| format!("resolving socket hostname {hostname}"))?
            .next()
            .with_context(|| format!("no address for socket hostname {hostname}"))?;

        let server = ChannelServer::self_signed(addr, subject_names.clone())
            .with_context(|| format!("binding worker channel listener on {addr}"))?;
        tokio::spawn(run_channel_server(controller.clone(), server));
    }

    // Background sweep for retained responses.
    {
        let controller = controller.clone();
        tokio::spawn(async move {
            controller
                .correlator
                .run_sweeper(controller.shutdown.clone())
                .await;
        });
    }

    // Ctrl-C drives the root cancellation token.
    {
        let shutdown = controller.shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
                return;
            }
            info!("shutdown requested");
            shutdown.cancel();
        });
    }

    let listener = tokio::net::TcpListener::bind((
        settings.webserver.hostname.as_str(),
        settings.webserver.port,
    ))
    .await
    .with_context(|| {
        format!(
            "binding HTTP listener on {}:{}",
            settings.webserver.hostname, settings.webserver.port
        )
    })?;
    info!(addr = %listener.local_addr()?, "HTTP server listening");

    let app = http::build_router(controller.clone());
    let shutdown = controller.shutdown.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await?;

    info!("controller stopped");
    Ok(())
}
