// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for controller E2E tests.
//!
//! Provides a TestContext that runs a full controller (worker channel
//! listener + HTTP server) on ephemeral ports and attaches in-process
//! workers to it.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use constellation_controller::channel::run_channel_server;
use constellation_controller::config::Settings;
use constellation_controller::http;
use constellation_controller::state::Controller;
use constellation_protocol::{ChannelServer, HeaderMultimap, MessageFrame};
use constellation_worker::{RequestHandler, WorkerConfig, WorkerConnection};

pub const TEST_API_KEY: &str = "test-admin-key";

/// Test context running a controller on ephemeral ports.
pub struct TestContext {
    pub controller: Arc<Controller>,
    pub http_addr: SocketAddr,
    pub channel_addr: SocketAddr,
    pub client: reqwest::Client,
}

impl TestContext {
    /// Start a controller with default test settings.
    pub async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    /// Start a controller, letting the caller tweak settings first.
    pub async fn start_with(tweak: impl FnOnce(&mut Settings)) -> Self {
        let mut settings = Settings::default();
        settings.admin.api_keys = vec![TEST_API_KEY.to_string()];
        tweak(&mut settings);
        settings.validate().expect("test settings must be valid");

        let controller = Controller::new(settings);

        // Worker channel listener on an ephemeral port.
        let server =
            ChannelServer::self_signed("127.0.0.1:0".parse().unwrap(), vec!["localhost".into()])
                .expect("channel server");
        let channel_addr = server.local_addr().expect("channel addr");
        tokio::spawn(run_channel_server(controller.clone(), server));

        // HTTP server on an ephemeral port.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("http listener");
        let http_addr = listener.local_addr().expect("http addr");
        let app = http::build_router(controller.clone());
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .ok();
        });

        // Background sweep, as in production.
        {
            let controller = controller.clone();
            tokio::spawn(async move {
                controller
                    .correlator
                    .run_sweeper(controller.shutdown.clone())
                    .await;
            });
        }

        Self {
            controller,
            http_addr,
            channel_addr,
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.http_addr, path)
    }

    /// Attach an in-process worker and wait until the controller admits it.
    /// Returns a handle carrying the controller-side worker id.
    pub async fn attach_worker(&self, handler: Arc<dyn RequestHandler>) -> WorkerHandle {
        let before: Vec<Uuid> = self
            .controller
            .registry
            .snapshot()
            .iter()
            .map(|w| w.id)
            .collect();

        let config = WorkerConfig::new(self.channel_addr);
        let connection = WorkerConnection::new(config, handler);
        let cancel = CancellationToken::new();
        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                connection.run(cancel).await.ok();
            })
        };

        self.wait_for_workers(before.len() + 1).await;
        let id = self
            .controller
            .registry
            .snapshot()
            .iter()
            .map(|w| w.id)
            .find(|id| !before.contains(id))
            .expect("newly admitted worker id");

        WorkerHandle { id, cancel, task }
    }

    /// Wait until the registry holds exactly `count` workers.
    pub async fn wait_for_workers(&self, count: usize) {
        for _ in 0..200 {
            if self.controller.registry.len() == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!(
            "registry never reached {count} workers (currently {})",
            self.controller.registry.len()
        );
    }
}

/// Handle to an attached in-process worker.
pub struct WorkerHandle {
    /// Controller-side worker id (as surfaced in `x-worker` headers).
    pub id: Uuid,
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

impl WorkerHandle {
    /// Disconnect the worker and wait for its tasks to finish.
    pub async fn detach(self) {
        self.cancel.cancel();
        self.task.await.ok();
    }
}

/// Echoes method, path and body with a 200.
pub struct EchoHandler;

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
            .unwrap_or_default();
        let mut body = format!("{method} {path}\n").into_bytes();
        body.extend_from_slice(&request.data);

        let response =
            MessageFrame::response(200, Some("text/plain"), HeaderMultimap::new(), body)?;
        Ok(Some(response))
    }
}

/// Never responds: the controller is left to time the request out.
pub struct SilentHandler;

#[async_trait]
impl RequestHandler for SilentHandler {
    async fn handle(
        &self,
        _request: MessageFrame,
    ) -> constellation_worker::Result<Option<MessageFrame>> {
        Ok(None)
    }
}
