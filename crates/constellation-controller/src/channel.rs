// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Worker channel server: accepts worker connections and drives their
//! frame traffic.
//!
//! Per connection: the worker opens one bidirectional stream and announces
//! its id with a heartbeat frame. The controller admits it, spawns a writer
//! task that drains the worker's outbound queue onto the stream, spawns the
//! heartbeat loop, and reads inbound frames on this task — response frames
//! go to the correlator, heartbeats only refresh last-activity. Disconnect
//! evicts the worker, which cascades to the binding table.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use constellation_protocol::{
    ChannelServer, FrameError, FrameKind, MessageFrame, WorkerChannel, read_frame, write_frame,
};

use crate::heartbeat::run_heartbeat_loop;
use crate::registry::WorkerRecord;
use crate::state::Controller;

/// How long a freshly connected worker has to announce its id.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Accept worker connections until shutdown.
pub async fn run_channel_server(controller: Arc<Controller>, server: ChannelServer) {
    if let Ok(addr) = server.local_addr() {
        info!(%addr, "worker channel server listening");
    }

    loop {
        tokio::select! {
            biased;

            _ = controller.shutdown.cancelled() => break,

            incoming = server.accept() => {
                let Some(incoming) = incoming else { break };
                let controller = controller.clone();
                tokio::spawn(async move {
                    match WorkerChannel::from_incoming(incoming).await {
                        Ok(channel) => handle_worker_connection(controller, channel).await,
                        Err(e) => warn!(error = %e, "failed to accept worker connection"),
                    }
                });
            }
        }
    }

    server.close();
    debug!("worker channel server stopped");
}

/// Drive one worker connection from handshake to eviction.
async fn handle_worker_connection(controller: Arc<Controller>, channel: WorkerChannel) {
    let remote = channel.remote_address();
    debug!(%remote, "worker connection accepted");

    let (send, mut recv) = match channel.accept_channel().await {
        Ok(pair) => pair,
        Err(e) => {
            warn!(%remote, error = %e, "worker never opened a channel stream");
            return;
        }
    };

    let hello = match tokio::time::timeout(HANDSHAKE_TIMEOUT, read_frame(&mut recv)).await {
        Ok(Ok(frame)) if frame.kind == FrameKind::Heartbeat => frame,
        Ok(Ok(frame)) => {
            warn!(%remote, kind = ?frame.kind, "unexpected handshake frame kind");
            channel.close(1, b"expected heartbeat handshake");
            return;
        }
        Ok(Err(e)) => {
            warn!(%remote, error = %e, "handshake read failed");
            return;
        }
        Err(_) => {
            warn!(%remote, "handshake timed out");
            channel.close(1, b"handshake timeout");
            return;
        }
    };
    let worker_id = hello.guid;

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<MessageFrame>();
    let cancel = controller.shutdown.child_token();
    let now = Utc::now();
    let record = WorkerRecord {
        id: worker_id,
        address: remote,
        admitted_at: now,
        last_activity: now,
        healthy: true,
        cancel: cancel.clone(),
        outbound: outbound_tx,
    };

    if !controller.registry.add(record) {
        warn!(%worker_id, %remote, "worker id already admitted, rejecting connection");
        channel.close(1, b"duplicate worker id");
        return;
    }

    // Writer task: sole consumer of the worker's outbound queue.
    let writer_cancel = cancel.clone();
    let writer = tokio::spawn(async move {
        let mut send = send;
        loop {
            tokio::select! {
                biased;

                _ = writer_cancel.cancelled() => break,

                frame = outbound_rx.recv() => {
                    let Some(frame) = frame else { break };
                    if let Err(e) = write_frame(&mut send, &frame).await {
                        warn!(error = %e, "worker channel write failed");
                        break;
                    }
                }
            }
        }
    });

    let heartbeat = controller.settings.heartbeat.clone();
    tokio::spawn(run_heartbeat_loop(
        controller.registry.clone(),
        worker_id,
        Duration::from_millis(heartbeat.interval_ms),
        heartbeat.max_failures,
        cancel.clone(),
    ));

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            result = read_frame(&mut recv) => match result {
                Ok(frame) => {
                    controller.registry.touch(worker_id);
                    match frame.kind {
                        FrameKind::Response => controller.correlator.deliver(frame),
                        FrameKind::Heartbeat => {}
                        kind => debug!(%worker_id, ?kind, "ignoring frame"),
                    }
                }
                Err(FrameError::ConnectionClosed) => {
                    info!(%worker_id, "worker disconnected");
                    break;
                }
                Err(e) => {
                    warn!(%worker_id, error = %e, "worker channel read failed");
                    break;
                }
            }
        }
    }

    controller.registry.remove(worker_id);
    cancel.cancel();
    writer.abort();
    debug!(%worker_id, "worker connection closed");
}
