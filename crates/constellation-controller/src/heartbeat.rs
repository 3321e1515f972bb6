// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-worker heartbeat loop.
//!
//! Each admitted worker gets one loop that pushes heartbeat probes onto the
//! worker's channel: the first probe immediately, then one per interval.
//! Consecutive send failures are counted and a success resets the counter;
//! once the counter exceeds the failure budget the worker is flipped
//! unhealthy and evicted, which cascades to the binding table and cancels
//! the worker's tasks. The loop exits on cancellation or on that eviction.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use constellation_protocol::MessageFrame;

use crate::registry::WorkerRegistry;

/// Run the heartbeat loop for one worker until cancellation or eviction.
pub async fn run_heartbeat_loop(
    registry: Arc<WorkerRegistry>,
    worker_id: Uuid,
    interval: Duration,
    max_failures: u32,
    cancel: CancellationToken,
) {
    let interval_ms = interval.as_millis() as u64;
    debug!(%worker_id, interval_ms, max_failures, "heartbeat loop started");

    let mut failures: u32 = 0;
    let mut first_probe = true;

    loop {
        if first_probe {
            first_probe = false;
        } else {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                _ = tokio::time::sleep(interval) => {}
            }
        }
        if cancel.is_cancelled() {
            break;
        }

        let Some(worker) = registry.lookup(worker_id) else {
            debug!(%worker_id, "worker gone, heartbeat loop exiting");
            break;
        };

        match worker.push(MessageFrame::heartbeat(worker_id)) {
            Ok(()) => {
                failures = 0;
            }
            Err(_) => {
                failures += 1;
                warn!(%worker_id, failures, max_failures, "heartbeat send failed");
                if failures > max_failures {
                    warn!(%worker_id, "heartbeat failure budget exhausted, evicting worker");
                    registry.set_health(worker_id, false);
                    registry.remove(worker_id);
                    break;
                }
            }
        }
    }

    debug!(%worker_id, "heartbeat loop stopped");
}
