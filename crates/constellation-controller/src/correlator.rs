// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Request/response correlation across the asynchronous worker channel.
//!
//! `dispatch` installs an in-flight record keyed by the frame's correlation
//! id, pushes the frame onto the owning worker's outbound queue and suspends
//! until the matching response frame arrives or the deadline fires.
//! Responses are matched by correlation id only, so out-of-order arrival
//! across workers or within one worker is fine.
//!
//! A response arriving after its waiter gave up is retained until its
//! expiration (arrival + retention by default) and removed by the background
//! sweep, so late arrivals do not accumulate.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use uuid::Uuid;

use constellation_protocol::MessageFrame;

use crate::error::RouteError;
use crate::registry::WorkerRecord;

/// How often the background sweep evicts expired retained responses.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

struct RetainedResponse {
    frame: MessageFrame,
    expires_at: DateTime<Utc>,
}

/// In-flight request table plus retained-response store.
pub struct Correlator {
    in_flight: Mutex<HashMap<Uuid, oneshot::Sender<MessageFrame>>>,
    retained: Mutex<HashMap<Uuid, RetainedResponse>>,
    retention: Duration,
}

impl Correlator {
    pub fn new(retention: Duration) -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
            retained: Mutex::new(HashMap::new()),
            retention,
        }
    }

    /// Forward `frame` on the worker's channel and wait for the matching
    /// response, up to `timeout`.
    ///
    /// The in-flight record is removed on every exit path: delivery removes
    /// it, and the drop guard covers timeout and caller cancellation (the
    /// HTTP handler future being dropped).
    pub async fn dispatch(
        &self,
        worker: &WorkerRecord,
        frame: MessageFrame,
        timeout: Duration,
    ) -> Result<MessageFrame, RouteError> {
        let correlation_id = frame.guid;
        let (slot_tx, slot_rx) = oneshot::channel();
        self.in_flight.lock().insert(correlation_id, slot_tx);
        let _guard = InFlightGuard {
            correlator: self,
            correlation_id,
        };

        if worker.push(frame).is_err() {
            debug!(%correlation_id, worker_id = %worker.id, "outbound queue closed");
            return Err(RouteError::ProxyFailed(worker.id));
        }
        trace!(%correlation_id, worker_id = %worker.id, "request frame dispatched");

        match tokio::time::timeout(timeout, slot_rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(RouteError::Internal(
                "response slot closed before delivery".to_string(),
            )),
            Err(_) => Err(RouteError::Timeout(timeout.as_millis() as u64)),
        }
    }

    /// Deliver a response frame arriving from any worker. Frames with no
    /// waiting dispatch are retained until they expire.
    pub fn deliver(&self, frame: MessageFrame) {
        let correlation_id = frame.guid;
        let slot = self.in_flight.lock().remove(&correlation_id);
        match slot {
            Some(slot_tx) => {
                if let Err(frame) = slot_tx.send(frame) {
                    debug!(%correlation_id, "waiter gone before delivery, retaining response");
                    self.retain(frame);
                }
            }
            None => {
                debug!(%correlation_id, "response without in-flight record, retaining");
                self.retain(frame);
            }
        }
    }

    fn retain(&self, frame: MessageFrame) {
        let expires_at = frame.expiration_utc.unwrap_or_else(|| {
            Utc::now() + chrono::Duration::milliseconds(self.retention.as_millis() as i64)
        });
        self.retained.lock().insert(
            frame.guid,
            RetainedResponse { frame, expires_at },
        );
    }

    /// Evict retained responses whose expiration has passed. Returns how
    /// many entries were removed.
    pub fn sweep(&self) -> usize {
        let now = Utc::now();
        let mut retained = self.retained.lock();
        let before = retained.len();
        retained.retain(|_, entry| entry.expires_at > now);
        before - retained.len()
    }

    /// Run the periodic sweep until cancellation.
    pub async fn run_sweeper(&self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                _ = tokio::time::sleep(SWEEP_INTERVAL) => {
                    let evicted = self.sweep();
                    if evicted > 0 {
                        debug!(evicted, "expired retained responses evicted");
                    }
                }
            }
        }
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.lock().len()
    }

    pub fn retained_len(&self) -> usize {
        self.retained.lock().len()
    }

    fn remove_in_flight(&self, correlation_id: Uuid) {
        self.in_flight.lock().remove(&correlation_id);
    }
}

/// Removes the in-flight record when the dispatch future ends for any
/// reason. A no-op once delivery already removed the record.
struct InFlightGuard<'a> {
    correlator: &'a Correlator,
    correlation_id: Uuid,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.correlator.remove_in_flight(self.correlation_id);
    }
}
