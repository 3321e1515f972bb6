// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Worker registry: the set of connected workers and their health state.
//!
//! All operations are serialized by a single mutex; snapshots copy the list
//! so callers never iterate under the lock. The registry owns the binding
//! table reference so that removing a worker atomically evicts every
//! resource bound to it (registry mutex acquired before the binding mutex).
//!
//! The round-robin cursor indexes the worker list. Additions append and
//! cannot invalidate it; removals compact the list, so the cursor is clamped
//! to `cursor mod max(1, N)` after every removal.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use constellation_protocol::MessageFrame;

use crate::bindings::BindingTable;

/// A connected worker as seen by the controller.
///
/// Snapshots of this record are cheap clones; the cancellation token and the
/// outbound queue handle are shared with the worker's connection tasks.
#[derive(Debug, Clone)]
pub struct WorkerRecord {
    /// Identifier supplied by the worker on handshake.
    pub id: Uuid,
    /// Transport peer address, for diagnostics.
    pub address: SocketAddr,
    /// When the worker was admitted.
    pub admitted_at: DateTime<Utc>,
    /// Last time a frame arrived from this worker.
    pub last_activity: DateTime<Utc>,
    /// Health flag, owned by the per-worker heartbeat loop.
    pub healthy: bool,
    /// Cancellation scoped to this worker's tasks.
    pub cancel: CancellationToken,
    /// Outbound frame queue drained by the connection's writer task.
    pub outbound: mpsc::UnboundedSender<MessageFrame>,
}

impl WorkerRecord {
    /// Push a frame onto the worker's outbound queue. Fails once the
    /// connection's writer task has gone away.
    pub fn push(&self, frame: MessageFrame) -> Result<(), MessageFrame> {
        self.outbound.send(frame).map_err(|e| e.0)
    }
}

pub(crate) struct RegistryInner {
    pub(crate) workers: Vec<WorkerRecord>,
    pub(crate) cursor: usize,
}

/// Mutex-serialized registry of connected workers.
pub struct WorkerRegistry {
    inner: Mutex<RegistryInner>,
    bindings: Arc<BindingTable>,
}

impl WorkerRegistry {
    pub fn new(bindings: Arc<BindingTable>) -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                workers: Vec::new(),
                cursor: 0,
            }),
            bindings,
        }
    }

    /// Admit a worker. Returns false when a worker with the same id is
    /// already present; a live id is never re-admitted.
    pub fn add(&self, record: WorkerRecord) -> bool {
        let mut inner = self.inner.lock();
        if inner.workers.iter().any(|w| w.id == record.id) {
            return false;
        }
        info!(worker_id = %record.id, address = %record.address, "worker admitted");
        inner.workers.push(record);
        true
    }

    /// Remove a worker, cancel its tasks and evict its resource bindings.
    pub fn remove(&self, id: Uuid) -> bool {
        let mut inner = self.inner.lock();
        let Some(pos) = inner.workers.iter().position(|w| w.id == id) else {
            return false;
        };
        let record = inner.workers.remove(pos);
        inner.cursor %= inner.workers.len().max(1);
        record.cancel.cancel();

        // Binding mutex acquired under the registry mutex (registry → binding).
        let evicted = self.bindings.evict_worker(id);
        info!(
            worker_id = %id,
            remaining = inner.workers.len(),
            evicted_resources = evicted.len(),
            "worker removed"
        );
        true
    }

    /// Look up a worker by id.
    pub fn lookup(&self, id: Uuid) -> Option<WorkerRecord> {
        self.inner.lock().workers.iter().find(|w| w.id == id).cloned()
    }

    /// A copy of the worker list.
    pub fn snapshot(&self) -> Vec<WorkerRecord> {
        self.inner.lock().workers.clone()
    }

    /// Flip a worker's health flag. Only the worker's heartbeat loop calls
    /// this. Returns false when the worker is gone.
    pub fn set_health(&self, id: Uuid, healthy: bool) -> bool {
        let mut inner = self.inner.lock();
        match inner.workers.iter_mut().find(|w| w.id == id) {
            Some(worker) => {
                if worker.healthy != healthy {
                    debug!(worker_id = %id, healthy, "worker health changed");
                }
                worker.healthy = healthy;
                true
            }
            None => false,
        }
    }

    /// Update a worker's last-activity timestamp.
    pub fn touch(&self, id: Uuid) {
        let mut inner = self.inner.lock();
        if let Some(worker) = inner.workers.iter_mut().find(|w| w.id == id) {
            worker.last_activity = Utc::now();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().workers.is_empty()
    }

    /// Lock the registry for a routing decision. Crate-private: the router
    /// selects and advances the cursor under this guard.
    pub(crate) fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::worker;
    use super::*;

    fn registry() -> (WorkerRegistry, Arc<BindingTable>) {
        let bindings = Arc::new(BindingTable::new());
        (WorkerRegistry::new(bindings.clone()), bindings)
    }

    #[test]
    fn test_add_lookup_remove() {
        let (registry, _) = registry();
        let id = Uuid::new_v4();
        let (record, _rx) = worker(id, true);

        assert!(registry.add(record));
        assert_eq!(registry.len(), 1);
        assert!(registry.lookup(id).is_some());

        assert!(registry.remove(id));
        assert!(registry.lookup(id).is_none());
        assert!(!registry.remove(id));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let (registry, _) = registry();
        let id = Uuid::new_v4();
        let (first, _rx1) = worker(id, true);
        let (second, _rx2) = worker(id, true);

        assert!(registry.add(first));
        assert!(!registry.add(second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_evicts_bindings() {
        let (registry, bindings) = registry();
        let id = Uuid::new_v4();
        let (record, _rx) = worker(id, true);
        registry.add(record);

        bindings.bind("/a", id);
        bindings.bind("/b", id);
        assert_eq!(bindings.len(), 2);

        registry.remove(id);
        assert!(bindings.is_empty());
    }

    #[test]
    fn test_remove_cancels_worker_token() {
        let (registry, _) = registry();
        let id = Uuid::new_v4();
        let (record, _rx) = worker(id, true);
        let token = record.cancel.clone();
        registry.add(record);

        assert!(!token.is_cancelled());
        registry.remove(id);
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_cursor_clamped_after_removal() {
        let (registry, _) = registry();
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let mut rxs = Vec::new();
        for id in &ids {
            let (record, rx) = worker(*id, true);
            registry.add(record);
            rxs.push(rx);
        }

        registry.lock().cursor = 2;
        registry.remove(ids[0]);
        let cursor = registry.lock().cursor;
        assert!(cursor < registry.len());

        registry.remove(ids[1]);
        registry.remove(ids[2]);
        assert_eq!(registry.lock().cursor, 0);
    }

    #[test]
    fn test_set_health_observed_in_snapshot() {
        let (registry, _) = registry();
        let id = Uuid::new_v4();
        let (record, _rx) = worker(id, true);
        registry.add(record);

        assert!(registry.set_health(id, false));
        let snapshot = registry.snapshot();
        assert!(!snapshot[0].healthy);

        assert!(!registry.set_health(Uuid::new_v4(), false));
    }

    #[test]
    fn test_push_fails_after_receiver_dropped() {
        let (registry, _) = registry();
        let id = Uuid::new_v4();
        let (record, rx) = worker(id, true);
        registry.add(record);

        let worker = registry.lookup(id).unwrap();
        assert!(worker.push(MessageFrame::heartbeat(id)).is_ok());

        drop(rx);
        assert!(worker.push(MessageFrame::heartbeat(id)).is_err());
    }
}
