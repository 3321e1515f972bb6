// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Resource routing: pin each resource key to one healthy worker.
//!
//! An existing binding whose owner is present and healthy is always reused.
//! New resources are spread round-robin over the healthy workers; the
//! cursor advances only when a new binding is recorded, so reuse of an
//! existing binding does not skew the distribution.

use std::sync::Arc;

use tracing::debug;

use crate::bindings::BindingTable;
use crate::error::RouteError;
use crate::registry::{WorkerRecord, WorkerRegistry};

/// Routing engine over the registry and binding table.
pub struct Router {
    registry: Arc<WorkerRegistry>,
    bindings: Arc<BindingTable>,
}

impl Router {
    pub fn new(registry: Arc<WorkerRegistry>, bindings: Arc<BindingTable>) -> Self {
        Self { registry, bindings }
    }

    /// Select the worker that owns `resource`, binding it first if needed.
    ///
    /// Runs entirely under the registry lock (binding lock nested inside)
    /// so a stale binding is dropped atomically with its replacement and
    /// concurrent calls for the same key agree on one owner.
    pub fn route(&self, resource: &str) -> Result<WorkerRecord, RouteError> {
        let mut inner = self.registry.lock();

        if let Some(owner) = self.bindings.owner(resource) {
            match inner.workers.iter().find(|w| w.id == owner) {
                Some(worker) if worker.healthy => {
                    return Ok(worker.clone());
                }
                Some(_) => {
                    // Owner still registered but unhealthy: eviction is in
                    // flight, rebind below.
                }
                None => {
                    // Stale binding: owner left the registry.
                    self.bindings.evict_key(resource);
                }
            }
        }

        let count = inner.workers.len();
        for step in 1..=count {
            let idx = (inner.cursor + step) % count;
            if inner.workers[idx].healthy {
                inner.cursor = idx;
                let worker = inner.workers[idx].clone();
                self.bindings.bind(resource, worker.id);
                debug!(resource, worker_id = %worker.id, "resource routed to new owner");
                return Ok(worker);
            }
        }

        Err(RouteError::NoWorkers(resource.to_string()))
    }
}
