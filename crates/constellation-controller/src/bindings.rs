// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Resource binding table: resource key → owning worker id.
//!
//! Invariants:
//! - a key maps to at most one worker at any moment;
//! - removing a worker from the registry removes every binding that points
//!   at it (the registry drives this through [`BindingTable::evict_worker`]);
//! - once bound, a key stays with its owner while the owner is healthy.
//!
//! Lock ordering: when the registry mutex and this table's mutex are both
//! needed, the registry mutex is acquired first.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Maps resource keys (request paths, query excluded) to worker ids.
#[derive(Debug, Default)]
pub struct BindingTable {
    inner: Mutex<HashMap<String, Uuid>>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `key → worker_id`, replacing any previous owner. Re-binding a
    /// key to its current owner is a no-op.
    pub fn bind(&self, key: &str, worker_id: Uuid) {
        let previous = self.inner.lock().insert(key.to_string(), worker_id);
        if previous != Some(worker_id) {
            debug!(resource = key, %worker_id, "resource bound");
        }
    }

    /// The current owner of `key`, if any.
    pub fn owner(&self, key: &str) -> Option<Uuid> {
        self.inner.lock().get(key).copied()
    }

    /// Remove every binding owned by `worker_id`, returning the keys that
    /// were bound to it.
    pub fn evict_worker(&self, worker_id: Uuid) -> Vec<String> {
        let mut inner = self.inner.lock();
        let keys: Vec<String> = inner
            .iter()
            .filter(|(_, owner)| **owner == worker_id)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &keys {
            inner.remove(key);
        }
        keys
    }

    /// Remove the binding for `key`, if present.
    pub fn evict_key(&self, key: &str) -> bool {
        self.inner.lock().remove(key).is_some()
    }

    /// A copy of the table grouped by owner.
    pub fn snapshot(&self) -> HashMap<Uuid, Vec<String>> {
        let inner = self.inner.lock();
        let mut grouped: HashMap<Uuid, Vec<String>> = HashMap::new();
        for (key, owner) in inner.iter() {
            grouped.entry(*owner).or_default().push(key.clone());
        }
        for keys in grouped.values_mut() {
            keys.sort();
        }
        grouped
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
