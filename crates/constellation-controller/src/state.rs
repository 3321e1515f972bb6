// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared controller state.
//!
//! The registry and binding table are process-wide but owned by a single
//! `Controller` value passed explicitly, so several controllers can coexist
//! in one process (tests do exactly that).

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::bindings::BindingTable;
use crate::config::Settings;
use crate::correlator::Correlator;
use crate::registry::WorkerRegistry;
use crate::router::Router;

/// One controller instance: settings plus the routing/correlation core.
pub struct Controller {
    pub settings: Settings,
    pub registry: Arc<WorkerRegistry>,
    pub bindings: Arc<BindingTable>,
    pub router: Router,
    pub correlator: Correlator,
    /// Root cancellation: per-worker tokens and background tasks derive
    /// from this.
    pub shutdown: CancellationToken,
}

impl Controller {
    pub fn new(settings: Settings) -> Arc<Self> {
        let bindings = Arc::new(BindingTable::new());
        let registry = Arc::new(WorkerRegistry::new(bindings.clone()));
        let router = Router::new(registry.clone(), bindings.clone());
        let correlator = Correlator::new(Duration::from_millis(
            settings.proxy.response_retention_ms,
        ));

        Arc::new(Self {
            settings,
            registry,
            bindings,
            router,
            correlator,
            shutdown: CancellationToken::new(),
        })
    }
}
