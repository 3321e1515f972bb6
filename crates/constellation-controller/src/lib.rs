// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Constellation Controller - resource-pinning reverse proxy
//!
//! The controller accepts HTTP on a public port and multiplexes requests
//! onto persistent worker channels, with the invariant that every distinct
//! resource key (the request path, query excluded) is owned by exactly one
//! worker for as long as that worker stays healthy.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        HTTP clients                          │
//! └──────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │  http: reserved paths · admin endpoints · proxy fallback     │
//! ├──────────────────────────────────────────────────────────────┤
//! │  router ──▶ registry (workers, cursor) + bindings (key→id)   │
//! │  correlator ──▶ in-flight table keyed by correlation id      │
//! │  heartbeat ──▶ one probe loop per worker                     │
//! ├──────────────────────────────────────────────────────────────┤
//! │  channel: QUIC listener, one duplex stream per worker        │
//! └──────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//!                    workers (constellation-worker)
//! ```
//!
//! Control flow for a proxied request: HTTP request → router (binding reuse
//! or round-robin) → correlator dispatch → worker channel → response frame
//! → correlator wakes the handler → HTTP response. Per-worker heartbeat
//! loops run orthogonally; transport disconnects and exhausted heartbeat
//! budgets both evict the worker and its bindings.

pub mod bindings;
pub mod channel;
pub mod config;
pub mod correlator;
pub mod error;
pub mod heartbeat;
pub mod http;
pub mod logging;
pub mod registry;
pub mod router;
pub mod state;

pub use config::{DEFAULT_SETTINGS_PATH, Settings};
pub use error::RouteError;
pub use state::Controller;
