// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Constellation Protocol - QUIC + JSON frame communication layer
//!
//! This crate provides the wire protocol between the Constellation
//! controller and its workers:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  constellation-protocol                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Envelope: MessageFrame (Heartbeat / Request / Response)    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Serialization: JSON (serde_json), base64 payloads          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Transport: QUIC (quinn), one persistent duplex stream      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! A worker opens a single bidirectional stream to the controller and keeps
//! it for the lifetime of the connection. The first frame it sends is a
//! Heartbeat frame whose `GUID` is the worker id; after that, request and
//! response frames flow in both directions and are paired by correlation id
//! rather than by stream position, so out-of-order completion is fine.

pub mod client;
pub mod frame;
pub mod server;

pub use client::{ChannelClient, ChannelClientConfig, ClientError};
pub use frame::{
    FrameError, FrameKind, HeaderMultimap, MessageFrame, UrlDetails, read_frame, write_frame,
};
pub use server::{ChannelServer, ChannelServerConfig, ServerError, WorkerChannel};
