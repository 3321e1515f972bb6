// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Constellation Worker SDK
//!
//! A worker opens a persistent channel to the controller, announces a
//! worker id, and serves the proxied requests the controller pins to it.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use constellation_protocol::{HeaderMultimap, MessageFrame};
//! use constellation_worker::{RequestHandler, WorkerConfig, WorkerConnection};
//! use tokio_util::sync::CancellationToken;
//!
//! struct MyHandler;
//!
//! #[async_trait]
//! impl RequestHandler for MyHandler {
//!     async fn handle(
//!         &self,
//!         request: MessageFrame,
//!     ) -> constellation_worker::Result<Option<MessageFrame>> {
//!         let response = MessageFrame::response(
//!             200,
//!             Some("text/plain"),
//!             HeaderMultimap::new(),
//!             b"hello".to_vec(),
//!         )?;
//!         Ok(Some(response))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = WorkerConfig::new("127.0.0.1:8001".parse()?);
//!     let connection = WorkerConnection::new(config, Arc::new(MyHandler));
//!     connection.run(CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod handler;

pub use config::WorkerConfig;
pub use connection::WorkerConnection;
pub use error::{Result, WorkerError};
pub use handler::RequestHandler;
