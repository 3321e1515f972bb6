// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The per-request business-logic seam.

use async_trait::async_trait;

use constellation_protocol::MessageFrame;

use crate::error::Result;

/// Handles one proxied request frame.
///
/// Returning `Ok(Some(frame))` sends the frame back as the response; the
/// connection layer fills in the correlation id. Returning `Ok(None)` sends
/// nothing, leaving the controller to time the request out. Errors and
/// panics are caught at the dispatch boundary and converted into a 500
/// response frame; they never close the channel.
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    async fn handle(&self, request: MessageFrame) -> Result<Option<MessageFrame>>;
}
