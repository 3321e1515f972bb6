// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Worker-side connection maintenance and request dispatch.
//!
//! The connection manager opens the channel to the controller, announces a
//! worker id, and dispatches inbound request frames to the handler on
//! spawned tasks so the read loop never blocks. Responses funnel through a
//! single writer queue. On disconnect it waits the configured check
//! interval and reconnects with a fresh id: from the controller's point of
//! view a reconnection is a new worker, and the previous identity's
//! bindings are discarded.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use constellation_protocol::{
    ChannelClient, FrameError, FrameKind, MessageFrame, read_frame, write_frame,
};

use crate::config::WorkerConfig;
use crate::error::{Result, WorkerError};
use crate::handler::RequestHandler;

/// Maintains the channel to the controller and drives the request handler.
pub struct WorkerConnection {
    config: WorkerConfig,
    handler: Arc<dyn RequestHandler>,
}

impl WorkerConnection {
    pub fn new(config: WorkerConfig, handler: Arc<dyn RequestHandler>) -> Self {
        Self { config, handler }
    }

    /// Run until cancellation, reconnecting on every channel loss.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        self.config.validate()?;
        let client = ChannelClient::new(self.config.channel_config())?;
        let check_interval = Duration::from_millis(self.config.connection_check_interval_ms);

        loop {
            if cancel.is_cancelled() {
                break;
            }

            // A fresh identity per connection attempt; the controller treats
            // every reconnection as a brand-new worker.
            let worker_id = Uuid::new_v4();
            match self.serve_channel(&client, worker_id, &cancel).await {
                Ok(()) => info!(%worker_id, "channel closed"),
                Err(e) => warn!(%worker_id, error = %e, "channel failed"),
            }

            if cancel.is_cancelled() {
                break;
            }
            debug!(
                delay_ms = self.config.connection_check_interval_ms,
                "waiting before reconnecting"
            );
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                _ = tokio::time::sleep(check_interval) => {}
            }
        }

        client.close().await;
        info!("worker connection manager stopped");
        Ok(())
    }

    /// Serve one channel lifetime: handshake, then dispatch until the
    /// channel drops or cancellation fires.
    async fn serve_channel(
        &self,
        client: &ChannelClient,
        worker_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let (mut send, mut recv) = client.open_channel().await?;
        write_frame(&mut send, &MessageFrame::heartbeat(worker_id)).await?;
        info!(%worker_id, controller = %self.config.controller_addr, "connected to controller");

        let (response_tx, mut response_rx) = mpsc::unbounded_channel::<MessageFrame>();

        // Writer task: sole owner of the send half.
        let writer_cancel = cancel.child_token();
        let writer = {
            let writer_cancel = writer_cancel.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        biased;

                        _ = writer_cancel.cancelled() => break,

                        frame = response_rx.recv() => {
                            let Some(frame) = frame else { break };
                            if let Err(e) = write_frame(&mut send, &frame).await {
                                warn!(error = %e, "response write failed");
                                break;
                            }
                        }
                    }
                }
            })
        };

        let result = loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break Ok(()),

                frame = read_frame(&mut recv) => match frame {
                    Ok(frame) => match frame.kind {
                        // Probes require nothing beyond the transport ack.
                        FrameKind::Heartbeat => debug!(%worker_id, "heartbeat received"),
                        FrameKind::Request => {
                            let handler = self.handler.clone();
                            let response_tx = response_tx.clone();
                            tokio::spawn(dispatch_request(handler, frame, response_tx));
                        }
                        kind => debug!(%worker_id, ?kind, "ignoring frame"),
                    },
                    Err(FrameError::ConnectionClosed) => break Ok(()),
                    Err(e) => break Err(WorkerError::from(e)),
                }
            }
        };

        writer_cancel.cancel();
        writer.abort();
        result
    }
}

/// Run the handler for one request frame and queue its response.
///
/// Handler errors and panics become a 500 response frame carrying the
/// failure message; the channel stays open either way.
async fn dispatch_request(
    handler: Arc<dyn RequestHandler>,
    request: MessageFrame,
    response_tx: mpsc::UnboundedSender<MessageFrame>,
) {
    let correlation_id = request.guid;
    let outcome = tokio::spawn(async move { handler.handle(request).await }).await;

    let response = match outcome {
        Ok(Ok(Some(mut frame))) => {
            frame.guid = correlation_id;
            frame.kind = FrameKind::Response;
            Some(frame)
        }
        Ok(Ok(None)) => None,
        Ok(Err(e)) => {
            error!(%correlation_id, error = %e, "request handler failed");
            Some(failure_response(correlation_id, &e.to_string()))
        }
        Err(join_error) => {
            error!(%correlation_id, error = %join_error, "request handler panicked");
            Some(failure_response(correlation_id, "request handler panicked"))
        }
    };

    if let Some(frame) = response
        && response_tx.send(frame).is_err()
    {
        warn!(%correlation_id, "channel writer gone, dropping response");
    }
}

fn failure_response(correlation_id: Uuid, message: &str) -> MessageFrame {
    MessageFrame {
        guid: correlation_id,
        kind: FrameKind::Response,
        status_code: Some(500),
        content_type: Some("text/plain".to_string()),
        data: message.as_bytes().to_vec(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use constellation_protocol::{HeaderMultimap, UrlDetails};

    use super::*;

    struct EchoHandler;

    #[async_trait]
    impl RequestHandler for EchoHandler {
        async fn handle(&self, request: MessageFrame) -> Result<Option<MessageFrame>> {
            let frame = MessageFrame::response(
                200,
                Some("text/plain"),
                HeaderMultimap::new(),
                request.data,
            )?;
            Ok(Some(frame))
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl RequestHandler for FailingHandler {
        async fn handle(&self, _request: MessageFrame) -> Result<Option<MessageFrame>> {
            Err(WorkerError::Handler("database locked".into()))
        }
    }

    struct PanickingHandler;

    #[async_trait]
    impl RequestHandler for PanickingHandler {
        async fn handle(&self, _request: MessageFrame) -> Result<Option<MessageFrame>> {
            panic!("boom");
        }
    }

    struct SilentHandler;

    #[async_trait]
    impl RequestHandler for SilentHandler {
        async fn handle(&self, _request: MessageFrame) -> Result<Option<MessageFrame>> {
            Ok(None)
        }
    }

    fn request() -> MessageFrame {
        MessageFrame::request(
            "POST",
            UrlDetails::new("http://localhost/echo"),
            HeaderMultimap::new(),
            b"payload".to_vec(),
        )
    }

    #[tokio::test]
    async fn test_dispatch_sets_correlation_id() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let frame = request();
        let correlation_id = frame.guid;

        dispatch_request(Arc::new(EchoHandler), frame, tx).await;

        let response = rx.recv().await.unwrap();
        assert_eq!(response.guid, correlation_id);
        assert_eq!(response.kind, FrameKind::Response);
        assert_eq!(response.status_code, Some(200));
        assert_eq!(response.data, b"payload");
    }

    #[tokio::test]
    async fn test_handler_error_becomes_500_frame() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let frame = request();
        let correlation_id = frame.guid;

        dispatch_request(Arc::new(FailingHandler), frame, tx).await;

        let response = rx.recv().await.unwrap();
        assert_eq!(response.guid, correlation_id);
        assert_eq!(response.status_code, Some(500));
        let body = String::from_utf8(response.data).unwrap();
        assert!(body.contains("database locked"));
    }

    #[tokio::test]
    async fn test_handler_panic_becomes_500_frame() {
        let (tx, mut rx) = mpsc::unbounded_channel();

        dispatch_request(Arc::new(PanickingHandler), request(), tx).await;

        let response = rx.recv().await.unwrap();
        assert_eq!(response.status_code, Some(500));
    }

    #[tokio::test]
    async fn test_silent_handler_sends_nothing() {
        let (tx, mut rx) = mpsc::unbounded_channel();

        dispatch_request(Arc::new(SilentHandler), request(), tx).await;

        assert!(rx.try_recv().is_err());
    }
}
