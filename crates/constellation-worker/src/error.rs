// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Worker-side error types.

use thiserror::Error;

use constellation_protocol::{ClientError, FrameError};

/// Errors that can occur in the worker SDK.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Configuration error (missing or invalid value)
    #[error("configuration error: {0}")]
    Config(String),

    /// Channel connection to the controller failed
    #[error("connection error: {0}")]
    Connection(#[from] ClientError),

    /// Frame encoding/decoding failed
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Request handler failure, converted to a 500 response frame
    #[error("handler error: {0}")]
    Handler(String),
}

/// Type alias for worker results.
pub type Result<T> = std::result::Result<T, WorkerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = WorkerError::Config("ConnectionCheckIntervalMs must be at least 1000".into());
        assert_eq!(
            format!("{}", err),
            "configuration error: ConnectionCheckIntervalMs must be at least 1000"
        );
    }

    #[test]
    fn test_handler_error_display() {
        let err = WorkerError::Handler("database locked".into());
        assert_eq!(format!("{}", err), "handler error: database locked");
    }
}
