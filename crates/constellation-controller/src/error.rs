// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Routing and correlation error taxonomy.
//!
//! Every failure a client can observe maps to exactly one of these variants;
//! the HTTP layer turns them into status codes and JSON error bodies.

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the routing and correlation core.
#[derive(Debug, Error)]
pub enum RouteError {
    /// Registry empty or no healthy candidate for the resource.
    #[error("No workers available for resource {0}.")]
    NoWorkers(String),

    /// The transport refused to forward the frame to the owning worker.
    #[error("failed to forward request to worker {0}")]
    ProxyFailed(Uuid),

    /// No response frame arrived within the proxy timeout.
    #[error("no response within {0}ms")]
    Timeout(u64),

    /// Admin path with a wrong API key.
    #[error("Authorization failed: invalid API key")]
    Unauthorized,

    /// Unhandled controller-side failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RouteError {
    /// The error kind string used in JSON error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoWorkers(_) | Self::ProxyFailed(_) => "BadGateway",
            Self::Timeout(_) => "Timeout",
            Self::Unauthorized => "Unauthorized",
            Self::Internal(_) => "InternalError",
        }
    }

    /// The HTTP status this error surfaces as.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NoWorkers(_) | Self::ProxyFailed(_) => 502,
            Self::Timeout(_) => 408,
            Self::Unauthorized => 401,
            Self::Internal(_) => 500,
        }
    }
}

/// JSON error body returned to HTTP clients.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
}

impl From<&RouteError> for ErrorBody {
    fn from(err: &RouteError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(RouteError::NoWorkers("/a".into()).status_code(), 502);
        assert_eq!(RouteError::ProxyFailed(Uuid::new_v4()).status_code(), 502);
        assert_eq!(RouteError::Timeout(30_000).status_code(), 408);
        assert_eq!(RouteError::Unauthorized.status_code(), 401);
        assert_eq!(RouteError::Internal("boom".into()).status_code(), 500);
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(RouteError::NoWorkers("/a".into()).kind(), "BadGateway");
        assert_eq!(RouteError::ProxyFailed(Uuid::new_v4()).kind(), "BadGateway");
        assert_eq!(RouteError::Timeout(1_000).kind(), "Timeout");
        assert_eq!(RouteError::Unauthorized.kind(), "Unauthorized");
        assert_eq!(RouteError::Internal("x".into()).kind(), "InternalError");
    }

    #[test]
    fn test_no_workers_message_names_the_resource() {
        let err = RouteError::NoWorkers("/api/users".into());
        assert_eq!(
            err.to_string(),
            "No workers available for resource /api/users."
        );
    }

    #[test]
    fn test_unauthorized_body_mentions_authorization() {
        let body = ErrorBody::from(&RouteError::Unauthorized);
        assert!(body.message.contains("Authorization"));
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"kind\":\"Unauthorized\""));
    }
}
