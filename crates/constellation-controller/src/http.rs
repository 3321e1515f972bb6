// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Public HTTP surface: reserved paths, admin endpoints and the proxy flow.
//!
//! Everything except `/`, `/favicon.ico` and the admin paths is proxied.
//! Admin paths are gated by a header-named API key; a request with a wrong
//! key gets 401, while a request with no key at all is indistinguishable
//! from a proxy request and is forwarded like any other path.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router as AxumRouter};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use constellation_protocol::{HeaderMultimap, MessageFrame, UrlDetails};

use crate::error::{ErrorBody, RouteError};
use crate::state::Controller;

const WELCOME_PAGE: &str = include_str!("../assets/welcome.html");
const FAVICON: &[u8] = include_bytes!("../assets/favicon.png");

/// Request bodies above this size are rejected rather than buffered. Kept
/// below the frame size cap so the base64 expansion cannot overflow a frame.
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Response headers the proxy recomputes instead of forwarding.
const HOP_BY_HOP_HEADERS: &[&str] = &["content-length", "transfer-encoding", "connection"];

/// Build the public HTTP router.
pub fn build_router(controller: Arc<Controller>) -> AxumRouter {
    // Reserved paths answer GET/HEAD only; any other method on them is an
    // ordinary proxy request.
    AxumRouter::new()
        .route("/", get(welcome).fallback(proxy_fallback))
        .route("/favicon.ico", get(favicon).fallback(proxy_fallback))
        .route("/workers", get(list_workers).fallback(proxy_fallback))
        .route("/maps", get(list_maps).fallback(proxy_fallback))
        .fallback(proxy_fallback)
        .with_state(controller)
}

async fn welcome() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/html")],
        WELCOME_PAGE,
    )
}

async fn favicon() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "image/png")],
        FAVICON,
    )
}

/// Worker record as exposed on the admin surface.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct WorkerSummary {
    id: Uuid,
    address: String,
    healthy: bool,
    admitted_utc: DateTime<Utc>,
    last_activity_utc: DateTime<Utc>,
}

/// Outcome of the admin key check.
enum AdminAccess {
    Granted,
    WrongKey,
    /// No key header at all: treat as a proxy request.
    Absent,
}

fn check_admin(controller: &Controller, headers: &HeaderMap) -> AdminAccess {
    let header_name = controller.settings.admin.api_key_header.as_str();
    let Some(value) = headers.get(header_name) else {
        return AdminAccess::Absent;
    };
    let Ok(presented) = value.to_str() else {
        return AdminAccess::WrongKey;
    };
    if controller
        .settings
        .admin
        .api_keys
        .iter()
        .any(|key| key == presented)
    {
        AdminAccess::Granted
    } else {
        AdminAccess::WrongKey
    }
}

async fn list_workers(
    State(controller): State<Arc<Controller>>,
    ConnectInfo(client_addr): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    match check_admin(&controller, request.headers()) {
        AdminAccess::Granted => {
            let workers: Vec<WorkerSummary> = controller
                .registry
                .snapshot()
                .into_iter()
                .map(|w| WorkerSummary {
                    id: w.id,
                    address: w.address.to_string(),
                    healthy: w.healthy,
                    admitted_utc: w.admitted_at,
                    last_activity_utc: w.last_activity,
                })
                .collect();
            Json(workers).into_response()
        }
        AdminAccess::WrongKey => unauthorized(),
        AdminAccess::Absent => proxy_request(controller, client_addr, request).await,
    }
}

async fn list_maps(
    State(controller): State<Arc<Controller>>,
    ConnectInfo(client_addr): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    match check_admin(&controller, request.headers()) {
        AdminAccess::Granted => {
            let snapshot = controller.bindings.snapshot();
            let maps: std::collections::HashMap<String, Vec<String>> = snapshot
                .into_iter()
                .map(|(id, keys)| (id.to_string(), keys))
                .collect();
            Json(maps).into_response()
        }
        AdminAccess::WrongKey => unauthorized(),
        AdminAccess::Absent => proxy_request(controller, client_addr, request).await,
    }
}

fn unauthorized() -> Response {
    let err = RouteError::Unauthorized;
    error_response(&err, None)
}

async fn proxy_fallback(
    State(controller): State<Arc<Controller>>,
    ConnectInfo(client_addr): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    proxy_request(controller, client_addr, request).await
}

/// The proxied-request flow: frame the request, route it, dispatch it and
/// translate the outcome.
async fn proxy_request(
    controller: Arc<Controller>,
    client_addr: SocketAddr,
    request: Request,
) -> Response {
    let request_id = Uuid::new_v4();
    match forward(&controller, client_addr, request, request_id).await {
        Ok(response) => response,
        Err(err) => {
            warn!(%request_id, error = %err, kind = err.kind(), "proxied request failed");
            error_response(&err, Some(request_id))
        }
    }
}

async fn forward(
    controller: &Controller,
    client_addr: SocketAddr,
    request: Request,
    request_id: Uuid,
) -> Result<Response, RouteError> {
    let method = request.method().as_str().to_string();
    let (parts, body) = request.into_parts();
    let path = parts.uri.path().to_string();

    let body = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| RouteError::Internal(format!("failed to read request body: {e}")))?;

    let host = parts
        .headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| {
            format!(
                "{}:{}",
                controller.settings.webserver.hostname, controller.settings.webserver.port
            )
        });
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let absolute_url = format!("http://{host}{path_and_query}");

    let mut headers = HeaderMultimap::new();
    for (name, value) in parts.headers.iter() {
        if let Ok(value) = value.to_str() {
            headers.insert(name.as_str(), value);
        }
    }
    headers.insert("x-forwarded-for", client_addr.ip().to_string());

    let content_type = headers.first("content-type").map(str::to_string);

    let mut frame = MessageFrame::request(
        method,
        UrlDetails::new(absolute_url),
        headers,
        body.to_vec(),
    );
    frame.guid = request_id;
    frame.content_type = content_type;

    let worker = controller.router.route(&path)?;
    debug!(%request_id, resource = %path, worker_id = %worker.id, "request routed");

    let timeout = Duration::from_millis(controller.settings.proxy.timeout_ms);
    let response_frame = controller.correlator.dispatch(&worker, frame, timeout).await?;

    let status = StatusCode::from_u16(response_frame.status_code.unwrap_or(200))
        .map_err(|e| RouteError::Internal(format!("worker returned invalid status: {e}")))?;

    let mut builder = Response::builder().status(status);
    for (name, values) in response_frame.headers.iter() {
        if HOP_BY_HOP_HEADERS.contains(&name) {
            continue;
        }
        if name == "content-type" && response_frame.content_type.is_some() {
            continue;
        }
        for value in values {
            builder = builder.header(name, value.as_str());
        }
    }
    if let Some(content_type) = &response_frame.content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type.as_str());
    }
    builder = builder
        .header("x-request", request_id.to_string())
        .header("x-worker", worker.id.to_string());

    builder
        .body(Body::from(response_frame.data))
        .map_err(|e| RouteError::Internal(format!("failed to build response: {e}")))
}

fn error_response(err: &RouteError, request_id: Option<Uuid>) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = ErrorBody::from(err);
    let mut response = (status, Json(body)).into_response();
    if let Some(request_id) = request_id
        && let Ok(value) = request_id.to_string().parse()
    {
        response.headers_mut().insert("x-request", value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    fn controller() -> Arc<Controller> {
        let mut settings = Settings::default();
        settings.admin.api_keys = vec!["secret".to_string()];
        Controller::new(settings)
    }

    #[test]
    fn test_check_admin_granted() {
        let controller = controller();
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", "secret".parse().unwrap());
        assert!(matches!(
            check_admin(&controller, &headers),
            AdminAccess::Granted
        ));
    }

    #[test]
    fn test_check_admin_wrong_key() {
        let controller = controller();
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", "nope".parse().unwrap());
        assert!(matches!(
            check_admin(&controller, &headers),
            AdminAccess::WrongKey
        ));
    }

    #[test]
    fn test_check_admin_absent_key_falls_through() {
        let controller = controller();
        let headers = HeaderMap::new();
        assert!(matches!(
            check_admin(&controller, &headers),
            AdminAccess::Absent
        ));
    }

    #[test]
    fn test_check_admin_custom_header_name() {
        let mut settings = Settings::default();
        settings.admin.api_key_header = "x-admin-token".to_string();
        settings.admin.api_keys = vec!["secret".to_string()];
        let controller = Controller::new(settings);

        let mut headers = HeaderMap::new();
        headers.insert("x-admin-token", "secret".parse().unwrap());
        assert!(matches!(
            check_admin(&controller, &headers),
            AdminAccess::Granted
        ));

        // The default header name is no longer honored.
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", "secret".parse().unwrap());
        assert!(matches!(
            check_admin(&controller, &headers),
            AdminAccess::Absent
        ));
    }

    #[test]
    fn test_error_response_shape() {
        let err = RouteError::NoWorkers("/api/users".to_string());
        let response = error_response(&err, Some(Uuid::new_v4()));
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(response.headers().contains_key("x-request"));
    }

    #[test]
    fn test_welcome_page_is_html() {
        assert!(WELCOME_PAGE.contains("<html"));
        assert!(!FAVICON.is_empty());
        // PNG magic bytes
        assert_eq!(&FAVICON[..8], b"\x89PNG\r\n\x1a\n");
    }
}
