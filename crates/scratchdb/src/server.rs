// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP front end.
//!
//! Thin JSON layer over [`LifecycleManager`]. Every response body is either
//! `{"status": "success", "data": ...}` or
//! `{"status": "error", "error": <kind>, "message": ..., "retryable": bool}`.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::lifecycle::{CreateRequest, LifecycleManager, ManagerSnapshot, StopAck};
use crate::registry::{Credentials, InstanceRecord};

/// Shared state for the handlers.
#[derive(Clone)]
pub struct AppState {
    /// Manager every route delegates to.
    pub manager: LifecycleManager,
}

/// Build the router.
pub fn router(manager: LifecycleManager) -> Router {
    Router::new()
        .route("/mysql/start", post(start_instance))
        .route("/mysql/stop/{port}", post(stop_instance))
        .route("/mysql/list", get(list_instances))
        .route("/mysql/status/{port}", get(instance_status))
        .route("/health", get(health_check))
        .with_state(AppState { manager })
}

/// Serve the router until `shutdown` flips to `true`.
pub async fn serve(
    listener: TcpListener,
    manager: LifecycleManager,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "HTTP front end listening");
    }

    axum::serve(listener, router(manager))
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
            info!("HTTP front end shutting down");
        })
        .await
}

/// Error returned by handlers.
#[derive(Debug)]
pub enum ApiError {
    /// Failure reported by the lifecycle manager.
    Lifecycle(Error),
    /// Malformed request body.
    BadRequest(String),
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError::Lifecycle(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message, retryable) = match self {
            ApiError::Lifecycle(e) => {
                let status = StatusCode::from_u16(e.status_code())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                if status.is_server_error() {
                    warn!(kind = e.kind(), error = %e, "Request failed");
                } else {
                    debug!(kind = e.kind(), error = %e, "Request rejected");
                }
                (status, e.kind(), e.to_string(), e.is_retryable())
            }
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, "bad_request", message, false)
            }
        };

        let body = json!({
            "status": "error",
            "error": kind,
            "message": message,
            "retryable": retryable,
        });
        (status, Json(body)).into_response()
    }
}

#[derive(Serialize)]
struct Success<T> {
    status: &'static str,
    data: T,
}

fn success<T: Serialize>(data: T) -> Json<Success<T>> {
    Json(Success {
        status: "success",
        data,
    })
}

type ApiResult<T> = Result<Json<Success<T>>, ApiError>;

// -- Handlers --

async fn health_check() -> &'static str {
    "ok"
}

async fn start_instance(State(state): State<AppState>, body: Bytes) -> ApiResult<Credentials> {
    // An empty body means all defaults
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        CreateRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("invalid request body: {}", e)))?
    };

    let credentials = state.manager.create_instance(request).await?;
    Ok(success(credentials))
}

async fn stop_instance(
    State(state): State<AppState>,
    Path(port): Path<u16>,
) -> ApiResult<StopAck> {
    let ack = state.manager.stop_instance(port).await?;
    Ok(success(ack))
}

async fn list_instances(State(state): State<AppState>) -> ApiResult<ManagerSnapshot> {
    Ok(success(state.manager.list().await))
}

async fn instance_status(
    State(state): State<AppState>,
    Path(port): Path<u16>,
) -> ApiResult<InstanceRecord> {
    let record = state.manager.status(port).await?;
    Ok(success(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_error_body_shape() {
        let response = ApiError::from(Error::QueueFull { max_depth: 3 }).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let response = ApiError::from(Error::AdmissionTimeout {
            waited: Duration::from_secs(1),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);

        let response = ApiError::BadRequest("nope".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
