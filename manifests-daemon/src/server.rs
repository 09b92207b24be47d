//! HTTP surface of the daemon.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, RwLock};

use crate::error::{io_err, DaemonError};
use crate::runtime::{LastSync, SyncHandle};

pub const UPDATE_ROUTE: &str = "/api/v1/update";
pub const STATUS_ROUTE: &str = "/api/v1/status";

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub sync: SyncHandle,
    pub last_sync: Arc<RwLock<Option<LastSync>>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(UPDATE_ROUTE, post(trigger_update))
        .route("/api/v1/update/", post(trigger_update))
        .route(STATUS_ROUTE, get(last_status))
        .route("/health", get(|| async { "OK" }))
        .with_state(state)
}

/// Serve until the shutdown broadcast fires, then drain in-flight requests.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let addr = listener
        .local_addr()
        .map_err(|e| io_err("listener", e))?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            tracing::info!("shutting down http server");
        })
        .await
        .map_err(|e| io_err(addr.to_string(), e))
}

async fn trigger_update(State(state): State<AppState>) -> Response {
    tracing::info!("update triggered over http");
    match state.sync.trigger("http").await {
        Ok(summary) if summary.timed_out => {
            (StatusCode::GATEWAY_TIMEOUT, Json(summary)).into_response()
        }
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(DaemonError::ChannelClosed(_)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "daemon is shutting down" })),
        )
            .into_response(),
        Err(DaemonError::PassFailed(reason)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": reason })),
        )
            .into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response(),
    }
}

async fn last_status(State(state): State<AppState>) -> Response {
    match state.last_sync.read().await.clone() {
        Some(last) => (StatusCode::OK, Json(last)).into_response(),
        None => (StatusCode::OK, Json(json!({ "last_sync": null }))).into_response(),
    }
}
