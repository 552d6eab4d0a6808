//! HTTP admin surface (axum).
//!
//! - `GET /` and `GET /healthz`: liveness, always `OK`
//! - `GET /scan?key=<secret>`: run one pass now and return its [`ScanResult`]

use std::net::SocketAddr;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use cw_core::{domain::ScanResult, scheduler::Scheduler, Result};

#[derive(Clone)]
pub struct AdminState {
    pub scheduler: Scheduler,
    /// `None` disables the trigger route entirely.
    pub secret: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScanQuery {
    pub key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/healthz", get(health))
        .route("/scan", get(scan))
        .with_state(state)
}

/// Serve until `cancel` fires, then finish in-flight requests and return.
pub async fn serve(addr: SocketAddr, state: AdminState, cancel: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "admin listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;
    tracing::info!("admin server stopped");
    Ok(())
}

async fn health() -> &'static str {
    "OK"
}

async fn scan(
    State(state): State<AdminState>,
    Query(q): Query<ScanQuery>,
) -> std::result::Result<Json<ScanResult>, ApiError> {
    let authorized = match (&state.secret, &q.key) {
        (Some(secret), Some(key)) => constant_time_eq(secret.as_bytes(), key.as_bytes()),
        _ => false,
    };
    if !authorized {
        tracing::warn!("rejected scan trigger with missing or wrong key");
        return Err(error(StatusCode::FORBIDDEN, "forbidden"));
    }

    state
        .scheduler
        .trigger()
        .await
        .map(Json)
        .map_err(|e| error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

fn error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
