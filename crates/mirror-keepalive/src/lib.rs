//! Keep-alive HTTP server that reports mirror liveness.
//!
//! Hosting platforms put the bot to sleep without inbound traffic, so this
//! serves a minimal root route plus a JSON gateway health snapshot for probes.

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use mirror_core::{GatewayHealthSnapshot, SharedGatewayHealth};
use tokio::net::TcpListener;

pub fn build_keep_alive_router(health: SharedGatewayHealth) -> Router {
    Router::new()
        .route("/", get(handle_root))
        .route("/healthz", get(handle_healthz))
        .with_state(health)
}

async fn handle_root() -> impl IntoResponse {
    (StatusCode::OK, "Mirror bot is awake!")
}

async fn handle_healthz(State(health): State<SharedGatewayHealth>) -> impl IntoResponse {
    let snapshot = health
        .lock()
        .map(|guard| guard.clone())
        .unwrap_or_else(|_| GatewayHealthSnapshot::default());
    (StatusCode::OK, Json(snapshot))
}

/// Binds the keep-alive server and serves until the process exits.
pub async fn serve_keep_alive(port: u16, health: SharedGatewayHealth) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind keep-alive port {port}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve keep-alive bound address")?;
    tracing::info!(addr = %local_addr, "keep-alive server listening");
    axum::serve(listener, build_keep_alive_router(health))
        .await
        .context("keep-alive server exited unexpectedly")
}
