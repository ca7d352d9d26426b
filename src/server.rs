//! HTTP server for health checks, metrics and the current report

use axum::extract::State;
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::Result;
use crate::shutdown::Shutdown;
use crate::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/snapshot", get(snapshot))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until shutdown
pub async fn serve(state: Arc<AppState>, addr: SocketAddr, shutdown: Shutdown) -> Result<()> {
    info!(addr = %addr, "Starting health check server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await?;

    Ok(())
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let status = state.relay.status();
    let prices: Vec<serde_json::Value> = state
        .relay
        .store()
        .snapshot_all()
        .into_iter()
        .map(|(symbol, point)| serde_json::json!({ "symbol": symbol, "price": point }))
        .collect();

    Json(serde_json::json!({
        "status": "healthy",
        "component": "market-relay",
        "feed_connected": state.metrics.feed_connected.get() == 1,
        "relay": status,
        "prices": prices,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn metrics(State(state): State<Arc<AppState>>) -> (StatusCode, String) {
    match state.metrics.encode() {
        Ok(text) => (StatusCode::OK, text),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn snapshot(State(state): State<Arc<AppState>>) -> String {
    state.relay.get_formatted_snapshot()
}
