use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::relay::RegistryStats;
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// GET /api/health: liveness probe.
async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let uptime = Utc::now() - state.started_at;
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": uptime.num_seconds(),
    }))
}

/// GET /api/status: registry counts.
async fn status(State(state): State<AppState>) -> Json<RegistryStats> {
    Json(state.relay.stats())
}

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler::ws_upgrade))
        // Path the web client's socket library connects to by default
        .route("/socket.io/", get(ws_handler::ws_upgrade))
        .route("/api/health", get(health))
        .route("/api/status", get(status))
        // Any origin, as during development of the web client
        .layer(CorsLayer::permissive())
        .with_state(state)
}
