//! Health check endpoint.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use stockpile_engine::RoundingMode;

use crate::AppState;

/// Health check response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub active_conflicts: usize,
    pub connections: usize,
    pub batch_running: bool,
    pub rounding: RoundingMode,
}

/// Create health routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/", get(root))
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_conflicts: state.engine.store().len(),
        connections: state.conn_manager.connection_count(),
        batch_running: state.batch.is_running(),
        rounding: state.config.engine.rounding,
    })
}

async fn root() -> &'static str {
    "Stockpile Conflict Server"
}
