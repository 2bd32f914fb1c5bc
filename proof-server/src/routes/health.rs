//! Health and status endpoints

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::state::AppState;
use crate::types::{HealthResponse, StatusResponse};

/// Create health routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(status))
}

/// Health check endpoint
/// GET /health
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let queue_length = state.proof_queue_length().await;
    let estimated_wait = queue_length as u64 * 30; // ~30 seconds per proof estimate

    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        queue_length,
        estimated_wait_secs: estimated_wait,
        dev_mode: state.prover().is_mock(),
        chain_configured: state.chain().is_some(),
    };

    (StatusCode::OK, Json(response))
}

/// Detailed status endpoint
/// GET /status
async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let response = StatusResponse {
        status: "running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        prover_backend: state.prover().backend_name().to_string(),
        limb_layout: state.builder().limb_layout(),
        max_message_length: state.builder().message_capacity(),
        total_proofs: state.total_proofs_generated(),
        total_reports: state.total_reports_submitted(),
        uptime_secs: state.uptime_secs(),
    };

    (StatusCode::OK, Json(response))
}
