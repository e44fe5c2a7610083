use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok`, or `shutting_down` once the worker pool stopped accepting jobs.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Jobs currently held in memory.
    pub jobs: usize,
    pub worker_slots: usize,
    /// Submitted jobs not yet finished, queued or running.
    pub in_flight: usize,
}

/// GET /health -- returns service and worker pool health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let pool = state.service.pool();
    let status = if pool.is_closed() { "shutting_down" } else { "ok" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        jobs: state.service.registry().len(),
        worker_slots: pool.size(),
        in_flight: pool.in_flight(),
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
