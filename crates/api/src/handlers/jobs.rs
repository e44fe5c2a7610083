//! Handlers for the `/jobs` resource.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use emoscope_core::pagination::DataPageQuery;
use emoscope_core::types::JobId;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}
///
/// Snapshot of the job including partial results (frames rendered so far,
/// artifact URLs set by completed steps and recent log lines).
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let view = state.service.status(job_id)?;
    Ok(Json(DataResponse { data: view }))
}

// ---------------------------------------------------------------------------
// Data pages
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}/data
///
/// Next chunk of data-mode rows. Without `cursor` the server-side cursor is
/// advanced; with `cursor` the read has no side effects.
pub async fn get_job_data(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
    Query(params): Query<DataPageQuery>,
) -> AppResult<impl IntoResponse> {
    let page = state.service.data_page(job_id, params)?;
    Ok(Json(DataResponse { data: page }))
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/{id}/cancel
///
/// Only jobs still waiting for a worker slot can be canceled. Returns 204 on
/// success, 409 once the job has started.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    state.service.cancel(job_id)?;
    tracing::info!(job_id = %job_id, "Job canceled");
    Ok(StatusCode::NO_CONTENT)
}
