//! Handlers for the `/analyze` resource.
//!
//! Every endpoint only queues work. The response carries the new job id and
//! the outcome is observed through `/jobs/{id}`. Bodies that are not valid
//! JSON for the stage are answered with `400 BAD_REQUEST`; well-formed bodies
//! with out-of-range values with `400 VALIDATION_ERROR`.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use emoscope_core::stage::{ExtractRequest, FramesRequest, PlotRequest, StageRequest};
use emoscope_core::types::JobId;
use serde::Serialize;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// Body of a successful submission.
#[derive(Debug, Serialize)]
pub struct JobCreated {
    pub job_id: JobId,
}

fn accepted(job_id: JobId) -> impl IntoResponse {
    (
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: JobCreated { job_id },
        }),
    )
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/analyze/extract
pub async fn submit_extract(
    State(state): State<AppState>,
    payload: Result<Json<ExtractRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(input) = payload?;
    let job_id = state.service.submit(StageRequest::Extract(input))?;
    Ok(accepted(job_id))
}

/// POST /api/v1/analyze/plot
pub async fn submit_plot(
    State(state): State<AppState>,
    payload: Result<Json<PlotRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(input) = payload?;
    let job_id = state.service.submit(StageRequest::Plot(input))?;
    Ok(accepted(job_id))
}

/// POST /api/v1/analyze/frames
///
/// `mode` selects rendered avatar images (`image`, the default) or raw
/// per-frame feature rows (`data`), the latter read via `/jobs/{id}/data`.
pub async fn submit_frames(
    State(state): State<AppState>,
    payload: Result<Json<FramesRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(input) = payload?;
    let job_id = state.service.submit(StageRequest::Frames(input))?;
    Ok(accepted(job_id))
}
