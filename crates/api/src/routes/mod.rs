pub mod analyze;
pub mod health;
pub mod jobs;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /analyze/extract                 submit feature extraction (POST)
/// /analyze/plot                    submit emotions plot (POST)
/// /analyze/frames                  submit avatar frames / data rows (POST)
///
/// /jobs/{id}                       poll job state
/// /jobs/{id}/data                  next page of data-mode rows
/// /jobs/{id}/cancel                cancel before start (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/analyze", analyze::router())
        .nest("/jobs", jobs::router())
}
