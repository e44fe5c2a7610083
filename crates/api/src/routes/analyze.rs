//! Route definitions for stage submission.

use axum::routing::post;
use axum::Router;

use crate::handlers::analyze;
use crate::state::AppState;

/// Routes mounted at `/analyze`.
///
/// ```text
/// POST   /extract     -> submit_extract
/// POST   /plot        -> submit_plot
/// POST   /frames      -> submit_frames
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/extract", post(analyze::submit_extract))
        .route("/plot", post(analyze::submit_plot))
        .route("/frames", post(analyze::submit_frames))
}
