use std::sync::Arc;

use emoscope_pipeline::service::AnalysisService;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything inside is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Job submission, polling and cancellation.
    pub service: Arc<AnalysisService>,
}
