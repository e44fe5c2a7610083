//! Request handlers for stage submission and job polling.
//!
//! Handlers stay thin: they unpack the request, delegate to
//! [`AnalysisService`](emoscope_pipeline::service::AnalysisService) and map
//! errors via [`AppError`](crate::error::AppError).

pub mod analyze;
pub mod jobs;
