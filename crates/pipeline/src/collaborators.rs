//! Contracts for the external components a stage calls out to.
//!
//! The feature extractor, plot renderer, frame renderer and feature-table
//! loader are opaque to the orchestration core: a stage only sees the
//! signatures below. All calls are blocking and run on a worker slot.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use emoscope_core::stage::FrameSource;

use crate::sink::ProgressSink;

/// Error type for collaborator calls.
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("input not found: {0}")]
    MissingInput(String),

    #[error("model artifacts not found: {0}")]
    MissingModel(String),

    #[error("{0}")]
    Failed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed worker output: {0}")]
    Protocol(String),
}

// ---------------------------------------------------------------------------
// Feature extraction
// ---------------------------------------------------------------------------

/// Numeric knobs for the feature extractor.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzerParams {
    pub target_fps: u32,
    pub frame_stride: u32,
    pub confidence_threshold: f32,
}

/// Turns a video into a per-frame feature CSV.
pub trait VideoAnalyzer: Send + Sync {
    /// Analyze `input` and write the feature table to `output`. Returns the
    /// path actually written.
    fn run(
        &self,
        input: &Path,
        output: &Path,
        params: &AnalyzerParams,
    ) -> Result<PathBuf, CollaboratorError>;
}

// ---------------------------------------------------------------------------
// Plot rendering
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct PlotParams {
    pub dpi: u32,
}

/// Renders the emotions-over-time plot for a feature CSV.
pub trait PlotRenderer: Send + Sync {
    fn render(
        &self,
        input: &Path,
        output: &Path,
        params: &PlotParams,
    ) -> Result<PathBuf, CollaboratorError>;
}

// ---------------------------------------------------------------------------
// Frame rendering
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct FrameRenderParams {
    pub source: FrameSource,
    pub fps: u32,
    pub dpi: u32,
    pub limit: Option<usize>,
}

/// What a frame renderer produced.
#[derive(Debug, Clone, Default)]
pub struct RenderedFrames {
    pub fps: u32,
    pub frames: Vec<PathBuf>,
}

/// Renders avatar frames, reporting each one through `progress` as it is
/// written (`done` starts at 1).
///
/// Frames are named `{output_prefix}_{index:04}.png`.
pub trait FrameRenderer: Send + Sync {
    fn render(
        &self,
        input: &Path,
        output_prefix: &Path,
        params: &FrameRenderParams,
        progress: &dyn ProgressSink,
    ) -> Result<RenderedFrames, CollaboratorError>;
}

// ---------------------------------------------------------------------------
// Feature table
// ---------------------------------------------------------------------------

/// One row of feature values per frame; `columns` names each value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureMatrix {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

/// Loads the per-frame expression matrix used by data mode.
pub trait FeatureTable: Send + Sync {
    fn load(&self, input: &Path, source: FrameSource) -> Result<FeatureMatrix, CollaboratorError>;
}

// ---------------------------------------------------------------------------
// Bundle
// ---------------------------------------------------------------------------

/// The set of collaborators handed to every stage.
#[derive(Clone)]
pub struct Collaborators {
    pub analyzer: Arc<dyn VideoAnalyzer>,
    pub plotter: Arc<dyn PlotRenderer>,
    pub frames: Arc<dyn FrameRenderer>,
    pub features: Arc<dyn FeatureTable>,
}
