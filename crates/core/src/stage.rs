//! Request schemas for the three pipeline stages.
//!
//! Each stage has its own typed payload, validated at the boundary so a
//! malformed request is rejected before any job exists. Artifact references
//! are plain names resolved by the artifact store, never paths.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::error::CoreError;
use crate::job::FrameMode;

/// Maximum length of an artifact reference.
const MAX_REFERENCE_LEN: usize = 255;

// ---------------------------------------------------------------------------
// Stage kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Extract,
    Plot,
    Frames,
}

impl StageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StageKind::Extract => "extract",
            StageKind::Plot => "plot",
            StageKind::Frames => "frames",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which expression signal drives the avatar frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameSource {
    /// Smoothed hidden-state expectations.
    #[default]
    Hmm,
    /// Raw per-frame action units.
    Real,
}

impl FrameSource {
    pub fn as_str(self) -> &'static str {
        match self {
            FrameSource::Hmm => "hmm",
            FrameSource::Real => "real",
        }
    }

    /// The source tried when this one renders nothing.
    pub fn alternate(self) -> Self {
        match self {
            FrameSource::Hmm => FrameSource::Real,
            FrameSource::Real => FrameSource::Hmm,
        }
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Feature extraction from an uploaded video.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ExtractRequest {
    #[validate(custom(function = "validate_reference"))]
    pub input: String,
    #[validate(custom(function = "validate_reference"))]
    pub output: Option<String>,
    #[serde(default = "default_target_fps")]
    #[validate(range(min = 1, max = 120))]
    pub target_fps: u32,
    #[serde(default = "default_frame_stride")]
    #[validate(range(min = 1, max = 1000))]
    pub frame_stride: u32,
    #[serde(default = "default_confidence_threshold")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub confidence_threshold: f32,
}

/// Emotions plot from a prior extraction CSV.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PlotRequest {
    #[validate(custom(function = "validate_reference"))]
    pub input: String,
    #[validate(custom(function = "validate_reference"))]
    pub output: Option<String>,
    #[serde(default = "default_plot_dpi")]
    #[validate(range(min = 50, max = 600))]
    pub dpi: u32,
}

/// Avatar frames (image mode) or per-frame feature rows (data mode).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FramesRequest {
    #[validate(custom(function = "validate_reference"))]
    pub input: String,
    #[serde(default)]
    pub mode: FrameMode,
    #[serde(default)]
    pub source: FrameSource,
    #[serde(default = "default_frames_fps")]
    #[validate(range(min = 1, max = 120))]
    pub fps: u32,
    #[serde(default = "default_frames_dpi")]
    #[validate(range(min = 50, max = 600))]
    pub dpi: u32,
    #[validate(range(min = 1))]
    pub limit: Option<usize>,
}

impl FramesRequest {
    /// Playback rate handed to the renderer and exposed to pollers.
    pub fn playback_fps(&self) -> u32 {
        self.fps.clamp(1, 25)
    }
}

fn default_target_fps() -> u32 {
    25
}

fn default_frame_stride() -> u32 {
    25
}

fn default_confidence_threshold() -> f32 {
    0.95
}

fn default_plot_dpi() -> u32 {
    160
}

fn default_frames_fps() -> u32 {
    12
}

fn default_frames_dpi() -> u32 {
    150
}

/// Artifact references are bare names inside the store.
fn validate_reference(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("empty").with_message("must not be empty".into()));
    }
    if value.len() > MAX_REFERENCE_LEN {
        return Err(ValidationError::new("too_long")
            .with_message(format!("must not exceed {MAX_REFERENCE_LEN} characters").into()));
    }
    if value.contains(['/', '\\', '\0']) || value == "." || value == ".." {
        return Err(ValidationError::new("not_a_name")
            .with_message("must be an artifact name, not a path".into()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tagged request
// ---------------------------------------------------------------------------

/// A validated-at-submission request for any stage.
#[derive(Debug, Clone)]
pub enum StageRequest {
    Extract(ExtractRequest),
    Plot(PlotRequest),
    Frames(FramesRequest),
}

impl StageRequest {
    pub fn kind(&self) -> StageKind {
        match self {
            StageRequest::Extract(_) => StageKind::Extract,
            StageRequest::Plot(_) => StageKind::Plot,
            StageRequest::Frames(_) => StageKind::Frames,
        }
    }

    /// Frame mode recorded on the job at creation (frames stage only).
    pub fn frame_mode(&self) -> Option<FrameMode> {
        match self {
            StageRequest::Frames(req) => Some(req.mode),
            _ => None,
        }
    }

    pub fn input(&self) -> &str {
        match self {
            StageRequest::Extract(req) => &req.input,
            StageRequest::Plot(req) => &req.input,
            StageRequest::Frames(req) => &req.input,
        }
    }

    /// Run the schema rules, mapping failures to [`CoreError::Validation`].
    pub fn validate(&self) -> Result<(), CoreError> {
        let outcome = match self {
            StageRequest::Extract(req) => req.validate(),
            StageRequest::Plot(req) => req.validate(),
            StageRequest::Frames(req) => req.validate(),
        };
        outcome.map_err(|e| CoreError::Validation(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn extract(json: serde_json::Value) -> ExtractRequest {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn extract_defaults_applied() {
        let req = extract(serde_json::json!({ "input": "clip.mp4" }));
        assert_eq!(req.target_fps, 25);
        assert_eq!(req.frame_stride, 25);
        assert!((req.confidence_threshold - 0.95).abs() < f32::EPSILON);
        assert!(StageRequest::Extract(req).validate().is_ok());
    }

    #[test]
    fn missing_input_is_rejected_at_parse() {
        let parsed = serde_json::from_value::<ExtractRequest>(serde_json::json!({ "target_fps": 10 }));
        assert!(parsed.is_err());
    }

    #[test]
    fn out_of_range_parameters_are_rejected() {
        let req = extract(serde_json::json!({ "input": "clip.mp4", "target_fps": 0 }));
        assert_matches!(StageRequest::Extract(req).validate(), Err(CoreError::Validation(_)));

        let req = extract(serde_json::json!({ "input": "clip.mp4", "confidence_threshold": 1.5 }));
        assert_matches!(StageRequest::Extract(req).validate(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn path_like_references_are_rejected() {
        for bad in ["../etc/passwd", "a/b.csv", "..", "", "   "] {
            let req = PlotRequest {
                input: bad.to_string(),
                output: None,
                dpi: 160,
            };
            assert!(StageRequest::Plot(req).validate().is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn optional_output_is_checked_when_present() {
        let req = extract(serde_json::json!({ "input": "clip.mp4", "output": "x/y.csv" }));
        assert!(StageRequest::Extract(req).validate().is_err());
    }

    #[test]
    fn frames_defaults_and_mode() {
        let req: FramesRequest =
            serde_json::from_value(serde_json::json!({ "input": "a.csv", "mode": "data" })).unwrap();
        assert_eq!(req.mode, FrameMode::Data);
        assert_eq!(req.source, FrameSource::Hmm);
        assert_eq!(req.fps, 12);
        assert_eq!(req.dpi, 150);
        let request = StageRequest::Frames(req);
        assert_eq!(request.frame_mode(), Some(FrameMode::Data));
        assert_eq!(request.kind(), StageKind::Frames);
    }

    #[test]
    fn frames_zero_limit_rejected() {
        let req: FramesRequest =
            serde_json::from_value(serde_json::json!({ "input": "a.csv", "limit": 0 })).unwrap();
        assert!(StageRequest::Frames(req).validate().is_err());
    }

    #[test]
    fn playback_fps_is_clamped() {
        let req: FramesRequest =
            serde_json::from_value(serde_json::json!({ "input": "a.csv", "fps": 60 })).unwrap();
        assert_eq!(req.playback_fps(), 25);
    }

    #[test]
    fn alternate_source_flips() {
        assert_eq!(FrameSource::Hmm.alternate(), FrameSource::Real);
        assert_eq!(FrameSource::Real.alternate(), FrameSource::Hmm);
    }
}
