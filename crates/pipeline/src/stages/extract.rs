//! Feature extraction from an uploaded video.

use emoscope_core::job::JobPatch;
use emoscope_core::naming::analysis_csv_name;
use emoscope_core::progress::{EXTRACT, STARTED};
use emoscope_core::stage::ExtractRequest;
use serde::Serialize;

use super::{artifact_name, JobHandle, StageContext, StageError};
use crate::collaborators::AnalyzerParams;

#[derive(Debug, Clone, Serialize)]
pub struct ExtractOutcome {
    pub csv_name: String,
    pub csv_url: String,
    pub output_path: String,
}

pub(super) fn run(
    ctx: &StageContext,
    job: &JobHandle<'_>,
    req: &ExtractRequest,
) -> Result<ExtractOutcome, StageError> {
    let input = ctx.locate_input(&req.input)?;
    job.step(&format!("Extracting features from {}", req.input), STARTED);

    let requested = req
        .output
        .clone()
        .unwrap_or_else(|| analysis_csv_name(&req.input));
    let output = ctx.store.output_path(&requested)?;
    let params = AnalyzerParams {
        target_fps: req.target_fps,
        frame_stride: req.frame_stride,
        confidence_threshold: req.confidence_threshold,
    };

    let written = ctx
        .collaborators
        .analyzer
        .run(&input, &output, &params)
        .map_err(|e| StageError::collaborator("Feature extraction", e))?;

    let csv_name = artifact_name(&written, &requested);
    let csv_url = ctx.store.url_for(&csv_name);
    job.update(JobPatch {
        csv_name: Some(csv_name.clone()),
        csv_url: Some(csv_url.clone()),
        ..Default::default()
    });
    job.step(&format!("Prediction finished: {csv_name}"), EXTRACT.end);

    Ok(ExtractOutcome {
        csv_name,
        csv_url,
        output_path: written.display().to_string(),
    })
}
