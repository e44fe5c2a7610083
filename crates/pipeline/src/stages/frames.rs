//! Avatar frames (image mode) and per-frame feature rows (data mode).
//!
//! Image mode streams rendered frame names into `frames` through a
//! [`JobProgressSink`] while the renderer runs. If a render attempt yields
//! nothing, the alternate avatar source is tried once before the stage
//! settles for an empty result.
//!
//! Data mode appends one [`DataItem`] per matrix row, each with its own
//! registry update, so pollers can page through rows while later ones are
//! still being produced.

use std::path::Path;
use std::sync::Arc;

use emoscope_core::job::{DataItem, FrameMode, JobPatch};
use emoscope_core::naming::avatar_frame_prefix;
use emoscope_core::progress::FRAMES;
use emoscope_core::stage::{FrameSource, FramesRequest};
use serde::Serialize;

use super::{artifact_name, encode, JobHandle, SoftFailure, StageContext, StageError};
use crate::collaborators::{CollaboratorError, FrameRenderParams, RenderedFrames};
use crate::sink::JobProgressSink;

#[derive(Debug, Clone, Serialize)]
pub struct ImageFramesOutcome {
    pub mode: FrameMode,
    pub fps: u32,
    pub source: FrameSource,
    pub frames_base_url: String,
    pub frames: Vec<String>,
    pub soft_failures: Vec<SoftFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DataFramesOutcome {
    pub mode: FrameMode,
    pub rows: usize,
    pub columns: Vec<String>,
}

pub(super) fn run(
    ctx: &StageContext,
    job: &JobHandle<'_>,
    req: &FramesRequest,
) -> Result<serde_json::Value, StageError> {
    let input = ctx.locate_input(&req.input)?;
    match req.mode {
        FrameMode::Image => encode(run_images(ctx, job, req, &input)?),
        FrameMode::Data => encode(run_data(ctx, job, req, &input)?),
    }
}

// ---------------------------------------------------------------------------
// Image mode
// ---------------------------------------------------------------------------

fn run_images(
    ctx: &StageContext,
    job: &JobHandle<'_>,
    req: &FramesRequest,
    input: &Path,
) -> Result<ImageFramesOutcome, StageError> {
    let frames_base_url = ctx.store.base_url().to_string();
    let fps = req.playback_fps();
    job.update(JobPatch {
        frames_base_url: Some(frames_base_url.clone()),
        frames_fps: Some(fps),
        ..Default::default()
    });
    job.step(
        &format!("Rendering avatar frames ({} source, {fps} fps)", req.source.as_str()),
        FRAMES.start,
    );

    let mut source = req.source;
    let mut attempt = render_attempt(ctx, job, req, input, source);
    if !produced_frames(&attempt) {
        let fallback = source.alternate();
        let reason = match &attempt {
            Ok(_) => "no frames produced".to_string(),
            Err(e) => e.to_string(),
        };
        job.log(&format!(
            "Avatar frames from {} source unavailable ({reason}); retrying with {} source",
            source.as_str(),
            fallback.as_str()
        ));
        source = fallback;
        attempt = render_attempt(ctx, job, req, input, source);
    }

    let mut soft_failures = Vec::new();
    let mut frames = Vec::new();
    let mut rendered_fps = fps;
    match attempt {
        Ok(rendered) if !rendered.frames.is_empty() => {
            frames = rendered
                .frames
                .iter()
                .enumerate()
                .map(|(i, path)| artifact_name(path, &format!("frame_{i:04}.png")))
                .collect();
            if rendered.fps > 0 {
                rendered_fps = rendered.fps;
            }
            // Renderers that never called the sink still end up listed.
            job.update(JobPatch {
                append_frames: frames.clone(),
                frames_done: Some(frames.len()),
                frames_total: Some(frames.len()),
                ..Default::default()
            });
            job.step(&format!("Rendered {} avatar frames", frames.len()), FRAMES.end);
        }
        Ok(_) => {
            soft_failures.push(job.soft_failure("Avatar frames", "no frames produced".into()));
        }
        Err(e) => {
            soft_failures.push(job.soft_failure("Avatar frames", e.to_string()));
        }
    }

    Ok(ImageFramesOutcome {
        mode: FrameMode::Image,
        fps: rendered_fps,
        source,
        frames_base_url,
        frames,
        soft_failures,
    })
}

fn render_attempt(
    ctx: &StageContext,
    job: &JobHandle<'_>,
    req: &FramesRequest,
    input: &Path,
    source: FrameSource,
) -> Result<RenderedFrames, CollaboratorError> {
    let prefix = avatar_frame_prefix(&req.input, source.as_str());
    let output_prefix = ctx.store.output_path(&prefix)?;
    let sink = JobProgressSink::new(Arc::clone(job.registry), job.id, prefix, FRAMES);
    let params = FrameRenderParams {
        source,
        fps: req.playback_fps(),
        dpi: req.dpi,
        limit: req.limit,
    };
    ctx.collaborators
        .frames
        .render(input, &output_prefix, &params, &sink)
}

fn produced_frames(attempt: &Result<RenderedFrames, CollaboratorError>) -> bool {
    matches!(attempt, Ok(rendered) if !rendered.frames.is_empty())
}

// ---------------------------------------------------------------------------
// Data mode
// ---------------------------------------------------------------------------

fn run_data(
    ctx: &StageContext,
    job: &JobHandle<'_>,
    req: &FramesRequest,
    input: &Path,
) -> Result<DataFramesOutcome, StageError> {
    job.step(
        &format!("Loading {} feature table", req.source.as_str()),
        FRAMES.start,
    );
    let matrix = ctx
        .collaborators
        .features
        .load(input, req.source)
        .map_err(|e| StageError::collaborator("Feature table", e))?;

    let mut rows = matrix.rows;
    if let Some(limit) = req.limit {
        rows.truncate(limit);
    }
    let total = rows.len();
    job.update(JobPatch {
        data_columns: Some(matrix.columns.clone()),
        frames_total: Some(total),
        ..Default::default()
    });
    job.log(&format!("Computing {total} rows of {} columns", matrix.columns.len()));

    for (index, row) in rows.into_iter().enumerate() {
        let values = row
            .into_iter()
            .map(|v| if v.is_finite() { v } else { 0.0 })
            .collect();
        job.update(JobPatch {
            append_data: vec![DataItem { index, values }],
            frames_done: Some(index + 1),
            frames_total: Some(total),
            progress: Some(FRAMES.scale(index + 1, total)),
            message: Some(format!("Rows: {}/{total}", index + 1)),
            ..Default::default()
        });
    }
    job.log(&format!("Computed {total} rows"));

    Ok(DataFramesOutcome {
        mode: FrameMode::Data,
        rows: total,
        columns: matrix.columns,
    })
}
