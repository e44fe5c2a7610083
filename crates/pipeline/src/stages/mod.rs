//! Stage workers.
//!
//! Each stage is a blocking function over one job id and its typed request.
//! It resolves its input through the [`ArtifactStore`], calls out to a
//! collaborator, and reports progress and outputs into the registry. The
//! worker pool owns the `running`/`done`/`error` transitions; a stage only
//! returns its outcome or a [`StageError`].
//!
//! Optional outputs never fail a job. Their failures are collected as
//! [`SoftFailure`] values in the stage outcome.

mod extract;
mod frames;
mod plot;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use emoscope_core::job::JobPatch;
use emoscope_core::stage::{StageKind, StageRequest};
use emoscope_core::types::JobId;
use serde::Serialize;

use crate::collaborators::{CollaboratorError, Collaborators};
use crate::registry::JobRegistry;
use crate::store::ArtifactStore;

pub use extract::ExtractOutcome;
pub use frames::{DataFramesOutcome, ImageFramesOutcome};
pub use plot::PlotOutcome;

/// Error type for stage bodies. Its `Display` is what lands in `Job.error`.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("Input not found: {0}")]
    InputNotFound(String),

    #[error("{step} failed: {source}")]
    Collaborator {
        step: &'static str,
        #[source]
        source: CollaboratorError,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StageError {
    /// Wrap a required collaborator's failure. A collaborator that could not
    /// find its input is reported the same way as a missing stage input.
    pub fn collaborator(step: &'static str, source: CollaboratorError) -> Self {
        match source {
            CollaboratorError::MissingInput(what) => StageError::InputNotFound(what),
            source => StageError::Collaborator { step, source },
        }
    }
}

/// An optional step that failed without failing the job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SoftFailure {
    pub step: &'static str,
    pub reason: String,
}

/// Everything a stage body needs besides its request.
#[derive(Clone)]
pub struct StageContext {
    pub registry: Arc<JobRegistry>,
    pub store: Arc<dyn ArtifactStore>,
    pub collaborators: Collaborators,
}

impl StageContext {
    pub fn new(
        registry: Arc<JobRegistry>,
        store: Arc<dyn ArtifactStore>,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            registry,
            store,
            collaborators,
        }
    }

    fn locate_input(&self, reference: &str) -> Result<PathBuf, StageError> {
        self.store
            .locate(reference)
            .ok_or_else(|| StageError::InputNotFound(reference.to_string()))
    }
}

/// Run the stage body for `request` against job `job_id`, returning the
/// value stored as the job's `result`.
pub fn run_stage(
    ctx: &StageContext,
    job_id: JobId,
    request: &StageRequest,
) -> Result<serde_json::Value, StageError> {
    let job = JobHandle {
        registry: &ctx.registry,
        id: job_id,
        stage: request.kind(),
    };
    match request {
        StageRequest::Extract(req) => encode(extract::run(ctx, &job, req)?),
        StageRequest::Plot(req) => encode(plot::run(ctx, &job, req)?),
        StageRequest::Frames(req) => frames::run(ctx, &job, req),
    }
}

fn encode<T: Serialize>(outcome: T) -> Result<serde_json::Value, StageError> {
    serde_json::to_value(outcome).map_err(|e| StageError::Internal(e.to_string()))
}

/// File name of a collaborator-returned path, or `fallback` if it has none.
fn artifact_name(path: &Path, fallback: &str) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(fallback)
        .to_string()
}

// ---------------------------------------------------------------------------
// Job handle
// ---------------------------------------------------------------------------

/// The registry as seen from inside one stage body.
struct JobHandle<'a> {
    registry: &'a Arc<JobRegistry>,
    id: JobId,
    stage: StageKind,
}

impl JobHandle<'_> {
    /// Set the status line and append it to the job log.
    fn log(&self, message: &str) {
        self.registry.update(self.id, JobPatch::message(message));
        self.registry.append_log(self.id, message);
        tracing::debug!(job_id = %self.id, stage = %self.stage, "{message}");
    }

    /// Like [`JobHandle::log`], also moving progress to `progress`.
    fn step(&self, message: &str, progress: f64) {
        self.registry.update(
            self.id,
            JobPatch {
                progress: Some(progress),
                message: Some(message.to_string()),
                ..Default::default()
            },
        );
        self.registry.append_log(self.id, message);
        tracing::debug!(job_id = %self.id, stage = %self.stage, progress, "{message}");
    }

    fn update(&self, patch: JobPatch) {
        self.registry.update(self.id, patch);
    }

    fn soft_failure(&self, step: &'static str, reason: String) -> SoftFailure {
        let line = format!("{step} failed: {reason}");
        self.registry.update(self.id, JobPatch::message(line.as_str()));
        self.registry.append_log(self.id, &line);
        tracing::warn!(job_id = %self.id, stage = %self.stage, step, reason = %reason, "Optional output skipped");
        SoftFailure { step, reason }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn collaborator_missing_input_is_input_not_found() {
        let err = StageError::collaborator(
            "Feature extraction",
            CollaboratorError::MissingInput("clip.mp4".into()),
        );
        assert_matches!(err, StageError::InputNotFound(ref what) if what == "clip.mp4");
        assert_eq!(err.to_string(), "Input not found: clip.mp4");
    }

    #[test]
    fn collaborator_error_message_names_the_step() {
        let err = StageError::collaborator(
            "Feature extraction",
            CollaboratorError::MissingModel("face_landmarker.task".into()),
        );
        assert_eq!(
            err.to_string(),
            "Feature extraction failed: model artifacts not found: face_landmarker.task"
        );
    }

    #[test]
    fn artifact_name_prefers_returned_file_name() {
        assert_eq!(artifact_name(Path::new("/data/out/a.csv"), "b.csv"), "a.csv");
        assert_eq!(artifact_name(Path::new("/"), "b.csv"), "b.csv");
    }
}
