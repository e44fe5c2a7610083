//! The progress callback handed to collaborators.

use std::path::Path;
use std::sync::Arc;

use emoscope_core::job::JobPatch;
use emoscope_core::naming::frame_artifact_name;
use emoscope_core::progress::ProgressRange;
use emoscope_core::types::JobId;

use crate::registry::JobRegistry;

/// Incremental completion reports from a collaborator.
///
/// Called synchronously on the collaborator's own thread, once per produced
/// unit with `done` starting at 1. `artifact` names the unit that just
/// became available when the collaborator knows it. Implementations must
/// not panic back into the caller.
pub trait ProgressSink: Send + Sync {
    fn report(&self, done: usize, total: usize, artifact: Option<&str>);
}

/// A sink bound to one frames job.
///
/// Each report becomes a single registry update covering the frame
/// counters, progress, status message and the newly available frame.
pub struct JobProgressSink {
    registry: Arc<JobRegistry>,
    job_id: JobId,
    frame_prefix: String,
    range: ProgressRange,
}

impl JobProgressSink {
    /// `frame_prefix` is the file-name prefix the renderer writes under;
    /// it is used to name frames the renderer does not name itself.
    pub fn new(
        registry: Arc<JobRegistry>,
        job_id: JobId,
        frame_prefix: impl Into<String>,
        range: ProgressRange,
    ) -> Self {
        Self {
            registry,
            job_id,
            frame_prefix: frame_prefix.into(),
            range,
        }
    }
}

impl ProgressSink for JobProgressSink {
    fn report(&self, done: usize, total: usize, artifact: Option<&str>) {
        if total == 0 || done == 0 {
            return;
        }
        let done = done.min(total);
        let name = match artifact {
            Some(artifact) => file_name(artifact).to_string(),
            None => frame_artifact_name(&self.frame_prefix, done - 1),
        };

        self.registry.update(
            self.job_id,
            JobPatch {
                frames_done: Some(done),
                frames_total: Some(total),
                progress: Some(self.range.scale(done, total)),
                message: Some(format!("Frames: {done}/{total}")),
                append_frames: vec![name],
                ..Default::default()
            },
        );
    }
}

fn file_name(artifact: &str) -> &str {
    Path::new(artifact)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(artifact)
}

#[cfg(test)]
mod tests {
    use emoscope_core::progress::FRAMES;

    use super::*;

    fn running(registry: &Arc<JobRegistry>) -> JobId {
        let id = registry.create().id;
        registry.try_start(id);
        id
    }

    #[test]
    fn report_maps_counters_and_progress() {
        let registry = Arc::new(JobRegistry::new());
        let id = running(&registry);
        let sink = JobProgressSink::new(Arc::clone(&registry), id, "clip_avatar_hmm", FRAMES);

        sink.report(1, 4, None);
        sink.report(2, 4, None);

        let job = registry.get(id).unwrap();
        assert_eq!(job.frames_done, 2);
        assert_eq!(job.frames_total, Some(4));
        assert!((job.progress - 79.0).abs() < 1e-9);
        assert_eq!(job.message, "Frames: 2/4");
        assert_eq!(
            job.frames,
            vec!["clip_avatar_hmm_0000.png", "clip_avatar_hmm_0001.png"]
        );
    }

    #[test]
    fn explicit_artifact_name_wins() {
        let registry = Arc::new(JobRegistry::new());
        let id = running(&registry);
        let sink = JobProgressSink::new(Arc::clone(&registry), id, "unused", FRAMES);

        sink.report(1, 1, Some("/data/artifacts/custom_frame.png"));

        assert_eq!(registry.get(id).unwrap().frames, vec!["custom_frame.png"]);
    }

    #[test]
    fn degenerate_reports_are_ignored() {
        let registry = Arc::new(JobRegistry::new());
        let id = running(&registry);
        let sink = JobProgressSink::new(Arc::clone(&registry), id, "p", FRAMES);

        sink.report(0, 10, None);
        sink.report(3, 0, None);

        let job = registry.get(id).unwrap();
        assert_eq!(job.frames_done, 0);
        assert!(job.frames.is_empty());
    }

    #[test]
    fn report_for_vanished_job_does_not_panic() {
        let registry = Arc::new(JobRegistry::new());
        let sink = JobProgressSink::new(registry, JobId::new_v4(), "p", FRAMES);
        sink.report(1, 1, None);
    }
}
