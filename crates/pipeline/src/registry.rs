//! Thread-safe store of job state.
//!
//! Every read and write goes through a single mutex, held only for field
//! assignment. Callers receive owned snapshots; nothing outside this module
//! can alias a live [`Job`].

use std::collections::HashMap;

use chrono::Utc;
use emoscope_core::error::CoreError;
use emoscope_core::job::{FrameMode, Job, JobPatch, JobStatus, DEFAULT_LOG_CAPACITY};
use emoscope_core::pagination::DataPage;
use emoscope_core::types::JobId;
use parking_lot::Mutex;

/// Outcome of a cancellation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The job had not started and is now `canceled`.
    Canceled,
    /// The job already left `pending`; cancellation is not honored.
    NotCancelable(JobStatus),
    NotFound,
}

/// In-memory job store.
pub struct JobRegistry {
    jobs: Mutex<HashMap<JobId, Job>>,
    log_capacity: usize,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::with_log_capacity(DEFAULT_LOG_CAPACITY)
    }

    /// A registry whose jobs keep at most `log_capacity` log lines.
    pub fn with_log_capacity(log_capacity: usize) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            log_capacity: log_capacity.max(1),
        }
    }

    // -- create / read --------------------------------------------------------

    /// Insert a fresh `pending` job.
    pub fn create(&self) -> Job {
        self.create_with_mode(None)
    }

    /// Insert a fresh `pending` job carrying a frames-stage mode.
    pub fn create_with_mode(&self, mode: Option<FrameMode>) -> Job {
        let mut jobs = self.jobs.lock();
        let mut id = JobId::new_v4();
        while jobs.contains_key(&id) {
            id = JobId::new_v4();
        }
        let job = Job::new(id, mode);
        jobs.insert(id, job.clone());
        job
    }

    /// Snapshot of a job, or `None` if the id is unknown.
    pub fn get(&self, id: JobId) -> Option<Job> {
        self.jobs.lock().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }

    // -- writes ---------------------------------------------------------------

    /// Apply a field-set atomically. Unknown ids are ignored and return
    /// `false`.
    pub fn update(&self, id: JobId, patch: JobPatch) -> bool {
        match self.jobs.lock().get_mut(&id) {
            Some(job) => {
                job.apply(patch);
                true
            }
            None => false,
        }
    }

    /// Append a `[HH:MM:SS] message` line. Unknown ids are ignored.
    pub fn append_log(&self, id: JobId, message: &str) {
        let line = format!("[{}] {message}", Utc::now().format("%H:%M:%S"));
        if let Some(job) = self.jobs.lock().get_mut(&id) {
            job.push_log(line, self.log_capacity);
        }
    }

    /// Move a job from `pending` to `running`. Returns `false` if the job is
    /// unknown or no longer pending (e.g. canceled while queued).
    pub fn try_start(&self, id: JobId) -> bool {
        let mut jobs = self.jobs.lock();
        match jobs.get_mut(&id) {
            Some(job) if job.status == JobStatus::Pending => {
                job.apply(JobPatch {
                    status: Some(JobStatus::Running),
                    ..Default::default()
                });
                true
            }
            _ => false,
        }
    }

    /// Finalize a running job as `done` with its result.
    pub fn complete(&self, id: JobId, result: serde_json::Value) -> bool {
        self.update(
            id,
            JobPatch {
                status: Some(JobStatus::Done),
                result: Some(result),
                progress: Some(100.0),
                ..Default::default()
            },
        )
    }

    /// Finalize a running job as `error`.
    pub fn fail(&self, id: JobId, error: impl Into<String>) -> bool {
        self.update(
            id,
            JobPatch {
                status: Some(JobStatus::Error),
                error: Some(error.into()),
                ..Default::default()
            },
        )
    }

    /// Cancel a job that has not started yet.
    pub fn cancel_pending(&self, id: JobId) -> CancelOutcome {
        let mut jobs = self.jobs.lock();
        match jobs.get_mut(&id) {
            None => CancelOutcome::NotFound,
            Some(job) if job.status == JobStatus::Pending => {
                job.apply(JobPatch {
                    status: Some(JobStatus::Canceled),
                    ..Default::default()
                });
                CancelOutcome::Canceled
            }
            Some(job) => CancelOutcome::NotCancelable(job.status),
        }
    }

    /// Mark every running job as failed with `reason`. Returns how many
    /// jobs were affected.
    pub fn abandon_running(&self, reason: &str) -> usize {
        let mut jobs = self.jobs.lock();
        let mut abandoned = 0;
        for job in jobs.values_mut() {
            if job.status == JobStatus::Running {
                job.apply(JobPatch {
                    status: Some(JobStatus::Error),
                    error: Some(reason.to_string()),
                    ..Default::default()
                });
                abandoned += 1;
            }
        }
        abandoned
    }

    // -- data pagination ------------------------------------------------------

    /// Read the page at the stored cursor and advance the cursor past it.
    pub fn take_data_page(&self, id: JobId, page_size: usize) -> Result<DataPage, CoreError> {
        let mut jobs = self.jobs.lock();
        let job = jobs.get_mut(&id).ok_or_else(|| CoreError::job_not_found(id))?;
        ensure_data_mode(job)?;
        let page = DataPage::from_job(job, job.data_next_index, page_size);
        job.data_next_index = page.next_index;
        Ok(page)
    }

    /// Read the page at a caller-supplied cursor without touching the
    /// stored cursor.
    pub fn data_page_at(
        &self,
        id: JobId,
        cursor: usize,
        page_size: usize,
    ) -> Result<DataPage, CoreError> {
        let jobs = self.jobs.lock();
        let job = jobs.get(&id).ok_or_else(|| CoreError::job_not_found(id))?;
        ensure_data_mode(job)?;
        Ok(DataPage::from_job(job, cursor, page_size))
    }

    // -- retention ------------------------------------------------------------

    /// Drop terminal jobs that finished more than `older_than` ago.
    pub fn sweep_finished(&self, older_than: chrono::Duration) -> usize {
        let cutoff = Utc::now() - older_than;
        let mut jobs = self.jobs.lock();
        let before = jobs.len();
        jobs.retain(|_, job| {
            !(job.status.is_terminal() && job.finished_at.is_some_and(|at| at < cutoff))
        });
        before - jobs.len()
    }
}

fn ensure_data_mode(job: &Job) -> Result<(), CoreError> {
    if job.mode == Some(FrameMode::Data) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Job {} is not a data-mode frames job",
            job.id
        )))
    }
}
