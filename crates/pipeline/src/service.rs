//! The facade the HTTP layer talks to.

use std::sync::Arc;
use std::time::Duration;

use emoscope_core::error::CoreError;
use emoscope_core::job::JobView;
use emoscope_core::pagination::{DataPage, DataPageQuery};
use emoscope_core::stage::StageRequest;
use emoscope_core::types::JobId;
use tokio_util::sync::CancellationToken;

use crate::polling::PollingController;
use crate::pool::WorkerPool;
use crate::registry::{CancelOutcome, JobRegistry};
use crate::stages::{run_stage, StageContext};

/// Submission, polling and cancellation over one registry and pool.
pub struct AnalysisService {
    ctx: StageContext,
    pool: WorkerPool,
    polling: PollingController,
}

impl AnalysisService {
    pub fn new(ctx: StageContext, worker_slots: usize, default_page_size: usize) -> Self {
        let pool = WorkerPool::new(Arc::clone(&ctx.registry), worker_slots);
        let polling = PollingController::with_page_size(Arc::clone(&ctx.registry), default_page_size);
        Self { ctx, pool, polling }
    }

    /// Fire `token` when shutdown abandons running jobs, so collaborators
    /// holding it can stop their external work.
    pub fn with_abandon_token(mut self, token: CancellationToken) -> Self {
        self.pool = self.pool.with_abandon_token(token);
        self
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.ctx.registry
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Validate `request`, create its job and queue the stage body.
    ///
    /// Only validation and shutdown are reported here; everything that
    /// happens while the job runs is observed by polling.
    pub fn submit(&self, request: StageRequest) -> Result<JobId, CoreError> {
        request.validate()?;
        if self.pool.is_closed() {
            return Err(CoreError::Conflict("Service is shutting down".to_string()));
        }

        let kind = request.kind();
        let job = self.ctx.registry.create_with_mode(request.frame_mode());
        let job_id = job.id;
        self.ctx
            .registry
            .append_log(job_id, &format!("{} job created for {}", kind, request.input()));

        let ctx = self.ctx.clone();
        let submitted = self
            .pool
            .submit(job_id, move || run_stage(&ctx, job_id, &request));
        if let Err(e) = submitted {
            // Lost a race with shutdown; the job must not linger as pending.
            self.ctx.registry.cancel_pending(job_id);
            return Err(e);
        }

        tracing::info!(job_id = %job_id, stage = %kind, "Job submitted");
        Ok(job_id)
    }

    pub fn status(&self, id: JobId) -> Result<JobView, CoreError> {
        self.polling.status(id)
    }

    pub fn data_page(&self, id: JobId, query: DataPageQuery) -> Result<DataPage, CoreError> {
        self.polling.data_page(id, query)
    }

    /// Cancel a job that has not started.
    pub fn cancel(&self, id: JobId) -> Result<(), CoreError> {
        match self.pool.cancel(id) {
            CancelOutcome::Canceled => Ok(()),
            CancelOutcome::NotCancelable(status) => Err(CoreError::Conflict(format!(
                "Job {id} is {status} and can no longer be canceled"
            ))),
            CancelOutcome::NotFound => Err(CoreError::job_not_found(id)),
        }
    }

    /// Drop finished jobs older than `retention`.
    pub fn sweep(&self, retention: Duration) -> usize {
        let retention = chrono::Duration::from_std(retention)
            .unwrap_or_else(|_| chrono::Duration::days(36_500));
        self.ctx.registry.sweep_finished(retention)
    }

    /// Stop accepting submissions and drain the pool.
    pub async fn shutdown(&self, timeout: Duration) -> usize {
        self.pool.shutdown(timeout).await
    }
}
