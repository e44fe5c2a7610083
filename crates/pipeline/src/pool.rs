//! Fixed-size pool of execution slots for stage bodies.
//!
//! `submit` returns immediately. The spawned task waits for one of N slots,
//! moves the job to `running`, runs the blocking body on tokio's blocking
//! thread pool and records the outcome. Errors stop at this boundary: the
//! submitter only ever learns of them by polling.
//!
//! Cancellation only reaches jobs that have not started. Running bodies have
//! no cancellation points, so shutdown waits for them up to a deadline, marks
//! whatever is left as abandoned and fires the abandon token. Collaborators
//! holding that token (see [`ScriptRunner::with_shutdown`]) stop their
//! external work when it fires.
//!
//! [`ScriptRunner::with_shutdown`]: crate::script::ScriptRunner::with_shutdown

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use emoscope_core::error::CoreError;
use emoscope_core::types::JobId;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::registry::{CancelOutcome, JobRegistry};

/// Error recorded on jobs still running when the shutdown deadline passes.
pub const ABANDONED_REASON: &str = "abandoned: service shutting down";

/// Bounded executor for stage bodies.
pub struct WorkerPool {
    registry: Arc<JobRegistry>,
    slots: Arc<Semaphore>,
    size: usize,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    abandon: CancellationToken,
}

impl WorkerPool {
    /// A pool with `size` slots (at least one).
    pub fn new(registry: Arc<JobRegistry>, size: usize) -> Self {
        let size = size.max(1);
        Self {
            registry,
            slots: Arc::new(Semaphore::new(size)),
            size,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            abandon: CancellationToken::new(),
        }
    }

    /// Fire `token` when shutdown gives up on running jobs.
    pub fn with_abandon_token(mut self, token: CancellationToken) -> Self {
        self.abandon = token;
        self
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Submitted units that have not finished yet, queued or running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_closed(&self) -> bool {
        self.tracker.is_closed()
    }

    /// Queue `work` for job `job_id`.
    ///
    /// Must be called from within a tokio runtime. Fails with
    /// [`CoreError::Conflict`] once shutdown has begun.
    pub fn submit<F, E>(&self, job_id: JobId, work: F) -> Result<(), CoreError>
    where
        F: FnOnce() -> Result<serde_json::Value, E> + Send + 'static,
        E: Display + Send + 'static,
    {
        if self.is_closed() {
            return Err(CoreError::Conflict(
                "Worker pool is shutting down".to_string(),
            ));
        }

        let registry = Arc::clone(&self.registry);
        let slots = Arc::clone(&self.slots);
        let shutdown = self.shutdown.clone();

        self.tracker.spawn(async move {
            let permit = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    if registry.cancel_pending(job_id) == CancelOutcome::Canceled {
                        registry.append_log(job_id, "Canceled: service shutting down");
                        tracing::info!(job_id = %job_id, "Queued job canceled at shutdown");
                    }
                    return;
                }
                permit = slots.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
            };

            if !registry.try_start(job_id) {
                tracing::debug!(job_id = %job_id, "Job no longer pending, skipping");
                return;
            }
            tracing::info!(job_id = %job_id, "Job started");

            let outcome = tokio::task::spawn_blocking(work).await;
            drop(permit);

            match outcome {
                Ok(Ok(result)) => {
                    registry.append_log(job_id, "Job finished");
                    registry.complete(job_id, result);
                    tracing::info!(job_id = %job_id, "Job finished");
                }
                Ok(Err(e)) => {
                    let error = e.to_string();
                    registry.append_log(job_id, &format!("Error: {error}"));
                    registry.fail(job_id, error.as_str());
                    tracing::error!(job_id = %job_id, error = %error, "Job failed");
                }
                Err(join_error) => {
                    let error = if join_error.is_panic() {
                        "stage panicked".to_string()
                    } else {
                        format!("stage aborted: {join_error}")
                    };
                    registry.append_log(job_id, &format!("Error: {error}"));
                    registry.fail(job_id, error.as_str());
                    tracing::error!(job_id = %job_id, error = %error, "Job failed");
                }
            }
        });

        Ok(())
    }

    /// Cancel a job that has not started yet.
    pub fn cancel(&self, job_id: JobId) -> CancelOutcome {
        let outcome = self.registry.cancel_pending(job_id);
        if outcome == CancelOutcome::Canceled {
            self.registry.append_log(job_id, "Canceled before start");
            tracing::info!(job_id = %job_id, "Job canceled");
        }
        outcome
    }

    /// Stop accepting work, cancel everything still queued and wait up to
    /// `timeout` for running jobs. Returns how many running jobs had to be
    /// abandoned.
    pub async fn shutdown(&self, timeout: Duration) -> usize {
        self.tracker.close();
        self.shutdown.cancel();

        if tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .is_ok()
        {
            tracing::info!("Worker pool drained");
            return 0;
        }

        let abandoned = self.registry.abandon_running(ABANDONED_REASON);
        self.abandon.cancel();
        tracing::warn!(
            abandoned,
            timeout_secs = timeout.as_secs_f64(),
            "Worker pool drain timed out, running jobs abandoned",
        );
        abandoned
    }
}
