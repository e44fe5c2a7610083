//! Periodic removal of finished jobs from the in-memory registry.
//!
//! Terminal jobs stay pollable for `retention` after they finish; after that
//! they are dropped so a long-running server does not accumulate every job it
//! has ever run.

use std::sync::Arc;
use std::time::Duration;

use emoscope_pipeline::service::AnalysisService;
use tokio_util::sync::CancellationToken;

/// How often the sweep runs.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Run the retention loop until `cancel` is triggered.
pub async fn run(service: Arc<AnalysisService>, retention: Duration, cancel: CancellationToken) {
    run_every(service, retention, SWEEP_INTERVAL, cancel).await;
}

/// [`run`] with an explicit sweep interval.
pub async fn run_every(
    service: Arc<AnalysisService>,
    retention: Duration,
    every: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        retention_secs = retention.as_secs(),
        interval_secs = every.as_secs(),
        "Job retention sweeper started"
    );

    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Job retention sweeper stopping");
                break;
            }
            _ = interval.tick() => {
                let removed = service.sweep(retention);
                if removed > 0 {
                    tracing::info!(removed, "Job retention: dropped finished jobs");
                } else {
                    tracing::debug!("Job retention: nothing to drop");
                }
            }
        }
    }
}
