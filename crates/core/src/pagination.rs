//! Chunked delivery of data-mode records.

use serde::{Deserialize, Serialize};

use crate::job::{DataItem, Job, JobStatus};

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Upper bound on a single page.
pub const MAX_PAGE_SIZE: usize = 500;

/// Query parameters for a data-page poll.
///
/// Without `cursor` the server-side cursor is used and advanced. With
/// `cursor` the read is stateless and can be retried safely.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct DataPageQuery {
    pub page_size: Option<usize>,
    pub cursor: Option<usize>,
}

/// Resolve the requested page size against the configured default,
/// clamped to `1..=MAX_PAGE_SIZE`.
pub fn effective_page_size(requested: Option<usize>, default: usize) -> usize {
    requested.unwrap_or(default).clamp(1, MAX_PAGE_SIZE)
}

/// Half-open `[start, end)` bounds of the page beginning at `cursor`.
pub fn page_bounds(cursor: usize, available: usize, page_size: usize) -> (usize, usize) {
    let start = cursor.min(available);
    let end = start.saturating_add(page_size).min(available);
    (start, end)
}

/// One chunk of data-mode records plus enough job state to drive polling.
#[derive(Debug, Clone, Serialize)]
pub struct DataPage {
    pub start: usize,
    pub items: Vec<DataItem>,
    pub next_index: usize,
    /// Records computed so far.
    pub available: usize,
    pub status: JobStatus,
    pub progress: f64,
    pub frames_done: usize,
    pub frames_total: Option<usize>,
    /// True once the job is terminal and every record has been delivered.
    pub finished: bool,
}

impl DataPage {
    /// Slice the page starting at `cursor` out of `job`.
    pub fn from_job(job: &Job, cursor: usize, page_size: usize) -> Self {
        let available = job.data_items.len();
        let (start, end) = page_bounds(cursor, available, page_size);
        Self {
            start,
            items: job.data_items[start..end].to_vec(),
            next_index: end,
            available,
            status: job.status,
            progress: job.progress,
            frames_done: job.frames_done,
            frames_total: job.frames_total,
            finished: job.status.is_terminal() && end == available,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::FrameMode;

    fn job_with_items(n: usize) -> Job {
        let mut job = Job::new(uuid::Uuid::new_v4(), Some(FrameMode::Data));
        job.data_items = (0..n)
            .map(|index| DataItem {
                index,
                values: vec![index as f64],
            })
            .collect();
        job
    }

    #[test]
    fn bounds_within_range() {
        assert_eq!(page_bounds(0, 125, 50), (0, 50));
        assert_eq!(page_bounds(100, 125, 50), (100, 125));
    }

    #[test]
    fn bounds_past_end_are_empty() {
        assert_eq!(page_bounds(200, 125, 50), (125, 125));
    }

    #[test]
    fn page_size_defaults_and_clamps() {
        assert_eq!(effective_page_size(None, DEFAULT_PAGE_SIZE), 50);
        assert_eq!(effective_page_size(Some(0), DEFAULT_PAGE_SIZE), 1);
        assert_eq!(effective_page_size(Some(10_000), DEFAULT_PAGE_SIZE), MAX_PAGE_SIZE);
    }

    #[test]
    fn page_from_job_slices_items() {
        let job = job_with_items(7);
        let page = DataPage::from_job(&job, 5, 5);
        assert_eq!(page.start, 5);
        assert_eq!(page.next_index, 7);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].index, 5);
        assert!(!page.finished);
    }

    #[test]
    fn page_finished_only_when_terminal_and_drained() {
        let mut job = job_with_items(3);
        job.status = JobStatus::Done;
        assert!(!DataPage::from_job(&job, 0, 2).finished);
        assert!(DataPage::from_job(&job, 2, 2).finished);
    }
}
