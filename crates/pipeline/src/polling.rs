//! Read side of the job registry.

use std::sync::Arc;

use emoscope_core::error::CoreError;
use emoscope_core::job::JobView;
use emoscope_core::pagination::{effective_page_size, DataPage, DataPageQuery, DEFAULT_PAGE_SIZE};
use emoscope_core::types::JobId;

use crate::registry::JobRegistry;

/// Projects job state to pollers.
#[derive(Clone)]
pub struct PollingController {
    registry: Arc<JobRegistry>,
    default_page_size: usize,
}

impl PollingController {
    pub fn new(registry: Arc<JobRegistry>) -> Self {
        Self::with_page_size(registry, DEFAULT_PAGE_SIZE)
    }

    /// A controller that serves `default_page_size` records per data page
    /// unless the caller asks otherwise.
    pub fn with_page_size(registry: Arc<JobRegistry>, default_page_size: usize) -> Self {
        Self {
            registry,
            default_page_size: effective_page_size(Some(default_page_size), DEFAULT_PAGE_SIZE),
        }
    }

    pub fn default_page_size(&self) -> usize {
        self.default_page_size
    }

    /// Current projection of a job.
    pub fn status(&self, id: JobId) -> Result<JobView, CoreError> {
        self.registry
            .get(id)
            .map(|job| job.view())
            .ok_or_else(|| CoreError::job_not_found(id))
    }

    /// Next chunk of data-mode records.
    ///
    /// Without a cursor the job's stored cursor is read and advanced, so
    /// successive calls walk the records exactly once. With a cursor the
    /// read is stateless and may be repeated.
    pub fn data_page(&self, id: JobId, query: DataPageQuery) -> Result<DataPage, CoreError> {
        let page_size = effective_page_size(query.page_size, self.default_page_size);
        match query.cursor {
            None => self.registry.take_data_page(id, page_size),
            Some(cursor) => self.registry.data_page_at(id, cursor, page_size),
        }
    }
}
