//! Job orchestration for emoscope.
//!
//! A [`registry::JobRegistry`] holds every job's state behind one lock. A
//! [`pool::WorkerPool`] runs stage bodies on a fixed number of slots, the
//! [`stages`] translate collaborator calls into job updates, and the
//! [`polling::PollingController`] projects state back out, including paged
//! delivery of data-mode records. [`service::AnalysisService`] ties these
//! together for the HTTP layer.

pub mod collaborators;
pub mod polling;
pub mod pool;
pub mod registry;
pub mod script;
pub mod service;
pub mod sink;
pub mod stages;
pub mod store;
