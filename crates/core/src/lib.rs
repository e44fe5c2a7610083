//! Domain types and pure functions for the emoscope analysis service.
//!
//! Nothing in this crate performs I/O or spawns tasks; the orchestration
//! lives in `emoscope-pipeline` and the HTTP surface in `emoscope-api`.

pub mod error;
pub mod job;
pub mod naming;
pub mod pagination;
pub mod progress;
pub mod stage;
pub mod types;
