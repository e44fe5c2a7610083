//! Background tasks owned by the server process.
//!
//! Each submodule provides a long-running async function meant for
//! `tokio::spawn`, stopped through a [`CancellationToken`](tokio_util::sync::CancellationToken).

pub mod job_retention;
