//! Job record, field-set patches and the read-side projection.
//!
//! A [`Job`] is only ever mutated through [`Job::apply`] (or the log helper),
//! which is where the lifecycle rules live: terminal states are sticky,
//! progress never runs backwards while running, stage metadata is set once,
//! and the streaming lists only grow.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::types::{JobId, Timestamp};

/// Default cap on the per-job log buffer.
pub const DEFAULT_LOG_CAPACITY: usize = 500;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Job lifecycle status.
///
/// ```text
/// pending -> running -> done | error
/// pending -> canceled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Error,
    Canceled,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
            JobStatus::Canceled => "canceled",
        }
    }

    /// `done`, `error` and `canceled` are final.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error | JobStatus::Canceled)
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Pending, JobStatus::Canceled)
                | (JobStatus::Running, JobStatus::Done)
                | (JobStatus::Running, JobStatus::Error)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two variants of the frames stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameMode {
    /// Rendered image artifacts, streamed through `frames`.
    #[default]
    Image,
    /// Numeric per-frame records, delivered through data pages.
    Data,
}

/// One computed per-frame record in data mode.
///
/// `values` line up with the job's `data_columns`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataItem {
    pub index: usize,
    pub values: Vec<f64>,
}

// ---------------------------------------------------------------------------
// Job record
// ---------------------------------------------------------------------------

/// Full in-memory state of one job.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    /// Percent complete, always within `0.0..=100.0`.
    pub progress: f64,
    /// Latest status line; overwritten on every step.
    pub message: String,
    /// Timestamped lines, oldest evicted first once the cap is exceeded.
    pub logs: VecDeque<String>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub frames_done: usize,
    pub frames_total: Option<usize>,
    pub frames: Vec<String>,
    pub frames_base_url: Option<String>,
    pub frames_fps: Option<u32>,
    pub emo_url: Option<String>,
    pub csv_name: Option<String>,
    pub csv_url: Option<String>,
    pub mode: Option<FrameMode>,
    pub data_columns: Option<Vec<String>>,
    /// Server-side read cursor into `data_items`.
    pub data_next_index: usize,
    pub data_items: Vec<DataItem>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
}

impl Job {
    /// A fresh `pending` job with zeroed fields.
    pub fn new(id: JobId, mode: Option<FrameMode>) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            progress: 0.0,
            message: String::new(),
            logs: VecDeque::new(),
            result: None,
            error: None,
            frames_done: 0,
            frames_total: None,
            frames: Vec::new(),
            frames_base_url: None,
            frames_fps: None,
            emo_url: None,
            csv_name: None,
            csv_url: None,
            mode,
            data_columns: None,
            data_next_index: 0,
            data_items: Vec::new(),
            created_at: chrono::Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Append a log line, evicting the oldest entries beyond `capacity`.
    pub fn push_log(&mut self, line: String, capacity: usize) {
        self.logs.push_back(line);
        while self.logs.len() > capacity {
            self.logs.pop_front();
        }
    }

    /// Apply a field-set.
    ///
    /// Once terminal, only `message` is still accepted. Disallowed status
    /// transitions are dropped along with the `result`/`error` they carry.
    pub fn apply(&mut self, patch: JobPatch) {
        if let Some(message) = patch.message {
            self.message = message;
        }
        if self.status.is_terminal() {
            return;
        }

        let transition = patch
            .status
            .filter(|next| self.status.can_transition_to(*next));

        if let Some(progress) = patch.progress {
            let progress = clamp_percent(progress);
            self.progress = if self.status == JobStatus::Running {
                self.progress.max(progress)
            } else {
                progress
            };
        }
        if let Some(done) = patch.frames_done {
            self.frames_done = done;
        }
        if let Some(total) = patch.frames_total {
            self.frames_total = Some(total);
        }

        set_once(&mut self.frames_base_url, patch.frames_base_url);
        set_once(&mut self.frames_fps, patch.frames_fps);
        set_once(&mut self.emo_url, patch.emo_url);
        set_once(&mut self.csv_name, patch.csv_name);
        set_once(&mut self.csv_url, patch.csv_url);
        set_once(&mut self.data_columns, patch.data_columns);

        if self.status == JobStatus::Running {
            for name in patch.append_frames {
                if !self.frames.contains(&name) {
                    self.frames.push(name);
                }
            }
            self.data_items.extend(patch.append_data);
        }

        if let Some(next) = transition {
            let now = chrono::Utc::now();
            match next {
                JobStatus::Running => self.started_at = Some(now),
                JobStatus::Done => {
                    self.result = Some(patch.result.unwrap_or(serde_json::Value::Null));
                    self.progress = 100.0;
                }
                JobStatus::Error => {
                    self.error = Some(
                        patch
                            .error
                            .unwrap_or_else(|| "job failed without a description".to_string()),
                    );
                }
                JobStatus::Pending | JobStatus::Canceled => {}
            }
            if next.is_terminal() {
                self.finished_at = Some(now);
            }
            self.status = next;
        }
    }

    /// The read-side projection of this job.
    pub fn view(&self) -> JobView {
        JobView::from(self)
    }
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

fn set_once<T>(slot: &mut Option<T>, value: Option<T>) {
    if slot.is_none() {
        *slot = value;
    }
}

// ---------------------------------------------------------------------------
// Patch
// ---------------------------------------------------------------------------

/// A set of field assignments applied to a job under one lock hold.
///
/// Build with struct-update syntax:
///
/// ```ignore
/// JobPatch { progress: Some(40.0), message: Some("Prediction finished".into()), ..Default::default() }
/// ```
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub progress: Option<f64>,
    pub message: Option<String>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub frames_done: Option<usize>,
    pub frames_total: Option<usize>,
    pub append_frames: Vec<String>,
    pub frames_base_url: Option<String>,
    pub frames_fps: Option<u32>,
    pub emo_url: Option<String>,
    pub csv_name: Option<String>,
    pub csv_url: Option<String>,
    pub data_columns: Option<Vec<String>>,
    pub append_data: Vec<DataItem>,
}

impl JobPatch {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn progress(progress: f64) -> Self {
        Self {
            progress: Some(progress),
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

/// What a poller sees. Data-mode records and the server cursor are
/// delivered through data pages instead.
#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    pub id: JobId,
    pub status: JobStatus,
    pub progress: f64,
    pub message: String,
    pub logs: Vec<String>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub frames_done: usize,
    pub frames_total: Option<usize>,
    pub frames: Vec<String>,
    pub frames_base_url: Option<String>,
    pub frames_fps: Option<u32>,
    pub emo_url: Option<String>,
    pub csv_name: Option<String>,
    pub csv_url: Option<String>,
    pub mode: Option<FrameMode>,
    pub data_columns: Option<Vec<String>>,
    pub data_available: usize,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            status: job.status,
            progress: job.progress,
            message: job.message.clone(),
            logs: job.logs.iter().cloned().collect(),
            result: if job.status == JobStatus::Done {
                job.result.clone()
            } else {
                None
            },
            error: job.error.clone(),
            frames_done: job.frames_done,
            frames_total: job.frames_total,
            frames: job.frames.clone(),
            frames_base_url: job.frames_base_url.clone(),
            frames_fps: job.frames_fps,
            emo_url: job.emo_url.clone(),
            csv_name: job.csv_name.clone(),
            csv_url: job.csv_url.clone(),
            mode: job.mode,
            data_columns: job.data_columns.clone(),
            data_available: job.data_items.len(),
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
