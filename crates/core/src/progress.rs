//! Progress sub-ranges owned by each stage.
//!
//! A caller that chains extract, plot and frames on its own sees a
//! monotonic 0..100 scale across the three jobs. The worker pool pins
//! every successful job to 100 when it finishes.

/// A slice of the 0..100 progress scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressRange {
    pub start: f64,
    pub end: f64,
}

impl ProgressRange {
    pub const fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Map `done` of `total` units linearly into this range.
    ///
    /// `done` is clamped to `total`; a zero total maps to `start`.
    pub fn scale(&self, done: usize, total: usize) -> f64 {
        if total == 0 {
            return self.start;
        }
        let fraction = done.min(total) as f64 / total as f64;
        self.start + fraction * (self.end - self.start)
    }
}

/// Feature extraction.
pub const EXTRACT: ProgressRange = ProgressRange::new(0.0, 40.0);

/// Emotions plot.
pub const PLOT: ProgressRange = ProgressRange::new(40.0, 60.0);

/// Frame rendering and per-frame data. Stops short of 100 so the final
/// jump belongs to job completion.
pub const FRAMES: ProgressRange = ProgressRange::new(60.0, 98.0);

/// Reported as soon as a stage body starts doing work.
pub const STARTED: f64 = 1.0;
