// src/capture/mod.rs

pub mod retention;
pub mod scheduler;
pub mod source;

use std::time::{Duration, Instant};

use crate::core::Worker;

pub use retention::{RetentionPolicy, WindowRetention, enforce};
pub use scheduler::{CaptureOutcome, CaptureScheduler, SchedulerState};
pub use source::{FfmpegSource, FrameSource, HttpSnapshotSource};

/// Polls the scheduler on its own thread. A failed capture is retried on the
/// next poll; successful captures are spaced by the scheduler's interval.
pub fn start_capture(mut scheduler: CaptureScheduler, poll: Duration) -> anyhow::Result<Worker> {
    Worker::spawn("capture", poll, move || {
        scheduler.tick(Instant::now());
    })
}
