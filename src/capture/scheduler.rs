// src/capture/scheduler.rs
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::retention::RetentionPolicy;
use super::source::FrameSource;
use crate::core::{CaptureTime, ComponentLogger, FrameResult, LogContext};
use crate::monitoring::Metrics;
use crate::publish::Publisher;
use crate::store::{FrameId, FrameStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Capturing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Captured { id: FrameId, evicted: Vec<FrameId> },
    /// Camera failed; no id consumed, retried next tick.
    SourceFailed,
    /// Store failed; no id consumed, nothing published.
    StoreFailed,
}

/// Takes one frame per interval: grab → put → retention → publish.
pub struct CaptureScheduler {
    source: Box<dyn FrameSource>,
    store: Arc<dyn FrameStore>,
    publisher: Arc<Publisher>,
    retention: Box<dyn RetentionPolicy>,
    metrics: Arc<Metrics>,
    interval: Duration,
    last_capture: Instant,
    next_id: FrameId,
    state: SchedulerState,
}

impl CaptureScheduler {
    /// Resumes numbering after the store's current max and publishes the
    /// existing window once.
    pub fn new(
        source: Box<dyn FrameSource>,
        store: Arc<dyn FrameStore>,
        publisher: Arc<Publisher>,
        retention: Box<dyn RetentionPolicy>,
        metrics: Arc<Metrics>,
        interval: Duration,
    ) -> FrameResult<Self> {
        let next_id = match store.window()? {
            Some(w) => w.max + 1,
            None => 1,
        };

        let scheduler = Self {
            source,
            store,
            publisher,
            retention,
            metrics,
            interval,
            last_capture: Instant::now(),
            next_id,
            state: SchedulerState::Idle,
        };

        scheduler.publisher.publish(scheduler.store.as_ref())?;
        scheduler.info(&format!(
            "resuming at frame {} (interval {:?})",
            next_id, interval
        ));
        Ok(scheduler)
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn next_id(&self) -> FrameId {
        self.next_id
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_capture) >= self.interval
    }

    /// Captures if the interval has elapsed since the last successful capture.
    pub fn tick(&mut self, now: Instant) -> Option<CaptureOutcome> {
        if !self.is_due(now) {
            return None;
        }
        Some(self.capture_once())
    }

    pub fn capture_once(&mut self) -> CaptureOutcome {
        self.state = SchedulerState::Capturing;
        let outcome = self.capture_inner();
        self.state = SchedulerState::Idle;
        outcome
    }

    fn capture_inner(&mut self) -> CaptureOutcome {
        let id = self.next_id;

        let payload = match self.source.grab() {
            Ok(payload) => payload,
            Err(e) => {
                self.metrics.capture_failed();
                self.warn(&format!("capture from {} failed: {}", self.source.name(), e));
                return CaptureOutcome::SourceFailed;
            }
        };

        let timestamp = CaptureTime::now_utc();
        if let Err(e) = self.store.put(id, &payload, timestamp) {
            self.metrics.capture_failed();
            self.warn_frame(id, &format!("store failed: {}", e));
            return CaptureOutcome::StoreFailed;
        }

        self.next_id = id + 1;
        self.last_capture = Instant::now();
        self.metrics.frame_captured();
        self.info(&format!("dumped frame {} at {}", id, timestamp));

        let evicted = match self.retention.enforce(self.store.as_ref()) {
            Ok(evicted) => evicted,
            Err(e) => {
                self.warn(&format!("retention failed: {}", e));
                Vec::new()
            }
        };
        self.metrics.frames_evicted(evicted.len() as u64);

        // payload is durable, the window may advance now
        if let Err(e) = self.publisher.publish(self.store.as_ref()) {
            self.warn(&format!("publish failed: {}", e));
        }

        CaptureOutcome::Captured { id, evicted }
    }
}

impl ComponentLogger for CaptureScheduler {
    fn log_context(&self) -> LogContext {
        LogContext::new("capture", self.source.name())
    }
}
