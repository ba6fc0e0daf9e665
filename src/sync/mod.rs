//! Mirror synchronization.
//!
//! Each cycle reads the remote descriptor, pulls the frames above the local
//! max (and earlier failures still worth a retry), and optionally evicts the
//! mirror's frames that fell below the remote min. The mirror's window is
//! always recomputed from what it actually holds afterwards.

pub mod remote;
pub mod retry;

use std::sync::Arc;
use std::time::Duration;

use crate::core::{ComponentLogger, FrameError, FrameResult, LogContext, StopFlag, Worker};
use crate::monitoring::Metrics;
use crate::store::{FrameId, FrameStore, Window, exif};

pub use remote::RemoteSource;
pub use retry::RetryQueue;

#[derive(Debug, Clone)]
pub struct SyncPolicy {
    /// Evict mirror frames the server no longer has.
    pub clear_cache: bool,
    /// Upper bound on fetch attempts per cycle; the rest waits for the next one.
    pub max_fetch_per_cycle: usize,
    pub retry_capacity: usize,
    pub max_attempts: u32,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            clear_cache: false,
            max_fetch_per_cycle: 500,
            retry_capacity: 256,
            max_attempts: 5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub remote: Option<Window>,
    pub fetched: Vec<FrameId>,
    pub failed: Vec<FrameId>,
    pub evicted: Vec<FrameId>,
    /// Mirror window after the cycle.
    pub window: Option<Window>,
    /// The cycle was cut short by a stop request.
    pub interrupted: bool,
}

impl SyncReport {
    pub fn changed(&self) -> bool {
        !self.fetched.is_empty() || !self.evicted.is_empty()
    }
}

pub struct SyncClient {
    remote: Box<dyn RemoteSource>,
    mirror: Arc<dyn FrameStore>,
    policy: SyncPolicy,
    retry: RetryQueue,
    metrics: Arc<Metrics>,
}

impl SyncClient {
    pub fn new(
        remote: Box<dyn RemoteSource>,
        mirror: Arc<dyn FrameStore>,
        policy: SyncPolicy,
        metrics: Arc<Metrics>,
    ) -> Self {
        let retry = RetryQueue::new(policy.retry_capacity, policy.max_attempts);
        Self {
            remote,
            mirror,
            policy,
            retry,
            metrics,
        }
    }

    pub fn mirror(&self) -> &Arc<dyn FrameStore> {
        &self.mirror
    }

    pub fn retry_queue(&self) -> &RetryQueue {
        &self.retry
    }

    /// One full cycle. A descriptor failure returns before the mirror is touched.
    pub fn run_cycle(&mut self) -> FrameResult<SyncReport> {
        self.run_cycle_until(&StopFlag::new())
    }

    /// `run_cycle` that stops fetching once `stop` is raised. The window is
    /// still recomputed from what the mirror holds.
    pub fn run_cycle_until(&mut self, stop: &StopFlag) -> FrameResult<SyncReport> {
        let descriptor = self.remote.fetch_descriptor()?;
        let local = self.mirror.window()?;

        let mut report = SyncReport::default();
        let Some(remote) = descriptor.window() else {
            report.window = local;
            self.metrics.sync_cycle();
            return Ok(report);
        };
        report.remote = Some(remote);

        // never ask for ids the server already evicted
        let start = local.map_or(0, |w| w.max).max(remote.min.saturating_sub(1)) + 1;
        let mut budget = self.policy.max_fetch_per_cycle;

        self.retry.retain_within(remote);
        for id in self.retry.pending() {
            if id >= start || budget == 0 {
                break;
            }
            if self.mirror.contains(id) {
                self.retry.succeeded(id);
                continue;
            }
            if stop.is_raised() {
                report.interrupted = true;
                break;
            }
            budget -= 1;
            self.fetch_into_mirror(id, &mut report);
        }

        for id in start..=remote.max {
            if report.interrupted || stop.is_raised() {
                report.interrupted = true;
                break;
            }
            if self.retry.gave_up_on(id) {
                continue;
            }
            if budget == 0 {
                self.debug(&format!(
                    "fetch budget spent, {}..={} deferred",
                    id, remote.max
                ));
                break;
            }
            budget -= 1;
            self.fetch_into_mirror(id, &mut report);
        }

        if report.interrupted {
            self.debug("stop requested, cycle cut short");
        } else if self.policy.clear_cache {
            if let Some(local) = local.filter(|l| l.min < remote.min) {
                self.evict_below(local.min, remote.min, &mut report);
            }
        }

        report.window = self.mirror.window()?;
        self.metrics.sync_cycle();
        Ok(report)
    }

    /// `run_cycle` with failures logged; the mirror stays as it was.
    pub fn tick(&mut self) -> Option<SyncReport> {
        self.tick_until(&StopFlag::new())
    }

    pub fn tick_until(&mut self, stop: &StopFlag) -> Option<SyncReport> {
        match self.run_cycle_until(stop) {
            Ok(report) => {
                let summary = format!(
                    "remote {:?}, fetched {}, failed {}, evicted {}, mirror {:?}",
                    report.remote.map(|w| (w.min, w.max)),
                    report.fetched.len(),
                    report.failed.len(),
                    report.evicted.len(),
                    report.window.map(|w| (w.min, w.max)),
                );
                if report.changed() || !report.failed.is_empty() {
                    self.info(&summary);
                } else {
                    self.debug(&summary);
                }
                Some(report)
            }
            Err(e) => {
                self.metrics.sync_skipped();
                self.warn(&format!("server down, keeping last mirror: {}", e));
                None
            }
        }
    }

    fn fetch_into_mirror(&mut self, id: FrameId, report: &mut SyncReport) {
        match self.fetch_one(id) {
            Ok(()) => {
                self.retry.succeeded(id);
                self.metrics.frame_fetched();
                self.debug_frame(id, "retrieved");
                report.fetched.push(id);
            }
            Err(e) => {
                self.metrics.fetch_failed();
                let will_retry = self.retry.record_failure(id);
                self.warn_frame(
                    id,
                    &format!(
                        "fetch failed ({}): {}",
                        if will_retry { "will retry" } else { "skipped" },
                        e
                    ),
                );
                report.failed.push(id);
            }
        }
    }

    fn fetch_one(&self, id: FrameId) -> FrameResult<()> {
        let bytes = self.remote.fetch_frame(id)?;
        let timestamp =
            exif::read_capture_time(&bytes).ok_or_else(|| FrameError::InvalidImage {
                id,
                message: "no capture time".to_string(),
            })?;
        self.mirror.put(id, &bytes, timestamp)
    }

    fn evict_below(&mut self, from: FrameId, remote_min: FrameId, report: &mut SyncReport) {
        for id in from..remote_min {
            match self.mirror.remove(id) {
                Ok(()) => {
                    self.debug_frame(id, "removed");
                    report.evicted.push(id);
                }
                Err(FrameError::NotFound { .. }) => {}
                Err(e) => self.warn_frame(id, &format!("remove failed: {}", e)),
            }
        }
    }
}

impl ComponentLogger for SyncClient {
    fn log_context(&self) -> LogContext {
        LogContext::new("sync", self.remote.name())
    }
}

/// Runs a cycle immediately and then every `interval`. Stopping the worker
/// ends the running cycle after the fetch in flight.
pub fn start_sync(mut client: SyncClient, interval: Duration) -> anyhow::Result<Worker> {
    Worker::spawn_with_stop("sync", interval, move |stop| {
        client.tick_until(stop);
    })
}
