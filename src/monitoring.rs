use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::publish::Descriptor;

/// Process-wide counters for the capture, serve and sync paths.
#[derive(Default)]
pub struct Metrics {
    frames_captured: AtomicU64,
    capture_failures: AtomicU64,
    frames_evicted: AtomicU64,
    frames_served: AtomicU64,
    not_found: AtomicU64,
    descriptor_requests: AtomicU64,
    frames_fetched: AtomicU64,
    fetch_failures: AtomicU64,
    sync_cycles: AtomicU64,
    sync_skipped: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub frames_captured: u64,
    pub capture_failures: u64,
    pub frames_evicted: u64,
    pub frames_served: u64,
    pub not_found: u64,
    pub descriptor_requests: u64,
    pub frames_fetched: u64,
    pub fetch_failures: u64,
    pub sync_cycles: u64,
    pub sync_skipped: u64,
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub min: Option<u64>,
    pub max: Option<u64>,
    pub metrics: MetricsSnapshot,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame_captured(&self) {
        self.frames_captured.fetch_add(1, Ordering::Relaxed);
    }

    pub fn capture_failed(&self) {
        self.capture_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_evicted(&self, n: u64) {
        self.frames_evicted.fetch_add(n, Ordering::Relaxed);
    }

    pub fn frame_served(&self) {
        self.frames_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn not_found(&self) {
        self.not_found.fetch_add(1, Ordering::Relaxed);
    }

    pub fn descriptor_requested(&self) {
        self.descriptor_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_fetched(&self) {
        self.frames_fetched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fetch_failed(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sync_cycle(&self) {
        self.sync_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sync_skipped(&self) {
        self.sync_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            capture_failures: self.capture_failures.load(Ordering::Relaxed),
            frames_evicted: self.frames_evicted.load(Ordering::Relaxed),
            frames_served: self.frames_served.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            descriptor_requests: self.descriptor_requests.load(Ordering::Relaxed),
            frames_fetched: self.frames_fetched.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            sync_cycles: self.sync_cycles.load(Ordering::Relaxed),
            sync_skipped: self.sync_skipped.load(Ordering::Relaxed),
        }
    }

    pub fn status(&self, descriptor: Descriptor) -> StatusReport {
        let window = descriptor.window();
        StatusReport {
            min: window.map(|w| w.min),
            max: window.map(|w| w.max),
            metrics: self.snapshot(),
        }
    }
}
