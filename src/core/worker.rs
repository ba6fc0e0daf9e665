// src/core/worker.rs - supervised background loops

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error};

use super::lock::lock_mutex;

/// Interruptible sleep. `notify_all` wakes sleepers immediately and keeps
/// later waits from blocking.
pub struct StopWait {
    stopped: Mutex<bool>,
    condvar: Condvar,
}

impl StopWait {
    pub fn new() -> Self {
        Self {
            stopped: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    pub fn wait_timeout(&self, duration: Duration) {
        let guard = lock_mutex(&self.stopped, "StopWait::wait_timeout");
        if *guard {
            return;
        }
        let _ = self
            .condvar
            .wait_timeout_while(guard, duration, |stopped| !*stopped);
    }

    pub fn notify_all(&self) {
        *lock_mutex(&self.stopped, "StopWait::notify_all") = true;
        self.condvar.notify_all();
    }
}

impl Default for StopWait {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable view of a worker's stop request, for steps that loop.
#[derive(Clone)]
pub struct StopFlag {
    running: Arc<AtomicBool>,
}

impl StopFlag {
    /// A flag nobody has raised yet.
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn raise(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        !self.running.load(Ordering::Relaxed)
    }
}

impl Default for StopFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a periodic worker thread. Dropping it stops the worker.
pub struct Worker {
    name: String,
    stop_flag: StopFlag,
    stop_wait: Arc<StopWait>,
    thread_handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Runs `step` immediately and then once per `period` until stopped.
    pub fn spawn<F>(name: &str, period: Duration, mut step: F) -> anyhow::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        Self::spawn_with_stop(name, period, move |_| step())
    }

    /// Like `spawn`, but the step sees the stop flag and can bail out of a
    /// long step early.
    pub fn spawn_with_stop<F>(name: &str, period: Duration, mut step: F) -> anyhow::Result<Self>
    where
        F: FnMut(&StopFlag) + Send + 'static,
    {
        let stop_flag = StopFlag::new();
        let stop_wait = Arc::new(StopWait::new());

        let handle = {
            let stop_flag = stop_flag.clone();
            let stop_wait = stop_wait.clone();
            thread::Builder::new()
                .name(name.to_string())
                .spawn(move || {
                    while !stop_flag.is_raised() {
                        step(&stop_flag);
                        stop_wait.wait_timeout(period);
                    }
                })?
        };

        debug!("[worker] {} started (period {:?})", name, period);

        Ok(Self {
            name: name.to_string(),
            stop_flag,
            stop_wait,
            thread_handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        !self.stop_flag.is_raised()
            && self
                .thread_handle
                .as_ref()
                .is_some_and(|handle| !handle.is_finished())
    }

    pub fn stop(&mut self) {
        self.stop_flag.raise();
        self.stop_wait.notify_all();

        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                error!("[worker] {} panicked", self.name);
            } else {
                debug!("[worker] {} stopped", self.name);
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}
