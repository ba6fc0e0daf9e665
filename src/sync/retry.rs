// src/sync/retry.rs - ids that failed to fetch and are worth another try

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, warn};

use crate::store::{FrameId, Window};

pub struct RetryQueue {
    attempts: BTreeMap<FrameId, u32>,
    /// Ids that used up their attempts; growth skips them too.
    abandoned: BTreeSet<FrameId>,
    capacity: usize,
    max_attempts: u32,
}

impl RetryQueue {
    pub fn new(capacity: usize, max_attempts: u32) -> Self {
        Self {
            attempts: BTreeMap::new(),
            abandoned: BTreeSet::new(),
            capacity,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn contains(&self, id: FrameId) -> bool {
        self.attempts.contains_key(&id)
    }

    pub fn gave_up_on(&self, id: FrameId) -> bool {
        self.abandoned.contains(&id)
    }

    /// Records a failed attempt. Returns false once `id` is given up on.
    pub fn record_failure(&mut self, id: FrameId) -> bool {
        let attempts = self.attempts.entry(id).or_insert(0);
        *attempts += 1;

        if *attempts >= self.max_attempts {
            self.attempts.remove(&id);
            self.abandoned.insert(id);
            while self.abandoned.len() > self.capacity {
                self.abandoned.pop_first();
            }
            warn!(
                "[sync] giving up on frame {} after {} attempts",
                id, self.max_attempts
            );
            return false;
        }

        // overflow drops the oldest id, the first to fall out of the window
        while self.attempts.len() > self.capacity {
            if let Some((dropped, _)) = self.attempts.pop_first() {
                debug!("[sync] retry queue full, dropping frame {}", dropped);
                if dropped == id {
                    return false;
                }
            }
        }
        true
    }

    pub fn succeeded(&mut self, id: FrameId) {
        self.attempts.remove(&id);
        self.abandoned.remove(&id);
    }

    /// Forgets ids outside `window`; the server no longer has them.
    pub fn retain_within(&mut self, window: Window) {
        self.attempts.retain(|id, _| window.contains(*id));
        self.abandoned.retain(|id| window.contains(*id));
    }

    pub fn pending(&self) -> Vec<FrameId> {
        self.attempts.keys().copied().collect()
    }
}
