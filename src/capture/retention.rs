// src/capture/retention.rs
use log::info;

use crate::core::{FrameError, FrameResult};
use crate::store::{FrameId, FrameStore};

pub trait RetentionPolicy: Send {
    /// Evicts frames until the policy holds; returns the evicted ids.
    fn enforce(&mut self, store: &dyn FrameStore) -> FrameResult<Vec<FrameId>>;
}

/// Keeps `max - min + 1 <= max_count` by removing the oldest ids first.
/// Each pass walks the store's current window, so ids missing below it are
/// skipped without any bookkeeping here.
pub struct WindowRetention {
    max_count: u64,
}

impl WindowRetention {
    pub fn new(max_count: u64) -> Self {
        Self {
            max_count: max_count.max(1),
        }
    }

    pub fn max_count(&self) -> u64 {
        self.max_count
    }
}

impl RetentionPolicy for WindowRetention {
    fn enforce(&mut self, store: &dyn FrameStore) -> FrameResult<Vec<FrameId>> {
        let mut evicted = Vec::new();
        let mut vanished: Option<FrameId> = None;

        while let Some(window) = store.window()? {
            if window.span() <= self.max_count {
                break;
            }

            let oldest = window.min;
            match store.remove(oldest) {
                Ok(()) => {
                    info!("[retention] removed frame {}", oldest);
                    evicted.push(oldest);
                }
                // already gone; a second miss on the same id means the store
                // keeps reporting a frame it cannot remove
                Err(FrameError::NotFound { .. }) if vanished != Some(oldest) => {
                    vanished = Some(oldest);
                    continue;
                }
                Err(FrameError::NotFound { .. }) => break,
                Err(e) => return Err(e),
            }
        }

        Ok(evicted)
    }
}

/// One-shot form of [`WindowRetention`].
pub fn enforce(store: &dyn FrameStore, max_count: u64) -> FrameResult<Vec<FrameId>> {
    WindowRetention::new(max_count).enforce(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CaptureTime;
    use crate::store::Window;
    use crate::testing::mocks::MemFrameStore;

    fn store_with(ids: &[FrameId]) -> MemFrameStore {
        let store = MemFrameStore::new();
        let now = CaptureTime::now_utc();
        for id in ids {
            store.put(*id, b"jpeg", now).unwrap();
        }
        store
    }

    #[test]
    fn evicts_smallest_ids_until_within_bound() {
        let store = store_with(&[1, 2, 3, 4, 5, 6]);
        let evicted = enforce(&store, 4).unwrap();

        assert_eq!(evicted, vec![1, 2]);
        assert_eq!(store.current_window().unwrap(), Window::new(3, 6));
    }

    #[test]
    fn gaps_are_skipped_not_fatal() {
        let store = store_with(&[1, 4, 5, 6, 7]);
        let mut policy = WindowRetention::new(3);

        let evicted = policy.enforce(&store).unwrap();
        assert_eq!(evicted, vec![1, 4]);
        assert_eq!(store.current_window().unwrap(), Window::new(5, 7));
    }

    #[test]
    fn within_bound_or_empty_is_a_no_op() {
        let store = store_with(&[3, 4]);
        assert!(enforce(&store, 5).unwrap().is_empty());
        assert!(enforce(&MemFrameStore::new(), 5).unwrap().is_empty());
    }

    #[test]
    fn zero_capacity_keeps_newest_frame() {
        let store = store_with(&[1, 2, 3]);
        assert_eq!(enforce(&store, 0).unwrap(), vec![1, 2]);
        assert_eq!(store.current_window().unwrap(), Window::new(3, 3));
    }
}
