//! Durable frame storage.
//!
//! A store maps a frame id to its JPEG bytes and capture time. The window of a
//! store is never cached: `current_window` is recomputed from the backing
//! storage on every call, so capture, retention and the HTTP responder can
//! work on the same directory without sharing in-memory state.

pub mod exif;
pub mod fs;

use crate::core::{CaptureTime, FrameError, FrameResult};

pub use fs::FsFrameStore;

pub type FrameId = u64;

/// One captured image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub id: FrameId,
    pub payload: Vec<u8>,
    pub timestamp: CaptureTime,
}

/// Inclusive `[min, max]` range of live frame ids. Ids inside may be missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Window {
    pub min: FrameId,
    pub max: FrameId,
}

impl Window {
    pub fn new(min: FrameId, max: FrameId) -> Self {
        debug_assert!(min <= max, "window min {} > max {}", min, max);
        Self { min, max }
    }

    /// Folds ids into their extremal pair; `None` for no ids.
    pub fn from_ids(ids: impl IntoIterator<Item = FrameId>) -> Option<Self> {
        ids.into_iter().fold(None, |acc, id| match acc {
            None => Some(Self { min: id, max: id }),
            Some(w) => Some(Self {
                min: w.min.min(id),
                max: w.max.max(id),
            }),
        })
    }

    /// Nominal number of frames, gaps included.
    pub fn span(&self) -> u64 {
        self.max - self.min + 1
    }

    pub fn contains(&self, id: FrameId) -> bool {
        (self.min..=self.max).contains(&id)
    }
}

/// `{prefix}{id}{suffix}` file naming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameNaming {
    pub prefix: String,
    pub suffix: String,
}

impl FrameNaming {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    pub fn file_name(&self, id: FrameId) -> String {
        format!("{}{}{}", self.prefix, id, self.suffix)
    }

    pub fn parse_id(&self, name: &str) -> Option<FrameId> {
        let digits = name
            .strip_prefix(self.prefix.as_str())?
            .strip_suffix(self.suffix.as_str())?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }
}

impl Default for FrameNaming {
    fn default() -> Self {
        Self::new("frame", ".jpg")
    }
}

pub trait FrameStore: Send + Sync {
    /// Inserts or overwrites frame `id`. Durable once this returns.
    fn put(&self, id: FrameId, payload: &[u8], timestamp: CaptureTime) -> FrameResult<()>;

    fn get(&self, id: FrameId) -> FrameResult<Frame>;

    fn remove(&self, id: FrameId) -> FrameResult<()>;

    fn contains(&self, id: FrameId) -> bool;

    /// Fresh `[min, max]` of the stored ids, `FrameError::Empty` if none.
    fn current_window(&self) -> FrameResult<Window>;

    /// `current_window` with `Empty` mapped to `None`.
    fn window(&self) -> FrameResult<Option<Window>> {
        match self.current_window() {
            Ok(w) => Ok(Some(w)),
            Err(FrameError::Empty) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_from_ids_is_extremal_pair() {
        assert_eq!(Window::from_ids([7, 3, 9, 4]), Some(Window::new(3, 9)));
        assert_eq!(Window::from_ids([5]), Some(Window::new(5, 5)));
        assert_eq!(Window::from_ids(std::iter::empty()), None);
    }

    #[test]
    fn window_span_counts_gaps() {
        let w = Window::new(5, 10);
        assert_eq!(w.span(), 6);
        assert!(w.contains(5) && w.contains(10));
        assert!(!w.contains(4) && !w.contains(11));
    }

    #[test]
    fn naming_round_trips_and_rejects_foreign_files() {
        let naming = FrameNaming::default();
        assert_eq!(naming.file_name(12), "frame12.jpg");
        assert_eq!(naming.parse_id("frame12.jpg"), Some(12));
        assert_eq!(naming.parse_id("index.txt"), None);
        assert_eq!(naming.parse_id("frame.jpg"), None);
        assert_eq!(naming.parse_id("frame1a.jpg"), None);
        assert_eq!(naming.parse_id(".frame12.jpg.part"), None);
        assert_eq!(naming.parse_id("frame+1.jpg"), None);
    }

    #[test]
    fn naming_with_custom_prefix() {
        let naming = FrameNaming::new("IMG", ".jpeg");
        assert_eq!(naming.file_name(3), "IMG3.jpeg");
        assert_eq!(naming.parse_id("IMG3.jpeg"), Some(3));
        assert_eq!(naming.parse_id("frame3.jpg"), None);
    }
}
