// src/publish.rs - window descriptor (`index.txt`)

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{debug, info, warn};

use crate::core::{FrameError, FrameResult, lock_mutex};
use crate::store::fs::sync_parent_dir;
use crate::store::{FrameStore, Window};

pub const DESCRIPTOR_FILE: &str = "index.txt";

/// Published `(min, max)` pair. `Empty` goes over the wire as `0\n0\n`;
/// frame ids start at 1, so the sentinel never collides with a real window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Descriptor {
    Empty,
    Window(Window),
}

impl Descriptor {
    pub fn from_store(store: &dyn FrameStore) -> FrameResult<Self> {
        Ok(match store.window()? {
            Some(w) => Self::Window(w),
            None => Self::Empty,
        })
    }

    pub fn window(&self) -> Option<Window> {
        match self {
            Self::Empty => None,
            Self::Window(w) => Some(*w),
        }
    }

    pub fn encode(&self) -> String {
        let (min, max) = match self {
            Self::Empty => (0, 0),
            Self::Window(w) => (w.min, w.max),
        };
        format!("{}\n{}\n", min, max)
    }

    pub fn parse(text: &str) -> FrameResult<Self> {
        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());

        let mut next = |name: &str| -> FrameResult<u64> {
            let line = lines
                .next()
                .ok_or_else(|| FrameError::malformed(format!("missing {} line", name)))?;
            line.parse::<u64>()
                .map_err(|_| FrameError::malformed(format!("{} is not an integer: {:?}", name, line)))
        };

        let min = next("min")?;
        let max = next("max")?;
        if lines.next().is_some() {
            return Err(FrameError::malformed("trailing data after max"));
        }

        match (min, max) {
            (0, 0) => Ok(Self::Empty),
            (0, _) => Err(FrameError::malformed("min is 0 for a non-empty window")),
            (min, max) if min > max => Err(FrameError::malformed(format!(
                "min {} > max {}",
                min, max
            ))),
            (min, max) => Ok(Self::Window(Window::new(min, max))),
        }
    }
}

/// Advertises a store's window. A frame must be durable in the store before
/// `publish` runs; the descriptor is only ever recomputed from what the store
/// holds, so it can never name a frame that is still being written.
pub struct Publisher {
    path: PathBuf,
    current: Mutex<Descriptor>,
}

impl Publisher {
    /// Loads a previously published descriptor from `path` if there is one.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let current = match fs::read_to_string(&path) {
            Ok(text) => Descriptor::parse(&text).unwrap_or_else(|e| {
                warn!("[publish] ignoring {}: {}", path.display(), e);
                Descriptor::Empty
            }),
            Err(_) => Descriptor::Empty,
        };

        Self {
            path,
            current: Mutex::new(current),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The store's window right now, unpublished.
    pub fn descriptor(&self, store: &dyn FrameStore) -> FrameResult<Descriptor> {
        Descriptor::from_store(store)
    }

    /// Last descriptor handed out by `publish`.
    pub fn published(&self) -> Descriptor {
        *lock_mutex(&self.current, "Publisher::published")
    }

    pub fn publish(&self, store: &dyn FrameStore) -> FrameResult<Descriptor> {
        let descriptor = self.descriptor(store)?;

        let mut current = lock_mutex(&self.current, "Publisher::publish");
        if *current == descriptor && self.path.exists() {
            return Ok(descriptor);
        }

        self.write_atomic(&descriptor.encode())?;
        *current = descriptor;

        match descriptor {
            Descriptor::Window(w) => debug!("[publish] window {}..={}", w.min, w.max),
            Descriptor::Empty => info!("[publish] no frames yet"),
        }
        Ok(descriptor)
    }

    fn write_atomic(&self, text: &str) -> FrameResult<()> {
        let tmp = self.path.with_extension("tmp");
        let write = || -> std::io::Result<()> {
            let mut file = File::create(&tmp)?;
            file.write_all(text.as_bytes())?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)?;
            sync_parent_dir(&self.path)
        };

        write().map_err(|e| {
            let _ = fs::remove_file(&tmp);
            FrameError::io(format!("write {}", self.path.display()), e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CaptureTime;
    use crate::testing::mocks::MemFrameStore;
    use tempfile::tempdir;

    #[test]
    fn parse_accepts_two_lines() {
        assert_eq!(
            Descriptor::parse("5\n10\n").unwrap(),
            Descriptor::Window(Window::new(5, 10))
        );
        assert_eq!(
            Descriptor::parse("5\r\n10").unwrap(),
            Descriptor::Window(Window::new(5, 10))
        );
        assert_eq!(Descriptor::parse("0\n0\n").unwrap(), Descriptor::Empty);
    }

    #[test]
    fn parse_rejects_malformed_bodies() {
        for body in ["", "5", "five\n10", "10\n5", "5\n10\n15", "0\n4", "-1\n3"] {
            let err = Descriptor::parse(body).unwrap_err();
            assert!(err.is_source_unavailable(), "{:?} -> {}", body, err);
        }
    }

    #[test]
    fn encode_parse_round_trip() {
        let d = Descriptor::Window(Window::new(3, 45_002));
        assert_eq!(d.encode(), "3\n45002\n");
        assert_eq!(Descriptor::parse(&d.encode()).unwrap(), d);
        assert_eq!(Descriptor::Empty.encode(), "0\n0\n");
    }

    #[test]
    fn publish_writes_file_and_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(DESCRIPTOR_FILE);
        let store = MemFrameStore::new();

        let publisher = Publisher::open(&path);
        assert_eq!(publisher.publish(&store).unwrap(), Descriptor::Empty);
        assert_eq!(fs::read_to_string(&path).unwrap(), "0\n0\n");

        let now = CaptureTime::now_utc();
        store.put(2, b"a", now).unwrap();
        store.put(4, b"b", now).unwrap();
        publisher.publish(&store).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "2\n4\n");

        let reopened = Publisher::open(&path);
        assert_eq!(reopened.published(), Descriptor::Window(Window::new(2, 4)));
        // the rename and the directory sync both went through
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn failed_write_keeps_the_previous_descriptor() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gone").join(DESCRIPTOR_FILE);
        let store = MemFrameStore::new();
        store.put(1, b"a", CaptureTime::now_utc()).unwrap();

        let publisher = Publisher::open(&path);
        assert!(publisher.publish(&store).is_err());
        assert_eq!(publisher.published(), Descriptor::Empty);
    }

    #[test]
    fn descriptor_is_recomputed_not_cached() {
        let dir = tempdir().unwrap();
        let store = MemFrameStore::new();
        let publisher = Publisher::open(dir.path().join(DESCRIPTOR_FILE));
        let now = CaptureTime::now_utc();

        store.put(1, b"a", now).unwrap();
        publisher.publish(&store).unwrap();
        store.put(2, b"b", now).unwrap();

        assert_eq!(
            publisher.descriptor(&store).unwrap(),
            Descriptor::Window(Window::new(1, 2))
        );
        assert_eq!(publisher.published(), Descriptor::Window(Window::new(1, 1)));
    }
}
