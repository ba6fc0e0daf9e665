// src/store/fs.rs
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use super::exif;
use super::{Frame, FrameId, FrameNaming, FrameStore, Window};
use crate::core::{CaptureTime, FrameError, FrameResult};

const PART_SUFFIX: &str = ".part";

/// Flushes the directory entry of `path` so a finished rename survives a
/// power cut. Directories cannot be opened for syncing outside unix.
pub fn sync_parent_dir(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        File::open(parent)?.sync_all()?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

/// One JPEG per frame in a flat directory. The capture time lives in the
/// image's EXIF block.
pub struct FsFrameStore {
    dir: PathBuf,
    naming: FrameNaming,
}

impl FsFrameStore {
    /// Opens (and creates) `dir`, dropping temp files left by an interrupted put.
    pub fn open(dir: impl Into<PathBuf>, naming: FrameNaming) -> FrameResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| FrameError::io(format!("create {}", dir.display()), e))?;

        let store = Self { dir, naming };
        store.remove_partials()?;
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn naming(&self) -> &FrameNaming {
        &self.naming
    }

    pub fn path_for(&self, id: FrameId) -> PathBuf {
        self.dir.join(self.naming.file_name(id))
    }

    /// Hidden temp name used while a put is in flight.
    pub fn part_path_for(&self, id: FrameId) -> PathBuf {
        self.dir
            .join(format!(".{}{}", self.naming.file_name(id), PART_SUFFIX))
    }

    fn remove_partials(&self) -> FrameResult<()> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| FrameError::io(format!("read {}", self.dir.display()), e))?;

        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with('.') && name.ends_with(PART_SUFFIX) {
                match fs::remove_file(entry.path()) {
                    Ok(()) => info!("[store] removed interrupted write {}", name),
                    Err(e) => warn!("[store] could not remove {}: {}", name, e),
                }
            }
        }
        Ok(())
    }

    fn ids(&self) -> FrameResult<Vec<FrameId>> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| FrameError::io(format!("read {}", self.dir.display()), e))?;

        Ok(entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name();
                self.naming.parse_id(name.to_str()?)
            })
            .collect())
    }
}

impl FrameStore for FsFrameStore {
    fn put(&self, id: FrameId, payload: &[u8], timestamp: CaptureTime) -> FrameResult<()> {
        let bytes = exif::embed_capture_time(payload, timestamp).map_err(|e| {
            FrameError::InvalidImage {
                id,
                message: e.to_string(),
            }
        })?;

        // write + sync under a hidden name, then rename into place
        let part = self.part_path_for(id);
        let target = self.path_for(id);
        let write = || -> std::io::Result<()> {
            let mut file = File::create(&part)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            fs::rename(&part, &target)?;
            sync_parent_dir(&target)
        };

        if let Err(e) = write() {
            let _ = fs::remove_file(&part);
            return Err(FrameError::io(format!("write {}", target.display()), e));
        }

        debug!("[store] wrote {} ({} bytes)", target.display(), bytes.len());
        Ok(())
    }

    fn get(&self, id: FrameId) -> FrameResult<Frame> {
        let path = self.path_for(id);
        let payload = fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => FrameError::NotFound { id },
            _ => FrameError::io(format!("read {}", path.display()), e),
        })?;

        let timestamp =
            exif::read_capture_time(&payload).ok_or_else(|| FrameError::InvalidImage {
                id,
                message: "no capture time".to_string(),
            })?;

        Ok(Frame {
            id,
            payload,
            timestamp,
        })
    }

    fn remove(&self, id: FrameId) -> FrameResult<()> {
        let path = self.path_for(id);
        fs::remove_file(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => FrameError::NotFound { id },
            _ => FrameError::io(format!("remove {}", path.display()), e),
        })
    }

    fn contains(&self, id: FrameId) -> bool {
        self.path_for(id).is_file()
    }

    fn current_window(&self) -> FrameResult<Window> {
        Window::from_ids(self.ids()?).ok_or(FrameError::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xDA, 0x00, 0x02, 0xAB, 0xFF, 0xD9];

    fn t(s: &str) -> CaptureTime {
        CaptureTime::parse(s).unwrap()
    }

    #[test]
    fn parent_dir_sync_handles_bare_and_nested_names() {
        let dir = tempdir().unwrap();
        sync_parent_dir(&dir.path().join("frame1.jpg")).unwrap();
        sync_parent_dir(Path::new("frame1.jpg")).unwrap();
        if cfg!(unix) {
            assert!(sync_parent_dir(&dir.path().join("missing/frame1.jpg")).is_err());
        }
    }

    #[test]
    fn put_get_round_trips_payload_and_time() {
        let dir = tempdir().unwrap();
        let store = FsFrameStore::open(dir.path(), FrameNaming::default()).unwrap();

        store.put(1, JPEG, t("2019-06-04 10:00:00")).unwrap();
        let frame = store.get(1).unwrap();

        assert_eq!(frame.id, 1);
        assert_eq!(frame.timestamp, t("2019-06-04 10:00:00"));
        assert!(frame.payload.ends_with(&JPEG[2..]));
        assert!(dir.path().join("frame1.jpg").is_file());
    }

    #[test]
    fn stored_bytes_survive_a_second_put() {
        let dir = tempdir().unwrap();
        let store = FsFrameStore::open(dir.path(), FrameNaming::default()).unwrap();

        store.put(1, JPEG, t("2019-06-04 10:00:00")).unwrap();
        let first = store.get(1).unwrap();
        store.put(2, &first.payload, first.timestamp).unwrap();
        assert_eq!(store.get(2).unwrap().payload, first.payload);
    }

    #[test]
    fn missing_frames_are_not_found() {
        let dir = tempdir().unwrap();
        let store = FsFrameStore::open(dir.path(), FrameNaming::default()).unwrap();

        assert!(store.get(3).unwrap_err().is_not_found());
        assert!(store.remove(3).unwrap_err().is_not_found());
        assert!(!store.contains(3));
        assert!(store.current_window().unwrap_err().is_empty());
    }

    #[test]
    fn window_ignores_foreign_and_partial_files() {
        let dir = tempdir().unwrap();
        let store = FsFrameStore::open(dir.path(), FrameNaming::default()).unwrap();

        store.put(4, JPEG, t("2019-06-04 10:00:00")).unwrap();
        store.put(6, JPEG, t("2019-06-04 10:01:00")).unwrap();
        fs::write(dir.path().join("index.txt"), "4\n6\n").unwrap();
        fs::write(dir.path().join(".frame9.jpg.part"), [0xFF, 0xD8]).unwrap();

        assert_eq!(store.current_window().unwrap(), Window::new(4, 6));
    }

    #[test]
    fn reopening_clears_interrupted_writes() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(".frame9.jpg.part"), [0xFF, 0xD8]).unwrap();

        let _store = FsFrameStore::open(dir.path(), FrameNaming::default()).unwrap();
        assert!(!dir.path().join(".frame9.jpg.part").exists());
    }

    #[test]
    fn non_jpeg_payload_is_rejected_without_touching_disk() {
        let dir = tempdir().unwrap();
        let store = FsFrameStore::open(dir.path(), FrameNaming::default()).unwrap();

        let err = store.put(1, b"not an image", t("2019-06-04 10:00:00")).unwrap_err();
        assert!(matches!(err, FrameError::InvalidImage { id: 1, .. }));
        assert!(store.current_window().unwrap_err().is_empty());
    }
}
