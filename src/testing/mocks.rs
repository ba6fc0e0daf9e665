// src/testing/mocks.rs - in-process doubles for stores, cameras and servers
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::core::{CaptureTime, FrameError, FrameResult, lock_mutex};
use crate::publish::Descriptor;
use crate::store::{Frame, FrameId, FrameStore, FsFrameStore, Window, exif};
use crate::sync::RemoteSource;

/// Smallest byte sequence the EXIF code accepts as a JPEG; `seed` ends up
/// in the scan data so frames are distinguishable.
pub fn sample_jpeg(seed: u8) -> Vec<u8> {
    vec![0xFF, 0xD8, 0xFF, 0xDA, 0x00, 0x02, seed, 0xFF, 0xD9]
}

/// `sample_jpeg` with a capture time embedded, as a server would store it.
pub fn tagged_jpeg(seed: u8, time: CaptureTime) -> Vec<u8> {
    exif::embed_capture_time(&sample_jpeg(seed), time).unwrap_or_default()
}

pub fn fixed_time() -> CaptureTime {
    CaptureTime::parse("2019-06-04 12:00:00").unwrap_or_else(CaptureTime::now_utc)
}

/// Answers one HTTP request on 127.0.0.1 with `body`, written `chunk` bytes
/// at a time with `pause` between writes. Returns the base URL.
pub fn serve_raw_once(body: Vec<u8>, chunk: usize, pause: Duration) -> std::io::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;

    thread::Builder::new()
        .name("raw-http".to_string())
        .spawn(move || {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            let mut request = [0u8; 2048];
            let _ = stream.read(&mut request);

            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            if stream.write_all(head.as_bytes()).is_err() {
                return;
            }
            for piece in body.chunks(chunk.max(1)) {
                if stream.write_all(piece).and_then(|_| stream.flush()).is_err() {
                    return;
                }
                if !pause.is_zero() {
                    thread::sleep(pause);
                }
            }
        })?;

    Ok(format!("http://{}", addr))
}

#[derive(Default)]
pub struct MemFrameStore {
    frames: Mutex<BTreeMap<FrameId, Frame>>,
}

impl MemFrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(&self) -> Vec<FrameId> {
        lock_mutex(&self.frames, "MemFrameStore::ids")
            .keys()
            .copied()
            .collect()
    }
}

impl FrameStore for MemFrameStore {
    fn put(&self, id: FrameId, payload: &[u8], timestamp: CaptureTime) -> FrameResult<()> {
        lock_mutex(&self.frames, "MemFrameStore::put").insert(
            id,
            Frame {
                id,
                payload: payload.to_vec(),
                timestamp,
            },
        );
        Ok(())
    }

    fn get(&self, id: FrameId) -> FrameResult<Frame> {
        lock_mutex(&self.frames, "MemFrameStore::get")
            .get(&id)
            .cloned()
            .ok_or(FrameError::NotFound { id })
    }

    fn remove(&self, id: FrameId) -> FrameResult<()> {
        lock_mutex(&self.frames, "MemFrameStore::remove")
            .remove(&id)
            .map(|_| ())
            .ok_or(FrameError::NotFound { id })
    }

    fn contains(&self, id: FrameId) -> bool {
        lock_mutex(&self.frames, "MemFrameStore::contains").contains_key(&id)
    }

    fn current_window(&self) -> FrameResult<Window> {
        let frames = lock_mutex(&self.frames, "MemFrameStore::current_window");
        Window::from_ids(frames.keys().copied()).ok_or(FrameError::Empty)
    }
}

/// Camera that follows a script of successes (`true`) and failures, then
/// succeeds forever.
pub struct ScriptedSource {
    script: VecDeque<bool>,
    grabs: u8,
}

impl ScriptedSource {
    pub fn new(script: impl IntoIterator<Item = bool>) -> Self {
        Self {
            script: script.into_iter().collect(),
            grabs: 0,
        }
    }

    pub fn always_ok() -> Self {
        Self::new([])
    }
}

impl crate::capture::FrameSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn grab(&mut self) -> FrameResult<Vec<u8>> {
        self.grabs = self.grabs.wrapping_add(1);
        if self.script.pop_front().unwrap_or(true) {
            Ok(sample_jpeg(self.grabs))
        } else {
            Err(FrameError::source_unavailable("scripted camera failure"))
        }
    }
}

/// Filesystem store that dies halfway through writing chosen ids: the temp
/// file is left behind with half the payload and the put reports an error.
pub struct CrashingStore {
    inner: FsFrameStore,
    crash_on: Mutex<Vec<FrameId>>,
}

impl CrashingStore {
    pub fn new(inner: FsFrameStore, crash_on: impl IntoIterator<Item = FrameId>) -> Self {
        Self {
            inner,
            crash_on: Mutex::new(crash_on.into_iter().collect()),
        }
    }

    pub fn inner(&self) -> &FsFrameStore {
        &self.inner
    }
}

impl FrameStore for CrashingStore {
    fn put(&self, id: FrameId, payload: &[u8], timestamp: CaptureTime) -> FrameResult<()> {
        let crash = {
            let mut crash_on = lock_mutex(&self.crash_on, "CrashingStore::put");
            match crash_on.iter().position(|c| *c == id) {
                Some(i) => {
                    crash_on.remove(i);
                    true
                }
                None => false,
            }
        };

        if crash {
            let half = &payload[..payload.len() / 2];
            let part = self.inner.part_path_for(id);
            fs::write(&part, half).map_err(|e| FrameError::io("partial write", e))?;
            return Err(FrameError::io(
                format!("crash while writing frame {}", id),
                std::io::Error::new(std::io::ErrorKind::Interrupted, "simulated crash"),
            ));
        }

        self.inner.put(id, payload, timestamp)
    }

    fn get(&self, id: FrameId) -> FrameResult<Frame> {
        self.inner.get(id)
    }

    fn remove(&self, id: FrameId) -> FrameResult<()> {
        self.inner.remove(id)
    }

    fn contains(&self, id: FrameId) -> bool {
        self.inner.contains(id)
    }

    fn current_window(&self) -> FrameResult<Window> {
        self.inner.current_window()
    }
}

#[derive(Default)]
struct RemoteState {
    descriptor: Option<Descriptor>,
    frames: BTreeMap<FrameId, Vec<u8>>,
    failures: HashMap<FrameId, u32>,
    fetches: Vec<FrameId>,
    fetch_delay: Duration,
}

/// Server stand-in. Clones share state so a test can reshape the server
/// while a `SyncClient` owns another handle.
#[derive(Clone, Default)]
pub struct FakeRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Server holding `ids` and advertising exactly their window.
    pub fn with_frames(ids: impl IntoIterator<Item = FrameId>) -> Self {
        let remote = Self::new();
        for id in ids {
            remote.add_frame(id);
        }
        remote.publish_frames();
        remote
    }

    pub fn add_frame(&self, id: FrameId) {
        self.insert_raw(id, tagged_jpeg(id as u8, fixed_time()));
    }

    pub fn insert_raw(&self, id: FrameId, bytes: Vec<u8>) {
        lock_mutex(&self.state, "FakeRemote::insert_raw")
            .frames
            .insert(id, bytes);
    }

    pub fn remove_frame(&self, id: FrameId) {
        lock_mutex(&self.state, "FakeRemote::remove_frame")
            .frames
            .remove(&id);
    }

    /// Advertises the window of the frames currently held.
    pub fn publish_frames(&self) {
        let mut state = lock_mutex(&self.state, "FakeRemote::publish_frames");
        let descriptor = match Window::from_ids(state.frames.keys().copied()) {
            Some(w) => Descriptor::Window(w),
            None => Descriptor::Empty,
        };
        state.descriptor = Some(descriptor);
    }

    pub fn set_descriptor(&self, descriptor: Descriptor) {
        lock_mutex(&self.state, "FakeRemote::set_descriptor").descriptor = Some(descriptor);
    }

    pub fn set_unreachable(&self) {
        lock_mutex(&self.state, "FakeRemote::set_unreachable").descriptor = None;
    }

    /// The next `times` fetches of `id` fail.
    pub fn fail_next(&self, id: FrameId, times: u32) {
        lock_mutex(&self.state, "FakeRemote::fail_next")
            .failures
            .insert(id, times);
    }

    /// Every frame fetch takes at least `delay`.
    pub fn set_fetch_delay(&self, delay: Duration) {
        lock_mutex(&self.state, "FakeRemote::set_fetch_delay").fetch_delay = delay;
    }

    pub fn fetch_log(&self) -> Vec<FrameId> {
        lock_mutex(&self.state, "FakeRemote::fetch_log").fetches.clone()
    }
}

impl RemoteSource for FakeRemote {
    fn name(&self) -> &str {
        "fake"
    }

    fn fetch_descriptor(&self) -> FrameResult<Descriptor> {
        lock_mutex(&self.state, "FakeRemote::fetch_descriptor")
            .descriptor
            .ok_or_else(|| FrameError::source_unavailable("fake server is down"))
    }

    fn fetch_frame(&self, id: FrameId) -> FrameResult<Vec<u8>> {
        let delay = lock_mutex(&self.state, "FakeRemote::fetch_frame").fetch_delay;
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let mut state = lock_mutex(&self.state, "FakeRemote::fetch_frame");
        state.fetches.push(id);

        if state.descriptor.is_none() {
            return Err(FrameError::source_unavailable("fake server is down"));
        }
        if let Some(left) = state.failures.get_mut(&id) {
            if *left > 0 {
                *left -= 1;
                return Err(FrameError::source_unavailable(format!(
                    "injected failure for frame {}",
                    id
                )));
            }
        }

        state
            .frames
            .get(&id)
            .cloned()
            .ok_or(FrameError::NotFound { id })
    }
}
