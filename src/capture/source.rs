// src/capture/source.rs - where JPEG frames come from

use std::io::Read;
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::core::{FrameError, FrameResult};

const MAX_SNAPSHOT_BYTES: u64 = 32 * 1024 * 1024;

pub const DEFAULT_GRAB_TIMEOUT: Duration = Duration::from_secs(10);
const CHILD_POLL: Duration = Duration::from_millis(20);

/// A camera. `grab` returns one JPEG or `SourceUnavailable`.
pub trait FrameSource: Send {
    fn name(&self) -> &str;
    fn grab(&mut self) -> FrameResult<Vec<u8>>;
}

fn check_jpeg(source: &str, bytes: Vec<u8>) -> FrameResult<Vec<u8>> {
    if bytes.starts_with(&[0xFF, 0xD8]) {
        Ok(bytes)
    } else {
        Err(FrameError::source_unavailable(format!(
            "{} returned {} bytes that are not a JPEG",
            source,
            bytes.len()
        )))
    }
}

/// Reads `reader` to the end, failing once more than `limit` bytes arrive.
fn read_limited(source: &str, reader: impl Read, limit: u64) -> FrameResult<Vec<u8>> {
    let mut bytes = Vec::new();
    reader
        .take(limit.saturating_add(1))
        .read_to_end(&mut bytes)
        .map_err(|e| FrameError::source_unavailable(format!("{} body: {}", source, e)))?;

    if bytes.len() as u64 > limit {
        return Err(FrameError::source_unavailable(format!(
            "{} sent more than {} bytes",
            source, limit
        )));
    }
    Ok(bytes)
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    let mut pipe = pipe?;
    thread::Builder::new()
        .name("ffmpeg-pipe".to_string())
        .spawn(move || {
            let mut bytes = Vec::new();
            let _ = pipe.read_to_end(&mut bytes);
            bytes
        })
        .ok()
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

/// Grabs a single frame from a V4L2 device through ffmpeg.
pub struct FfmpegSource {
    name: String,
    program: String,
    device: String,
    input_format: String,
    timeout: Duration,
}

impl FfmpegSource {
    pub fn new(device: impl Into<String>) -> Self {
        let device = device.into();
        Self {
            name: format!("ffmpeg:{}", device),
            program: "ffmpeg".to_string(),
            device,
            input_format: "v4l2".to_string(),
            timeout: DEFAULT_GRAB_TIMEOUT,
        }
    }

    pub fn with_input_format(mut self, format: impl Into<String>) -> Self {
        self.input_format = format.into();
        self
    }

    /// Path or name of the ffmpeg binary.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// A grab still running after `timeout` is killed and counts as failed.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl FrameSource for FfmpegSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn grab(&mut self) -> FrameResult<Vec<u8>> {
        let mut child = Command::new(&self.program)
            .args([
                "-loglevel",
                "error",
                "-f",
                &self.input_format,
                "-i",
                &self.device,
                "-frames:v",
                "1",
                "-f",
                "image2",
                "-c:v",
                "mjpeg",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                FrameError::source_unavailable(format!("{} spawn failed: {}", self.program, e))
            })?;

        // both pipes are drained while waiting so a chatty child cannot stall
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() < deadline => thread::sleep(CHILD_POLL),
                Ok(None) => {
                    warn!(
                        "[capture] {} still running after {:?}, killing it",
                        self.name, self.timeout
                    );
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(FrameError::source_unavailable(format!(
                        "{} gave no frame within {:?}",
                        self.program, self.timeout
                    )));
                }
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(FrameError::source_unavailable(format!(
                        "{} wait failed: {}",
                        self.program, e
                    )));
                }
            }
        };

        let stdout = collect(stdout);
        if !status.success() {
            let stderr = collect(stderr);
            return Err(FrameError::source_unavailable(format!(
                "{} exited with {}: {}",
                self.program,
                status,
                String::from_utf8_lossy(&stderr).trim()
            )));
        }
        if stdout.len() as u64 > MAX_SNAPSHOT_BYTES {
            return Err(FrameError::source_unavailable(format!(
                "{} wrote more than {} bytes",
                self.program, MAX_SNAPSHOT_BYTES
            )));
        }

        debug!("[capture] {} grabbed {} bytes", self.name, stdout.len());
        check_jpeg(&self.name, stdout)
    }
}

/// Pulls a still from an IP camera's snapshot URL.
pub struct HttpSnapshotSource {
    name: String,
    url: String,
    agent: ureq::Agent,
    max_bytes: u64,
}

impl HttpSnapshotSource {
    /// `timeout` bounds connecting and each read; the whole request is cut
    /// off after twice that.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let url = url.into();
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout(timeout.saturating_mul(2))
            .build();

        Self {
            name: format!("snapshot:{}", url),
            url,
            agent,
            max_bytes: MAX_SNAPSHOT_BYTES,
        }
    }

    pub fn with_max_bytes(mut self, limit: u64) -> Self {
        self.max_bytes = limit;
        self
    }
}

impl FrameSource for HttpSnapshotSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn grab(&mut self) -> FrameResult<Vec<u8>> {
        let response = self
            .agent
            .get(&self.url)
            .call()
            .map_err(|e| FrameError::source_unavailable(format!("snapshot request: {}", e)))?;

        let bytes = read_limited(&self.name, response.into_reader(), self.max_bytes)?;
        check_jpeg(&self.name, bytes)
    }
}
