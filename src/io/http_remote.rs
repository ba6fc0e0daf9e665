// src/io/http_remote.rs - a timelapse server reached over HTTP
use std::io::Read;
use std::time::Duration;

use crate::core::{FrameError, FrameResult};
use crate::publish::{DESCRIPTOR_FILE, Descriptor};
use crate::store::{FrameId, FrameNaming};
use crate::sync::RemoteSource;

const MAX_FRAME_BYTES: u64 = 32 * 1024 * 1024;
const MAX_DESCRIPTOR_BYTES: u64 = 256;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HttpRemote {
    base_url: String,
    naming: FrameNaming,
    agent: ureq::Agent,
    max_frame_bytes: u64,
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeouts(base_url, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT)
    }

    /// `read` bounds each socket read; a whole request, body included, is
    /// cut off after `connect + read`.
    pub fn with_timeouts(base_url: impl Into<String>, connect: Duration, read: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(connect)
            .timeout_read(read)
            .timeout(connect + read)
            .build();

        Self {
            base_url,
            naming: FrameNaming::default(),
            agent,
            max_frame_bytes: MAX_FRAME_BYTES,
        }
    }

    /// Frames larger than `limit` are rejected instead of stored cut short.
    pub fn with_max_frame_bytes(mut self, limit: u64) -> Self {
        self.max_frame_bytes = limit;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Reads at most `limit + 1` bytes so an oversized body is detectable.
    fn get(&self, name: &str, limit: u64) -> Result<Vec<u8>, ureq::Error> {
        let response = self
            .agent
            .get(&format!("{}/{}", self.base_url, name))
            .call()?;

        let mut body = Vec::new();
        response
            .into_reader()
            .take(limit.saturating_add(1))
            .read_to_end(&mut body)?;
        Ok(body)
    }
}

impl RemoteSource for HttpRemote {
    fn name(&self) -> &str {
        &self.base_url
    }

    fn fetch_descriptor(&self) -> FrameResult<Descriptor> {
        let body = self
            .get(DESCRIPTOR_FILE, MAX_DESCRIPTOR_BYTES)
            .map_err(|e| FrameError::source_unavailable(format!("{}: {}", DESCRIPTOR_FILE, e)))?;
        if body.len() as u64 > MAX_DESCRIPTOR_BYTES {
            return Err(FrameError::malformed(format!(
                "descriptor exceeds {} bytes",
                MAX_DESCRIPTOR_BYTES
            )));
        }

        let text = String::from_utf8(body)
            .map_err(|_| FrameError::malformed("descriptor is not UTF-8"))?;
        Descriptor::parse(&text)
    }

    fn fetch_frame(&self, id: FrameId) -> FrameResult<Vec<u8>> {
        match self.get(&self.naming.file_name(id), self.max_frame_bytes) {
            Ok(bytes) if bytes.len() as u64 > self.max_frame_bytes => {
                Err(FrameError::source_unavailable(format!(
                    "frame {} exceeds {} bytes",
                    id, self.max_frame_bytes
                )))
            }
            Ok(bytes) => Ok(bytes),
            Err(ureq::Error::Status(404, _)) => Err(FrameError::NotFound { id }),
            Err(e) => Err(FrameError::source_unavailable(format!("frame {}: {}", id, e))),
        }
    }
}
