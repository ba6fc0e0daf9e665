use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};

use crate::store::FrameNaming;
use crate::sync::SyncPolicy;

/// Where the server's frames come from.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CameraConfig {
    /// Local device grabbed through ffmpeg.
    Ffmpeg {
        device: String,
        #[serde(default = "default_input_format")]
        input_format: String,
        #[serde(default = "default_ffmpeg_program")]
        program: String,
        /// A grab still running after this long is killed.
        #[serde(default = "default_camera_timeout")]
        timeout_secs: u64,
    },
    /// IP camera still image.
    Snapshot {
        url: String,
        #[serde(default = "default_camera_timeout")]
        timeout_secs: u64,
    },
}

fn default_input_format() -> String {
    "v4l2".to_string()
}

fn default_ffmpeg_program() -> String {
    "ffmpeg".to_string()
}

fn default_camera_timeout() -> u64 {
    10
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self::Ffmpeg {
            device: "/dev/video0".to_string(),
            input_format: default_input_format(),
            program: default_ffmpeg_program(),
            timeout_secs: default_camera_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub image_directory: PathBuf,
    pub image_prefix: String,
    pub image_postfix: String,
    /// Minutes between shots; fractions allowed.
    pub interval_minutes: f64,
    pub max_frames: u64,
    pub bind_host: String,
    pub port: u16,
    /// How often the capture loop checks whether a shot is due.
    pub poll_ms: u64,
    pub camera: CameraConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            image_directory: PathBuf::from("./images/"),
            image_prefix: "frame".to_string(),
            image_postfix: ".jpg".to_string(),
            interval_minutes: 1.0,
            max_frames: 45_000,
            bind_host: "0.0.0.0".to_string(),
            port: 8000,
            poll_ms: 1000,
            camera: CameraConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("parse {}", path.display()))?;
        config.validate().context("config validation failed")?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.image_directory.as_os_str().is_empty() {
            bail!("image_directory must not be empty");
        }
        validate_naming(&self.image_prefix, &self.image_postfix)?;
        if !self.interval_minutes.is_finite() || self.interval_minutes <= 0.0 {
            bail!("interval_minutes must be > 0");
        }
        if self.max_frames == 0 {
            bail!("max_frames must be >= 1");
        }
        if self.poll_ms == 0 {
            bail!("poll_ms must be > 0");
        }
        match &self.camera {
            CameraConfig::Ffmpeg { device, .. } if device.trim().is_empty() => {
                bail!("camera.device must not be empty")
            }
            CameraConfig::Snapshot { url, .. } if !url.starts_with("http") => {
                bail!("camera.url must be an http(s) URL, got '{}'", url)
            }
            CameraConfig::Ffmpeg { program, .. } if program.trim().is_empty() => {
                bail!("camera.program must not be empty")
            }
            CameraConfig::Ffmpeg { timeout_secs: 0, .. }
            | CameraConfig::Snapshot { timeout_secs: 0, .. } => {
                bail!("camera.timeout_secs must be > 0")
            }
            _ => {}
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.interval_minutes * 60.0).unwrap_or(Duration::MAX)
    }

    pub fn poll_period(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }

    pub fn naming(&self) -> FrameNaming {
        FrameNaming::new(&self.image_prefix, &self.image_postfix)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub image_directory: PathBuf,
    pub image_prefix: String,
    pub image_postfix: String,
    pub server_url: String,
    pub update_interval_secs: u64,
    pub clear_cache: bool,
    pub follow: bool,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub max_fetch_per_cycle: usize,
    pub retry_capacity: usize,
    pub max_attempts: u32,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        let policy = SyncPolicy::default();
        Self {
            image_directory: PathBuf::from("./images/"),
            image_prefix: "frame".to_string(),
            image_postfix: ".jpg".to_string(),
            server_url: "http://localhost:8000".to_string(),
            update_interval_secs: 10,
            clear_cache: policy.clear_cache,
            follow: false,
            connect_timeout_secs: 5,
            read_timeout_secs: 10,
            max_fetch_per_cycle: policy.max_fetch_per_cycle,
            retry_capacity: policy.retry_capacity,
            max_attempts: policy.max_attempts,
        }
    }
}

impl ViewerConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("parse {}", path.display()))?;
        config.validate().context("config validation failed")?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.image_directory.as_os_str().is_empty() {
            bail!("image_directory must not be empty");
        }
        validate_naming(&self.image_prefix, &self.image_postfix)?;
        if !self.server_url.starts_with("http://") && !self.server_url.starts_with("https://") {
            bail!("server_url must be an http(s) URL, got '{}'", self.server_url);
        }
        if self.update_interval_secs == 0 {
            bail!("update_interval_secs must be > 0");
        }
        if self.connect_timeout_secs == 0 || self.read_timeout_secs == 0 {
            bail!("timeouts must be > 0");
        }
        if self.max_fetch_per_cycle == 0 {
            bail!("max_fetch_per_cycle must be > 0");
        }
        if self.max_attempts == 0 {
            bail!("max_attempts must be > 0");
        }
        Ok(())
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    pub fn naming(&self) -> FrameNaming {
        FrameNaming::new(&self.image_prefix, &self.image_postfix)
    }

    pub fn sync_policy(&self) -> SyncPolicy {
        SyncPolicy {
            clear_cache: self.clear_cache,
            max_fetch_per_cycle: self.max_fetch_per_cycle,
            retry_capacity: self.retry_capacity,
            max_attempts: self.max_attempts,
        }
    }
}

fn validate_naming(prefix: &str, postfix: &str) -> anyhow::Result<()> {
    for (name, value) in [("image_prefix", prefix), ("image_postfix", postfix)] {
        if value.contains('/') || value.contains('\\') {
            bail!("{} must not contain path separators", name);
        }
        if value.bytes().any(|b| b.is_ascii_digit()) {
            bail!("{} must not contain digits", name);
        }
    }
    if postfix.is_empty() {
        bail!("image_postfix must not be empty");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        ServerConfig::default().validate().unwrap();
        ViewerConfig::default().validate().unwrap();
        assert_eq!(ServerConfig::default().interval(), Duration::from_secs(60));
        assert_eq!(ServerConfig::default().bind_addr(), "0.0.0.0:8000");
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: ServerConfig = toml::from_str(
            r#"
            interval_minutes = 0.5
            max_frames = 100

            [camera]
            type = "snapshot"
            url = "http://cam.local/still.jpg"
            "#,
        )
        .unwrap();

        config.validate().unwrap();
        assert_eq!(config.interval(), Duration::from_secs(30));
        assert_eq!(config.port, 8000);
        assert_eq!(
            config.camera,
            CameraConfig::Snapshot {
                url: "http://cam.local/still.jpg".to_string(),
                timeout_secs: 10,
            }
        );
    }

    #[test]
    fn ffmpeg_camera_defaults_program_and_timeout() {
        let config: ServerConfig = toml::from_str(
            r#"
            [camera]
            type = "ffmpeg"
            device = "/dev/video2"
            timeout_secs = 4
            "#,
        )
        .unwrap();

        config.validate().unwrap();
        assert_eq!(
            config.camera,
            CameraConfig::Ffmpeg {
                device: "/dev/video2".to_string(),
                input_format: "v4l2".to_string(),
                program: "ffmpeg".to_string(),
                timeout_secs: 4,
            }
        );
    }

    #[test]
    fn rejects_nonsense() {
        let mut server = ServerConfig::default();
        server.max_frames = 0;
        assert!(server.validate().is_err());

        let mut server = ServerConfig::default();
        server.interval_minutes = -1.0;
        assert!(server.validate().is_err());

        let mut viewer = ViewerConfig::default();
        viewer.server_url = "localhost:8000".to_string();
        assert!(viewer.validate().is_err());

        let mut viewer = ViewerConfig::default();
        viewer.image_prefix = "img2".to_string();
        assert!(viewer.validate().is_err());
    }

    #[test]
    fn viewer_policy_follows_config() {
        let config: ViewerConfig = toml::from_str("clear_cache = true\nmax_attempts = 2\n").unwrap();
        let policy = config.sync_policy();
        assert!(policy.clear_cache);
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.max_fetch_per_cycle, 500);
    }
}
