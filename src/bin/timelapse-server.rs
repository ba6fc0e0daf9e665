// src/bin/timelapse-server.rs

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use log::info;

use timelapse_share::capture::{
    CaptureScheduler, FfmpegSource, FrameSource, HttpSnapshotSource, RetentionPolicy,
    WindowRetention, start_capture,
};
use timelapse_share::config::{CameraConfig, ServerConfig};
use timelapse_share::io::FrameHttpService;
use timelapse_share::monitoring::Metrics;
use timelapse_share::publish::{DESCRIPTOR_FILE, Publisher};
use timelapse_share::store::FsFrameStore;

/// Takes a timelapse from a camera and serves the frames over HTTP.
#[derive(Debug, Parser)]
#[command(name = "timelapse-server", version)]
struct Args {
    /// TOML config; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory the frames are stored in
    #[arg(long = "image-directory")]
    image_directory: Option<PathBuf>,

    /// Minutes between shots, e.g. 1 or 0.5
    #[arg(short, long)]
    time: Option<f64>,

    /// Frames kept before the oldest are deleted
    #[arg(short, long)]
    max: Option<u64>,

    /// Port the frames are served on
    #[arg(short, long)]
    port: Option<u16>,

    /// Capture from this device through ffmpeg
    #[arg(long, conflicts_with = "snapshot_url")]
    device: Option<String>,

    /// Capture from an IP camera snapshot URL
    #[arg(long = "snapshot-url")]
    snapshot_url: Option<String>,
}

impl Args {
    fn into_config(self) -> anyhow::Result<ServerConfig> {
        let mut cfg = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };

        if let Some(dir) = self.image_directory {
            info!("[server] image directory {}", dir.display());
            cfg.image_directory = dir;
        }
        if let Some(time) = self.time {
            info!("[server] {} minutes between shots", time);
            cfg.interval_minutes = time;
        }
        if let Some(max) = self.max {
            info!("[server] keeping at most {} frames", max);
            cfg.max_frames = max;
        }
        if let Some(port) = self.port {
            cfg.port = port;
        }
        if let Some(device) = self.device {
            cfg.camera = CameraConfig::Ffmpeg {
                device,
                input_format: "v4l2".to_string(),
                program: "ffmpeg".to_string(),
                timeout_secs: 10,
            };
        }
        if let Some(url) = self.snapshot_url {
            cfg.camera = CameraConfig::Snapshot {
                url,
                timeout_secs: 10,
            };
        }

        cfg.validate().context("invalid settings")?;
        Ok(cfg)
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cfg = Args::parse().into_config()?;

    // ------------------------------------------------------------
    // Graceful shutdown
    // ------------------------------------------------------------
    let running = Arc::new(AtomicBool::new(true));
    {
        let r = running.clone();
        ctrlc::set_handler(move || {
            info!("[server] shutdown requested");
            r.store(false, Ordering::SeqCst);
        })?;
    }

    // ------------------------------------------------------------
    // Store / descriptor
    // ------------------------------------------------------------
    let store = Arc::new(
        FsFrameStore::open(&cfg.image_directory, cfg.naming())
            .with_context(|| format!("open {}", cfg.image_directory.display()))?,
    );
    let publisher = Arc::new(Publisher::open(cfg.image_directory.join(DESCRIPTOR_FILE)));
    let metrics = Arc::new(Metrics::new());

    // ------------------------------------------------------------
    // Capture
    // ------------------------------------------------------------
    let source: Box<dyn FrameSource> = match &cfg.camera {
        CameraConfig::Ffmpeg {
            device,
            input_format,
            program,
            timeout_secs,
        } => Box::new(
            FfmpegSource::new(device.as_str())
                .with_input_format(input_format.as_str())
                .with_program(program.as_str())
                .with_timeout(Duration::from_secs(*timeout_secs)),
        ),
        CameraConfig::Snapshot { url, timeout_secs } => Box::new(HttpSnapshotSource::new(
            url.as_str(),
            Duration::from_secs(*timeout_secs),
        )),
    };
    info!("[server] camera {}", source.name());

    // enforce once so a lowered --max takes effect before the first shot
    let mut retention = WindowRetention::new(cfg.max_frames);
    retention.enforce(store.as_ref())?;

    let scheduler = CaptureScheduler::new(
        source,
        store.clone(),
        publisher.clone(),
        Box::new(retention),
        metrics.clone(),
        cfg.interval(),
    )?;
    let mut capture = start_capture(scheduler, cfg.poll_period())?;

    // ------------------------------------------------------------
    // HTTP
    // ------------------------------------------------------------
    let http = FrameHttpService::new(
        cfg.bind_addr(),
        store.clone(),
        publisher.clone(),
        cfg.naming(),
        metrics.clone(),
    )
    .start()
    .with_context(|| format!("bind {}", cfg.bind_addr()))?;

    // ------------------------------------------------------------
    // Main loop
    // ------------------------------------------------------------
    info!("[server] running on {}, Ctrl+C to stop", http.local_addr());

    let mut last_stats = Instant::now();
    while running.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(100));

        if last_stats.elapsed() >= Duration::from_secs(60) {
            let snap = metrics.snapshot();
            info!(
                "[server] window {:?}, captured {}, failed {}, served {}, evicted {}",
                publisher.published().window().map(|w| (w.min, w.max)),
                snap.frames_captured,
                snap.capture_failures,
                snap.frames_served,
                snap.frames_evicted,
            );
            last_stats = Instant::now();
        }
    }

    info!("[server] shutting down…");
    capture.stop();
    http.stop();
    info!("[server] shutdown complete");
    Ok(())
}
