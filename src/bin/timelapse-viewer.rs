// src/bin/timelapse-viewer.rs

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use log::{info, warn};

use timelapse_share::config::ViewerConfig;
use timelapse_share::io::HttpRemote;
use timelapse_share::monitoring::Metrics;
use timelapse_share::store::{FrameStore, FsFrameStore};
use timelapse_share::sync::{SyncClient, start_sync};
use timelapse_share::viewport::Viewport;

/// Mirrors a timelapse server into a local directory and follows it.
#[derive(Debug, Parser)]
#[command(name = "timelapse-viewer", version)]
struct Args {
    /// TOML config; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory the mirrored frames are kept in
    #[arg(long = "image-directory")]
    image_directory: Option<PathBuf>,

    /// File name prefix of mirrored frames, e.g. 'IMG'
    #[arg(long = "image-prefix")]
    image_prefix: Option<String>,

    /// File name postfix of mirrored frames, e.g. '.jpg'
    #[arg(long = "image-postfix")]
    image_postfix: Option<String>,

    /// Base URL of the timelapse server
    #[arg(long = "server-url")]
    server_url: Option<String>,

    /// Seconds between sync cycles
    #[arg(long)]
    interval: Option<u64>,

    /// Delete local frames the server no longer has
    #[arg(long = "clear-cache")]
    clear_cache: bool,

    /// Always show the newest frame
    #[arg(long)]
    follow: bool,
}

impl Args {
    fn into_config(self) -> anyhow::Result<ViewerConfig> {
        let mut cfg = match &self.config {
            Some(path) => ViewerConfig::load(path)?,
            None => ViewerConfig::default(),
        };

        if let Some(dir) = self.image_directory {
            cfg.image_directory = dir;
        }
        if let Some(prefix) = self.image_prefix {
            cfg.image_prefix = prefix;
        }
        if let Some(postfix) = self.image_postfix {
            cfg.image_postfix = postfix;
        }
        if let Some(url) = self.server_url {
            info!("[viewer] server {}", url);
            cfg.server_url = url;
        }
        if let Some(secs) = self.interval {
            cfg.update_interval_secs = secs;
        }
        cfg.clear_cache |= self.clear_cache;
        cfg.follow |= self.follow;

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
            info!("[viewer] shutdown requested");
            r.store(false, Ordering::SeqCst);
        })?;
    }

    // ------------------------------------------------------------
    // Mirror / sync
    // ------------------------------------------------------------
    let mirror = Arc::new(
        FsFrameStore::open(&cfg.image_directory, cfg.naming())
            .with_context(|| format!("open {}", cfg.image_directory.display()))?,
    );
    match mirror.window()? {
        Some(w) => info!("[viewer] mirror holds {}..={}", w.min, w.max),
        None => info!("[viewer] mirror is empty"),
    }

    let metrics = Arc::new(Metrics::new());
    let remote = HttpRemote::with_timeouts(
        cfg.server_url.as_str(),
        Duration::from_secs(cfg.connect_timeout_secs),
        Duration::from_secs(cfg.read_timeout_secs),
    );
    let client = SyncClient::new(
        Box::new(remote),
        mirror.clone(),
        cfg.sync_policy(),
        metrics.clone(),
    );
    let mut sync = start_sync(client, cfg.update_interval())?;

    // ------------------------------------------------------------
    // Render loop
    // ------------------------------------------------------------
    info!("[viewer] running, Ctrl+C to stop");

    let mut viewport = Viewport::new(cfg.follow);
    let mut shown = None;
    let mut last_refresh: Option<Instant> = None;
    let mut last_stats = Instant::now();

    while running.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(100));

        if last_refresh.is_none_or(|t| t.elapsed() >= Duration::from_secs(1)) {
            match mirror.window() {
                Ok(window) => {
                    viewport.refresh(window);
                }
                Err(e) => warn!("[viewer] mirror scan failed: {}", e),
            }
            last_refresh = Some(Instant::now());
        }

        let current = viewport.tick();
        if current != shown {
            match current.map(|id| mirror.get(id)) {
                Some(Ok(frame)) => info!("[viewer] frame {} taken {}", frame.id, frame.timestamp),
                Some(Err(e)) => warn!("[viewer] {}", e),
                None => info!("[viewer] no frame available"),
            }
            shown = current;
        }

        if last_stats.elapsed() >= Duration::from_secs(60) {
            let snap = metrics.snapshot();
            info!(
                "[viewer] fetched {}, failed {}, cycles {}, skipped {}",
                snap.frames_fetched, snap.fetch_failures, snap.sync_cycles, snap.sync_skipped,
            );
            last_stats = Instant::now();
        }
    }

    info!("[viewer] shutting down…");
    sync.stop();
    info!("[viewer] shutdown complete");
    Ok(())
}
