use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};

use timelapse_share::capture::{
    CaptureOutcome, CaptureScheduler, WindowRetention, start_capture,
};
use timelapse_share::monitoring::Metrics;
use timelapse_share::publish::{DESCRIPTOR_FILE, Descriptor, Publisher};
use timelapse_share::store::{FrameNaming, FrameStore, FsFrameStore, Window};
use timelapse_share::testing::mocks::{CrashingStore, ScriptedSource};

fn fs_store(dir: &std::path::Path) -> anyhow::Result<FsFrameStore> {
    Ok(FsFrameStore::open(dir, FrameNaming::default())?)
}

#[test]
fn failed_attempt_leaves_contiguous_ids() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = Arc::new(fs_store(dir.path())?);
    let publisher = Arc::new(Publisher::open(dir.path().join(DESCRIPTOR_FILE)));
    let metrics = Arc::new(Metrics::new());

    let mut scheduler = CaptureScheduler::new(
        Box::new(ScriptedSource::new([true, false, true, true])),
        store.clone(),
        publisher.clone(),
        Box::new(WindowRetention::new(100)),
        metrics.clone(),
        Duration::ZERO,
    )?;

    let start = Instant::now();
    let outcomes: Vec<_> = (0..4).filter_map(|_| scheduler.tick(start)).collect();
    assert_eq!(outcomes.len(), 4);
    assert_eq!(outcomes[1], CaptureOutcome::SourceFailed);

    assert_eq!(store.current_window()?, Window::new(1, 3));
    for id in 1..=3 {
        assert!(store.contains(id));
    }
    assert_eq!(fs::read_to_string(dir.path().join(DESCRIPTOR_FILE))?, "1\n3\n");

    let snap = metrics.snapshot();
    assert_eq!(snap.frames_captured, 3);
    assert_eq!(snap.capture_failures, 1);
    Ok(())
}

#[test]
fn nothing_is_captured_before_the_interval() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = Arc::new(fs_store(dir.path())?);
    let publisher = Arc::new(Publisher::open(dir.path().join(DESCRIPTOR_FILE)));

    let mut scheduler = CaptureScheduler::new(
        Box::new(ScriptedSource::always_ok()),
        store.clone(),
        publisher.clone(),
        Box::new(WindowRetention::new(100)),
        Arc::new(Metrics::new()),
        Duration::from_secs(60),
    )?;

    let now = Instant::now();
    assert!(scheduler.tick(now).is_none());
    // published at startup even with nothing stored
    assert_eq!(publisher.published(), Descriptor::Empty);
    assert_eq!(fs::read_to_string(dir.path().join(DESCRIPTOR_FILE))?, "0\n0\n");

    let later = now + Duration::from_secs(61);
    assert!(matches!(
        scheduler.tick(later),
        Some(CaptureOutcome::Captured { id: 1, .. })
    ));
    Ok(())
}

#[test]
fn retention_runs_after_every_capture() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = Arc::new(fs_store(dir.path())?);
    let publisher = Arc::new(Publisher::open(dir.path().join(DESCRIPTOR_FILE)));

    let mut scheduler = CaptureScheduler::new(
        Box::new(ScriptedSource::always_ok()),
        store.clone(),
        publisher.clone(),
        Box::new(WindowRetention::new(3)),
        Arc::new(Metrics::new()),
        Duration::ZERO,
    )?;

    for _ in 0..5 {
        scheduler.capture_once();
    }

    assert_eq!(store.current_window()?, Window::new(3, 5));
    assert_eq!(publisher.published(), Descriptor::Window(Window::new(3, 5)));
    Ok(())
}

#[test]
fn crash_mid_put_never_advances_the_descriptor() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = Arc::new(CrashingStore::new(fs_store(dir.path())?, [3]));
    let publisher = Arc::new(Publisher::open(dir.path().join(DESCRIPTOR_FILE)));

    let mut scheduler = CaptureScheduler::new(
        Box::new(ScriptedSource::always_ok()),
        store.clone(),
        publisher.clone(),
        Box::new(WindowRetention::new(100)),
        Arc::new(Metrics::new()),
        Duration::ZERO,
    )?;

    scheduler.capture_once();
    scheduler.capture_once();
    assert_eq!(scheduler.capture_once(), CaptureOutcome::StoreFailed);

    // the half-written frame is invisible and the descriptor stayed put
    assert!(store.inner().part_path_for(3).exists());
    assert!(!store.contains(3));
    assert_eq!(publisher.published(), Descriptor::Window(Window::new(1, 2)));
    assert_eq!(fs::read_to_string(dir.path().join(DESCRIPTOR_FILE))?, "1\n2\n");
    assert_eq!(scheduler.next_id(), 3);

    // "restart": the store drops the leftover and the descriptor matches it
    drop(scheduler);
    let reopened = fs_store(dir.path())?;
    assert!(!reopened.part_path_for(3).exists());
    let republished = Publisher::open(dir.path().join(DESCRIPTOR_FILE));
    assert_eq!(
        republished.published().window(),
        Some(reopened.current_window()?)
    );
    Ok(())
}

#[test]
fn descriptor_never_runs_ahead_of_durable_frames() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = fs_store(dir.path())?;
    let publisher = Publisher::open(dir.path().join(DESCRIPTOR_FILE));
    let now = timelapse_share::CaptureTime::now_utc();
    let jpeg = timelapse_share::testing::mocks::sample_jpeg(1);

    for id in 1..=5 {
        store.put(id, &jpeg, now)?;
        // crash point: payload durable, publish not yet run
        let stale = Publisher::open(dir.path().join(DESCRIPTOR_FILE));
        if let Some(w) = stale.published().window() {
            assert!(w.max < id);
            assert!(store.contains(w.max));
        }
        publisher.publish(&store)?;
        assert_eq!(publisher.published().window().map(|w| w.max), Some(id));
    }
    Ok(())
}

#[test]
fn capture_worker_runs_until_stopped() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = Arc::new(fs_store(dir.path())?);
    let publisher = Arc::new(Publisher::open(dir.path().join(DESCRIPTOR_FILE)));

    let scheduler = CaptureScheduler::new(
        Box::new(ScriptedSource::always_ok()),
        store.clone(),
        publisher.clone(),
        Box::new(WindowRetention::new(100)),
        Arc::new(Metrics::new()),
        Duration::ZERO,
    )?;
    let mut worker = start_capture(scheduler, Duration::from_millis(10))?;

    let deadline = Instant::now() + Duration::from_secs(2);
    while store.window()?.map_or(0, |w| w.max) < 3 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    worker.stop();
    assert!(!worker.is_running());

    let w = store.current_window()?;
    assert!(w.max >= 3, "worker only reached frame {}", w.max);
    assert_eq!(w.min, 1);
    Ok(())
}
