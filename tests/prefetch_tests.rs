use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use media_chooser_cache::cache::CachedVideo;
use media_chooser_cache::error::FetchError;
use media_chooser_cache::prefetch::{
    CancelToken, FetchRequest, PickupStatus, PredownloadEvent, PredownloadState,
};
use media_chooser_cache::{
    BrowseDirection, CacheConfig, CachedMedia, MediaFetcher, MediaKind, Predownloader, TempFileHandle,
};
use tempfile::tempdir;

/// Writes a small temp file per key, with optional per-key delay and failure
#[derive(Clone, Default)]
struct StubFetcher {
    dir: PathBuf,
    delays: HashMap<String, Duration>,
    failing: Vec<String>,
    /// While set, fetches wait (until cancelled or released)
    hold: Arc<AtomicBool>,
    started: Arc<AtomicUsize>,
    finished: Arc<AtomicUsize>,
}

impl StubFetcher {
    fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            ..Default::default()
        }
    }
}

impl MediaFetcher for StubFetcher {
    fn fetch(&self, request: &FetchRequest, cancel: &CancelToken) -> Result<CachedMedia, FetchError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        while self.hold.load(Ordering::SeqCst) && !cancel.is_cancelled() {
            thread::sleep(Duration::from_millis(5));
        }
        if let Some(delay) = self.delays.get(&request.key) {
            thread::sleep(*delay);
        }
        let result = if self.failing.contains(&request.key) {
            Err(FetchError::NotFound(request.key.clone()))
        } else {
            // Deliberately ignores cancellation so stale results reach the owner
            let (handle, _file) = TempFileHandle::create_in(&self.dir, &request.key, "mp4")?;
            Ok(CachedMedia::Video(CachedVideo::new(handle)))
        };
        self.finished.fetch_add(1, Ordering::SeqCst);
        result
    }
}

fn config(dir: &Path, capacity: usize) -> CacheConfig {
    CacheConfig::default()
        .with_capacity(capacity)
        .with_temp_dir(dir)
        .with_workers(2)
}

/// Poll until `count` events arrived or a few seconds passed
fn wait_for_events(pre: &mut Predownloader, count: usize) -> Vec<PredownloadEvent> {
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut events = Vec::new();
    while events.len() < count && Instant::now() < deadline {
        events.extend(pre.poll_timeout(Duration::from_millis(50)));
    }
    events
}

fn file_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

#[test]
fn test_completed_download_is_cached_then_picked_up() {
    let dir = tempdir().unwrap();
    let mut pre = Predownloader::new(StubFetcher::new(dir.path()), &config(dir.path(), 3)).unwrap();

    assert!(pre.request("a", MediaKind::Video));
    assert!(!pre.request("a", MediaKind::Video), "already downloading");
    assert_eq!(pre.state("a"), PredownloadState::Downloading);

    let events = wait_for_events(&mut pre, 1);
    assert_eq!(events, vec![PredownloadEvent::Completed { key: "a".into() }]);
    assert_eq!(pre.state("a"), PredownloadState::Completed);
    assert!(!pre.request("a", MediaKind::Video), "already cached");

    assert_eq!(pre.pick_up("a"), PickupStatus::Ready);
    assert_eq!(pre.state("a"), PredownloadState::PickedUp);
    assert!(pre.cache_mut().get("a").is_some());
}

#[test]
fn test_pick_up_while_downloading_is_delivered_later() {
    let dir = tempdir().unwrap();
    let fetcher = StubFetcher::new(dir.path());
    fetcher.hold.store(true, Ordering::SeqCst);
    let hold = Arc::clone(&fetcher.hold);
    let mut pre = Predownloader::new(fetcher, &config(dir.path(), 3)).unwrap();

    assert_eq!(pre.pick_up("a"), PickupStatus::Missing);
    pre.request("a", MediaKind::Video);
    assert_eq!(pre.pick_up("a"), PickupStatus::Pending);

    hold.store(false, Ordering::SeqCst);
    let events = wait_for_events(&mut pre, 1);
    assert_eq!(events, vec![PredownloadEvent::PickedUp { key: "a".into() }]);
    assert_eq!(pre.state("a"), PredownloadState::PickedUp);
}

#[test]
fn test_failed_download_can_be_retried() {
    let dir = tempdir().unwrap();
    let mut fetcher = StubFetcher::new(dir.path());
    fetcher.failing.push("bad".into());
    let mut pre = Predownloader::new(fetcher, &config(dir.path(), 3)).unwrap();

    pre.request("bad", MediaKind::Picture);
    let events = wait_for_events(&mut pre, 1);
    assert!(matches!(&events[..], [PredownloadEvent::Failed { key, .. }] if key == "bad"));
    assert!(matches!(pre.state("bad"), PredownloadState::Failed(_)));
    assert!(pre.cache().is_empty());

    assert!(pre.request("bad", MediaKind::Picture), "failed items may be requested again");
}

#[test]
fn test_cancelled_result_is_discarded_and_file_deleted() {
    let dir = tempdir().unwrap();
    let fetcher = StubFetcher::new(dir.path());
    fetcher.hold.store(true, Ordering::SeqCst);
    let started = Arc::clone(&fetcher.started);
    let finished = Arc::clone(&fetcher.finished);
    let mut pre = Predownloader::new(fetcher, &config(dir.path(), 3)).unwrap();

    pre.request("a", MediaKind::Video);
    // Cancel only once the worker is inside the fetch
    let deadline = Instant::now() + Duration::from_secs(5);
    while started.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    pre.cancel("a");
    assert_eq!(pre.state("a"), PredownloadState::Idle);

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut events = Vec::new();
    while (finished.load(Ordering::SeqCst) == 0 || file_count(dir.path()) > 0) && Instant::now() < deadline {
        events.extend(pre.poll_timeout(Duration::from_millis(20)));
    }

    assert_eq!(finished.load(Ordering::SeqCst), 1);
    assert!(events.is_empty());
    assert!(pre.cache().is_empty());
    assert_eq!(file_count(dir.path()), 0);
}

#[test]
fn test_direction_change_reverses_purge_and_cancels() {
    let dir = tempdir().unwrap();
    let fetcher = StubFetcher::new(dir.path());
    fetcher.hold.store(true, Ordering::SeqCst);
    let mut pre = Predownloader::new(fetcher, &config(dir.path(), 3)).unwrap();

    pre.request("a", MediaKind::Video);
    pre.request("b", MediaKind::Video);
    assert_eq!(pre.in_flight(), 2);

    assert!(!pre.set_direction(BrowseDirection::Forward), "no change");
    assert!(pre.set_direction(BrowseDirection::Backward));
    assert!(pre.cache().purge_reversed());
    assert_eq!(pre.in_flight(), 0);
    assert_eq!(pre.state("a"), PredownloadState::Idle);

    assert!(pre.set_direction(BrowseDirection::Forward));
    assert!(!pre.cache().purge_reversed());
}

#[test]
fn test_reset_clears_cache_and_files() {
    let dir = tempdir().unwrap();
    let mut pre = Predownloader::new(StubFetcher::new(dir.path()), &config(dir.path(), 3)).unwrap();

    pre.request("a", MediaKind::Video);
    pre.request("b", MediaKind::Video);
    wait_for_events(&mut pre, 2);
    assert_eq!(pre.cache().len(), 2);
    assert_eq!(file_count(dir.path()), 2);

    pre.set_direction(BrowseDirection::Backward);
    pre.reset();

    assert!(pre.cache().is_empty());
    assert_eq!(file_count(dir.path()), 0);
    assert_eq!(pre.state("a"), PredownloadState::Idle);
    assert_eq!(pre.direction(), BrowseDirection::Forward);
    assert!(!pre.cache().purge_reversed());
}

#[test]
fn test_out_of_order_completion_keeps_request_order() {
    let dir = tempdir().unwrap();
    let mut fetcher = StubFetcher::new(dir.path());
    fetcher.delays.insert("slow".into(), Duration::from_millis(150));
    let mut pre = Predownloader::new(fetcher, &config(dir.path(), 3).with_purge_by_added_date(true)).unwrap();

    pre.request("slow", MediaKind::Video);
    thread::sleep(Duration::from_millis(5));
    pre.request("fast", MediaKind::Video);

    let events = wait_for_events(&mut pre, 2);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0], PredownloadEvent::Completed { key: "fast".into() });

    let slow = pre.cache().added_at("slow").unwrap();
    let fast = pre.cache().added_at("fast").unwrap();
    assert!(slow < fast);
    assert_eq!(pre.cache().purge_candidate(), Some("slow"));
}

#[test]
fn test_eviction_under_predownload_pressure_respects_capacity() {
    let dir = tempdir().unwrap();
    let mut pre = Predownloader::new(StubFetcher::new(dir.path()), &config(dir.path(), 2)).unwrap();

    for key in ["a", "b", "c", "d"] {
        pre.request(key, MediaKind::Video);
    }
    wait_for_events(&mut pre, 4);

    assert_eq!(pre.cache().len(), 2);
    assert_eq!(file_count(dir.path()), 2);
}

#[test]
fn test_request_for_cached_item_does_not_count_as_lookup() {
    let dir = tempdir().unwrap();
    let mut pre = Predownloader::new(StubFetcher::new(dir.path()), &config(dir.path(), 2)).unwrap();

    for key in ["a", "b"] {
        pre.request(key, MediaKind::Video);
        wait_for_events(&mut pre, 1);
    }
    assert!(!pre.request("a", MediaKind::Video));
    assert_eq!(pre.cache().purge_candidate(), Some("a"));

    pre.request("c", MediaKind::Video);
    wait_for_events(&mut pre, 1);
    assert!(!pre.cache().contains("a"));
    assert!(pre.cache().contains("b"));
}
