// Predownload module
// Contains: fetch seam, background workers, per-item predownload state machine

mod fetcher;
mod worker;

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;

pub use fetcher::{CancelToken, FetchRequest, MediaFetcher};

use crate::cache::{BoundedMediaCache, CachedMedia, MediaKind};
use crate::config::CacheConfig;
use crate::error::ConfigError;
use worker::{FetchOutcome, WorkerPool};

/// Where the user is swiping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BrowseDirection {
    #[default]
    Forward,
    Backward,
}

/// Lifecycle of one item's predownload
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PredownloadState {
    #[default]
    Idle,
    Downloading,
    Completed,
    Failed(String),
    /// Handed to the chooser for display
    PickedUp,
}

/// Something the owner should react to after `poll`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredownloadEvent {
    /// Landed in the cache, nobody is waiting for it yet
    Completed { key: String },
    /// Landed in the cache while the chooser was waiting for it
    PickedUp { key: String },
    Failed { key: String, error: String },
}

/// Answer to `pick_up`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickupStatus {
    /// In the cache now; read it with `cache_mut().get(key)`
    Ready,
    /// Still downloading; a `PredownloadEvent::PickedUp` follows
    Pending,
    /// Not cached and not downloading; call `request` first
    Missing,
}

#[derive(Debug, Default)]
struct Tracked {
    state: PredownloadState,
    token: Option<CancelToken>,
    pickup_pending: bool,
}

/// Owns a chooser's cache and the background downloads that fill it.
///
/// Everything here runs on the owning thread; workers only fetch. Each
/// request carries its own `CancelToken`, so a result arriving after a
/// cancel or a `reset` is recognised as stale and dropped, which deletes
/// whatever temp file it brought along.
pub struct Predownloader {
    cache: BoundedMediaCache<CachedMedia>,
    tracked: HashMap<String, Tracked>,
    direction: BrowseDirection,
    // Declared last so it drops after the cache; Drop cancels jobs first
    workers: WorkerPool,
}

impl Predownloader {
    /// Create a predownloader with a fresh cache sized from `config`
    pub fn new<F: MediaFetcher>(fetcher: F, config: &CacheConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let cache = BoundedMediaCache::from_config(config)?;
        tracing::info!(
            "Predownloader ready: capacity {}, policy {:?}, {} workers",
            cache.capacity(),
            cache.policy(),
            config.workers
        );

        Ok(Self {
            cache,
            tracked: HashMap::new(),
            direction: BrowseDirection::Forward,
            workers: WorkerPool::spawn(fetcher, config.workers),
        })
    }

    pub fn cache(&self) -> &BoundedMediaCache<CachedMedia> {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut BoundedMediaCache<CachedMedia> {
        &mut self.cache
    }

    pub fn direction(&self) -> BrowseDirection {
        self.direction
    }

    /// Current state for `key`
    pub fn state(&self, key: &str) -> PredownloadState {
        self.tracked
            .get(key)
            .map(|t| t.state.clone())
            .unwrap_or_default()
    }

    /// Number of downloads still in flight
    pub fn in_flight(&self) -> usize {
        self.tracked
            .values()
            .filter(|t| t.state == PredownloadState::Downloading)
            .count()
    }

    /// Start downloading `key` unless it is cached or already downloading.
    /// Returns whether a new download was queued.
    pub fn request(&mut self, key: &str, kind: MediaKind) -> bool {
        if self.cache.contains_valid(key) {
            return false;
        }
        let tracked = self.tracked.entry(key.to_string()).or_default();
        if tracked.state == PredownloadState::Downloading {
            return false;
        }

        let token = CancelToken::new();
        tracked.state = PredownloadState::Downloading;
        tracked.token = Some(token.clone());
        tracked.pickup_pending = false;

        tracing::debug!("Predownload requested: {}", key);
        self.workers.submit(
            FetchRequest {
                key: key.to_string(),
                kind,
                requested_at: Utc::now(),
            },
            token,
        );
        true
    }

    /// Claim `key` for display.
    ///
    /// A downloading item is remembered so that its completion is reported as
    /// `PredownloadEvent::PickedUp` instead of a plain `Completed`.
    pub fn pick_up(&mut self, key: &str) -> PickupStatus {
        if self.cache.get(key).is_some() {
            let tracked = self.tracked.entry(key.to_string()).or_default();
            tracked.state = PredownloadState::PickedUp;
            tracked.pickup_pending = false;
            return PickupStatus::Ready;
        }

        match self.tracked.get_mut(key) {
            Some(tracked) if tracked.state == PredownloadState::Downloading => {
                tracked.pickup_pending = true;
                PickupStatus::Pending
            }
            Some(tracked) => {
                // Completed or picked up earlier but since evicted or gone stale
                tracked.state = PredownloadState::Idle;
                tracked.pickup_pending = false;
                PickupStatus::Missing
            }
            None => PickupStatus::Missing,
        }
    }

    /// Abandon the download for `key`, if any
    pub fn cancel(&mut self, key: &str) {
        if let Some(tracked) = self.tracked.get_mut(key) {
            if tracked.state == PredownloadState::Downloading {
                if let Some(token) = tracked.token.take() {
                    token.cancel();
                }
                tracked.state = PredownloadState::Idle;
                tracked.pickup_pending = false;
                tracing::debug!("Predownload cancelled: {}", key);
            }
        }
    }

    /// Abandon every in-flight download
    pub fn cancel_all(&mut self) {
        let mut cancelled = 0;
        for tracked in self.tracked.values_mut() {
            if tracked.state == PredownloadState::Downloading {
                if let Some(token) = tracked.token.take() {
                    token.cancel();
                }
                tracked.state = PredownloadState::Idle;
                tracked.pickup_pending = false;
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            tracing::debug!("Cancelled {} predownloads", cancelled);
        }
    }

    /// Record the browsing direction.
    ///
    /// A change flips the cache's purge order and cancels all in-flight
    /// predownloads, which were queued for the old direction.
    pub fn set_direction(&mut self, direction: BrowseDirection) -> bool {
        if direction == self.direction {
            return false;
        }
        tracing::debug!("Browse direction {:?} -> {:?}", self.direction, direction);
        self.direction = direction;
        self.cache.reverse_purge_sorting();
        self.cancel_all();
        true
    }

    /// Forget the current result set: cancel downloads and empty the cache
    pub fn reset(&mut self) {
        self.cancel_all();
        self.tracked.clear();
        self.cache.clear();
        if self.direction == BrowseDirection::Backward {
            self.direction = BrowseDirection::Forward;
            self.cache.reverse_purge_sorting();
        }
    }

    /// Apply every finished download without blocking
    pub fn poll(&mut self) -> Vec<PredownloadEvent> {
        let mut events = Vec::new();
        while let Some(outcome) = self.workers.try_next() {
            if let Some(event) = self.apply(outcome) {
                events.push(event);
            }
        }
        events
    }

    /// Like `poll`, but wait up to `timeout` for the first result
    pub fn poll_timeout(&mut self, timeout: Duration) -> Vec<PredownloadEvent> {
        let mut events = Vec::new();
        if let Some(outcome) = self.workers.next_timeout(timeout) {
            if let Some(event) = self.apply(outcome) {
                events.push(event);
            }
        }
        events.extend(self.poll());
        events
    }

    fn apply(&mut self, outcome: FetchOutcome) -> Option<PredownloadEvent> {
        let FetchOutcome {
            request,
            token,
            result,
        } = outcome;
        let key = request.key;

        let tracked = match self.tracked.get_mut(&key) {
            Some(t)
                if !token.is_cancelled()
                    && t.token.as_ref().is_some_and(|current| current.same_request(&token)) =>
            {
                t
            }
            // Dropping a stale result deletes its temp file
            _ => {
                tracing::trace!("Discarding stale predownload result for {}", key);
                return None;
            }
        };
        tracked.token = None;

        match result {
            Ok(media) => {
                let picked_up = std::mem::take(&mut tracked.pickup_pending);
                tracked.state = if picked_up {
                    PredownloadState::PickedUp
                } else {
                    PredownloadState::Completed
                };
                self.cache.add_item(key.clone(), media, request.requested_at);
                tracing::debug!("Predownload finished: {}", key);

                Some(if picked_up {
                    PredownloadEvent::PickedUp { key }
                } else {
                    PredownloadEvent::Completed { key }
                })
            }
            Err(e) if e.is_cancelled() => {
                tracked.state = PredownloadState::Idle;
                tracked.pickup_pending = false;
                None
            }
            Err(e) => {
                tracing::warn!("Predownload of {} failed: {}", key, e);
                let error = e.to_string();
                tracked.state = PredownloadState::Failed(error.clone());
                tracked.pickup_pending = false;
                Some(PredownloadEvent::Failed { key, error })
            }
        }
    }
}

impl Drop for Predownloader {
    fn drop(&mut self) {
        // Let workers skip queued jobs so joining is quick
        self.cancel_all();
    }
}

impl std::fmt::Debug for Predownloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Predownloader")
            .field("cache", &self.cache)
            .field("tracked", &self.tracked.len())
            .field("direction", &self.direction)
            .finish()
    }
}
