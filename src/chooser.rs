// Swipe-through media chooser - navigation, predownload scheduling and selection
use std::path::PathBuf;
use std::time::Duration;

use image::RgbaImage;

use crate::cache::{CachedMedia, MediaKind};
use crate::catalog::CatalogItem;
use crate::config::CacheConfig;
use crate::error::ConfigError;
use crate::prefetch::{
    BrowseDirection, MediaFetcher, PickupStatus, PredownloadEvent, Predownloader,
};

/// Hooks the chooser calls back into its host UI
pub struct ChooserCallbacks {
    /// Current item is not cached yet; show a loading indicator
    pub on_loading: Box<dyn FnMut(&CatalogItem)>,
    /// Current item is ready to display
    pub on_item_ready: Box<dyn FnMut(&CatalogItem, &CachedMedia)>,
    /// Current item could not be downloaded
    pub on_failed: Box<dyn FnMut(&CatalogItem, &str)>,
}

impl Default for ChooserCallbacks {
    fn default() -> Self {
        Self {
            on_loading: Box::new(|_: &CatalogItem| {}),
            on_item_ready: Box::new(|_: &CatalogItem, _: &CachedMedia| {}),
            on_failed: Box::new(|_: &CatalogItem, _: &str| {}),
        }
    }
}

impl std::fmt::Debug for ChooserCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChooserCallbacks").finish_non_exhaustive()
    }
}

/// What the user picked
#[derive(Debug, Clone)]
pub struct SelectedMedia {
    pub key: String,
    pub kind: MediaKind,
    /// Downloaded file, now owned by the caller. `None` for in-memory pictures.
    pub path: Option<PathBuf>,
    pub preview: Option<RgbaImage>,
}

/// Browses one result set, keeping neighbours predownloaded
#[derive(Debug)]
pub struct MediaChooser {
    predownloader: Predownloader,
    items: Vec<CatalogItem>,
    index: usize,
    predownload_ahead: usize,
    callbacks: ChooserCallbacks,
}

impl MediaChooser {
    pub fn new<F: MediaFetcher>(
        fetcher: F,
        config: &CacheConfig,
        callbacks: ChooserCallbacks,
    ) -> Result<Self, ConfigError> {
        let predownloader = Predownloader::new(fetcher, config)?;
        // The current item needs a slot too
        let predownload_ahead = config.predownload_ahead.min(config.capacity.saturating_sub(1));

        Ok(Self {
            predownloader,
            items: Vec::new(),
            index: 0,
            predownload_ahead,
            callbacks,
        })
    }

    /// Replace the result set, e.g. after a new search
    pub fn set_results(&mut self, items: Vec<CatalogItem>) {
        self.predownloader.reset();
        self.items = items;
        self.index = 0;
        tracing::info!("Chooser showing {} results", self.items.len());

        if !self.items.is_empty() {
            self.show_current();
            self.schedule_predownloads();
        }
    }

    /// Move to the next item. Returns false at the end of the list.
    pub fn next(&mut self) -> bool {
        if self.index + 1 >= self.items.len() {
            return false;
        }
        self.index += 1;
        self.navigated(BrowseDirection::Forward);
        true
    }

    /// Move to the previous item. Returns false at the start of the list.
    pub fn previous(&mut self) -> bool {
        if self.index == 0 || self.items.is_empty() {
            return false;
        }
        self.index -= 1;
        self.navigated(BrowseDirection::Backward);
        true
    }

    /// Apply finished downloads and notify the host about the current item
    pub fn pump(&mut self) -> Vec<PredownloadEvent> {
        let events = self.predownloader.poll();
        self.route(&events);
        events
    }

    /// Like `pump`, but wait up to `timeout` for something to finish
    pub fn pump_timeout(&mut self, timeout: Duration) -> Vec<PredownloadEvent> {
        let events = self.predownloader.poll_timeout(timeout);
        self.route(&events);
        events
    }

    /// Take the current item.
    ///
    /// The backing file is claimed, so it survives eviction and `clear`.
    /// Returns `None` while the item is still loading.
    pub fn select(&mut self) -> Option<SelectedMedia> {
        let item = self.items.get(self.index)?;
        let media = self.predownloader.cache_mut().get_mut(&item.key)?;

        let path = media.claim_file();
        let selected = SelectedMedia {
            key: item.key.clone(),
            kind: item.kind,
            path,
            preview: media.preview().cloned(),
        };
        tracing::info!("Selected {}", selected.key);
        Some(selected)
    }

    pub fn current(&self) -> Option<&CatalogItem> {
        self.items.get(self.index)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// One-based position of the current item and the result count;
    /// `(0, 0)` for an empty result set
    pub fn position(&self) -> (usize, usize) {
        if self.items.is_empty() {
            (0, 0)
        } else {
            (self.index + 1, self.items.len())
        }
    }

    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    pub fn predownloader(&self) -> &Predownloader {
        &self.predownloader
    }

    fn navigated(&mut self, direction: BrowseDirection) {
        self.predownloader.set_direction(direction);
        self.show_current();
        self.schedule_predownloads();
    }

    /// Pick up the current item, or start loading it
    fn show_current(&mut self) {
        let Some(item) = self.items.get(self.index) else {
            return;
        };

        let mut status = self.predownloader.pick_up(&item.key);
        if status == PickupStatus::Missing {
            self.predownloader.request(&item.key, item.kind);
            status = self.predownloader.pick_up(&item.key);
        }

        match status {
            PickupStatus::Ready => {
                if let Some(media) = self.predownloader.cache_mut().get(&item.key) {
                    (self.callbacks.on_item_ready)(item, media);
                }
            }
            PickupStatus::Pending | PickupStatus::Missing => (self.callbacks.on_loading)(item),
        }
    }

    /// Queue the next few items in the browsing direction
    fn schedule_predownloads(&mut self) {
        let upcoming: Vec<usize> = match self.predownloader.direction() {
            BrowseDirection::Forward => (self.index + 1..self.items.len())
                .take(self.predownload_ahead)
                .collect(),
            BrowseDirection::Backward => (0..self.index).rev().take(self.predownload_ahead).collect(),
        };

        for i in upcoming {
            let item = &self.items[i];
            self.predownloader.request(&item.key, item.kind);
        }
    }

    fn route(&mut self, events: &[PredownloadEvent]) {
        let Some(current) = self.items.get(self.index) else {
            return;
        };

        for event in events {
            match event {
                PredownloadEvent::PickedUp { key } if *key == current.key => {
                    if let Some(media) = self.predownloader.cache_mut().get(key) {
                        (self.callbacks.on_item_ready)(current, media);
                    }
                }
                PredownloadEvent::Failed { key, error } if *key == current.key => {
                    (self.callbacks.on_failed)(current, error);
                }
                _ => {}
            }
        }
    }
}
