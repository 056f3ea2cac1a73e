//! Media chooser cache
//!
//! A fixed-capacity cache for downloaded pictures and videos, each backed by
//! a temp file it owns until a consumer claims it, plus the predownload
//! machinery that keeps the next items of a swipe-through chooser ready.

pub mod cache;
pub mod catalog;
pub mod chooser;
pub mod config;
pub mod error;
pub mod prefetch;

pub use cache::{BoundedMediaCache, CacheItem, CachedMedia, MediaKind, PurgePolicy, TempFileHandle};
pub use chooser::{ChooserCallbacks, MediaChooser, SelectedMedia};
pub use config::CacheConfig;
pub use prefetch::{BrowseDirection, MediaFetcher, PredownloadState, Predownloader};
