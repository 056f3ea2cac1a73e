// Cache module
// Contains: bounded key-value cache, owned temp files, cached media payloads

mod bounded_cache;
mod media;
mod temp_file;

use std::path::Path;

pub use bounded_cache::BoundedMediaCache;
pub use media::{CachedMedia, CachedPicture, CachedVideo, MediaKind};
pub use temp_file::{key_digest, TempFileHandle};

/// Which entry goes first when the cache is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PurgePolicy {
    /// Evict the entry with the oldest added date
    AddedDate,
    /// Evict the entry looked up least recently
    #[default]
    LastAccessed,
}

impl PurgePolicy {
    pub fn from_added_date_flag(purge_by_added_date: bool) -> Self {
        if purge_by_added_date {
            PurgePolicy::AddedDate
        } else {
            PurgePolicy::LastAccessed
        }
    }
}

/// Something that can live in a `BoundedMediaCache`
pub trait CacheItem {
    /// Re-check that the payload is still usable, e.g. its file still exists.
    /// Invalid items are treated as cache misses and dropped.
    fn is_valid(&mut self) -> bool {
        true
    }

    /// File on disk this item owns, if any
    fn backing_file(&self) -> Option<&Path> {
        None
    }

    /// Stop owning the backing file without deleting it
    fn release_backing_file(&mut self) {}
}
