// Bounded media cache with configurable, reversible purge order
use std::num::NonZeroUsize;

use chrono::{DateTime, Utc};
use lru::LruCache;

use super::{CacheItem, PurgePolicy};
use crate::config::CacheConfig;
use crate::error::ConfigError;

/// Resident entry plus the bookkeeping used to pick eviction victims
#[derive(Debug)]
struct Slot<T> {
    item: T,
    added_at: DateTime<Utc>,
    /// Clock value at insertion, breaks ties between equal added dates
    seq: u64,
    /// Clock value at the last insertion or counted lookup
    touched: u64,
}

/// Fixed-capacity cache of downloaded media keyed by remote item id.
///
/// Entries are kept in an LRU list, which gives access order for free. Added
/// order is derived from the caller-supplied dates so items that finish
/// downloading out of request order still age correctly. Dropping an entry
/// drops its payload, which deletes any temp file the payload still owns.
///
/// Reversing the purge order only affects entries that were resident at
/// the moment of the flip: those go first, newest (or most recently used)
/// first. Once they are gone the regular order applies again, so entries
/// cached for the new browsing direction are not evicted by their own
/// successors.
///
/// The cache is meant to be driven from a single thread (the UI thread in a
/// chooser); every operation takes `&mut self` and never blocks.
pub struct BoundedMediaCache<T: CacheItem> {
    entries: LruCache<String, Slot<T>>,
    capacity: NonZeroUsize,
    policy: PurgePolicy,
    /// Evict from the opposite end (newest / most recently used first)
    reversed: bool,
    /// Clock value when the order was last reversed
    flipped_at: u64,
    clock: u64,
}

impl<T: CacheItem> BoundedMediaCache<T> {
    /// Create a new cache holding at most `capacity` entries
    pub fn new(capacity: NonZeroUsize, policy: PurgePolicy) -> Self {
        Self {
            entries: LruCache::unbounded(),
            capacity,
            policy,
            reversed: false,
            flipped_at: 0,
            clock: 0,
        }
    }

    /// Create a cache sized and configured from `config`
    pub fn from_config(config: &CacheConfig) -> Result<Self, ConfigError> {
        let capacity = NonZeroUsize::new(config.capacity).ok_or(ConfigError::ZeroCapacity)?;
        Ok(Self::new(
            capacity,
            PurgePolicy::from_added_date_flag(config.purge_by_added_date),
        ))
    }

    /// Upper bound on resident entries
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    pub fn policy(&self) -> PurgePolicy {
        self.policy
    }

    /// Insert `item` under `key`, stamped with `added_at`.
    ///
    /// An existing entry for `key` is replaced. Otherwise, when the cache is
    /// full, one entry is evicted according to the purge policy first.
    pub fn add_item(&mut self, key: impl Into<String>, item: T, added_at: DateTime<Utc>) {
        let key = key.into();

        if let Some(existing) = self.entries.peek_mut(&key) {
            // Replacing with a payload that points at the same file must not
            // delete that file when the old payload drops.
            if existing.item.backing_file().is_some()
                && existing.item.backing_file() == item.backing_file()
            {
                existing.item.release_backing_file();
            }
        } else if self.entries.len() >= self.capacity.get() {
            self.evict_one();
        }

        let seq = self.tick();
        let replaced = self.entries.put(
            key.clone(),
            Slot {
                item,
                added_at,
                seq,
                touched: seq,
            },
        );
        if replaced.is_some() {
            tracing::debug!("Replaced cached item {}", key);
        } else {
            tracing::debug!("Cached item {} ({}/{})", key, self.entries.len(), self.capacity);
        }
    }

    /// Look up `key`.
    ///
    /// Returns `None` for unknown keys and for entries whose payload went
    /// stale; stale entries are dropped on the way. Under
    /// `PurgePolicy::LastAccessed` a hit marks the entry as most recently used.
    pub fn get(&mut self, key: &str) -> Option<&T> {
        self.get_mut(key).map(|item| &*item)
    }

    /// Mutable lookup with the same bookkeeping as `get`
    pub fn get_mut(&mut self, key: &str) -> Option<&mut T> {
        if !self.validate(key) {
            return None;
        }
        match self.policy {
            PurgePolicy::LastAccessed => {
                let now = self.tick();
                self.entries.get_mut(key).map(|slot| {
                    slot.touched = now;
                    &mut slot.item
                })
            }
            PurgePolicy::AddedDate => self.entries.peek_mut(key).map(|slot| &mut slot.item),
        }
    }

    /// Check if `key` is resident and still usable, without counting as a
    /// lookup. A stale entry is dropped.
    pub fn contains_valid(&mut self, key: &str) -> bool {
        self.validate(key)
    }

    /// Look up `key` without touching access order or re-validating
    pub fn peek(&self, key: &str) -> Option<&T> {
        self.entries.peek(key).map(|slot| &slot.item)
    }

    /// Check if `key` is resident (without validation)
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains(key)
    }

    /// Added date recorded for `key`
    pub fn added_at(&self, key: &str) -> Option<DateTime<Utc>> {
        self.entries.peek(key).map(|slot| slot.added_at)
    }

    /// Take the payload for `key` out of the cache; the caller now owns it
    pub fn remove(&mut self, key: &str) -> Option<T> {
        self.entries.pop(key).map(|slot| slot.item)
    }

    /// Get the number of cached items
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resident keys, most recently used first
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Drop every entry, deleting all files the cache still owns
    pub fn clear(&mut self) {
        let count = self.entries.len();
        self.entries.clear();
        if count > 0 {
            tracing::debug!("Cleared {} cached items", count);
        }
    }

    /// Flip which end of the purge order gets evicted.
    ///
    /// Called when the user changes browsing direction so that the entries
    /// most likely to be revisited survive longest.
    pub fn reverse_purge_sorting(&mut self) {
        self.reversed = !self.reversed;
        if self.reversed {
            self.flipped_at = self.clock;
        }
        tracing::debug!("Purge order reversed: {}", self.reversed);
    }

    pub fn purge_reversed(&self) -> bool {
        self.reversed
    }

    /// Key that would be evicted by the next insertion into a full cache
    pub fn purge_candidate(&self) -> Option<&str> {
        let victim = if self.reversed {
            self.newest_before_flip().or_else(|| self.oldest())
        } else {
            self.oldest()
        };
        victim.map(String::as_str)
    }

    /// Regular end of the purge order
    fn oldest(&self) -> Option<&String> {
        match self.policy {
            // LruCache iterates most recently used first
            PurgePolicy::LastAccessed => self.entries.iter().next_back().map(|(k, _)| k),
            PurgePolicy::AddedDate => self
                .entries
                .iter()
                .min_by_key(|(_, slot)| (slot.added_at, slot.seq))
                .map(|(k, _)| k),
        }
    }

    /// Reversed end, among entries untouched since the last flip
    fn newest_before_flip(&self) -> Option<&String> {
        let flipped_at = self.flipped_at;
        match self.policy {
            PurgePolicy::LastAccessed => self
                .entries
                .iter()
                .find(|(_, slot)| slot.touched < flipped_at)
                .map(|(k, _)| k),
            PurgePolicy::AddedDate => self
                .entries
                .iter()
                .filter(|(_, slot)| slot.seq < flipped_at)
                .max_by_key(|(_, slot)| (slot.added_at, slot.seq))
                .map(|(k, _)| k),
        }
    }

    fn tick(&mut self) -> u64 {
        let now = self.clock;
        self.clock += 1;
        now
    }

    /// Re-validate `key`, dropping it if stale. Returns whether it is usable.
    fn validate(&mut self, key: &str) -> bool {
        let valid = match self.entries.peek_mut(key) {
            Some(slot) => slot.item.is_valid(),
            None => return false,
        };
        if !valid {
            tracing::debug!("Dropping stale cached item {}", key);
            self.entries.pop(key);
        }
        valid
    }

    fn evict_one(&mut self) {
        let Some(victim) = self.purge_candidate().map(str::to_owned) else {
            return;
        };
        if self.entries.pop(&victim).is_some() {
            tracing::debug!("Evicted cached item {}", victim);
        }
    }
}

impl<T: CacheItem> std::fmt::Debug for BoundedMediaCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedMediaCache")
            .field("len", &self.entries.len())
            .field("capacity", &self.capacity)
            .field("policy", &self.policy)
            .field("reversed", &self.reversed)
            .finish()
    }
}
