// Download seam - whatever turns a remote item id into a cached payload
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::cache::{CachedMedia, MediaKind};
use crate::error::FetchError;

/// Shared flag a caller flips to abandon a download
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Bail out with `FetchError::Cancelled` if the token fired
    pub fn check(&self) -> Result<(), FetchError> {
        if self.is_cancelled() {
            Err(FetchError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Whether two tokens belong to the same request
    pub fn same_request(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// One item to download
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub key: String,
    pub kind: MediaKind,
    /// When the chooser asked for it; becomes the cache entry's added date
    pub requested_at: DateTime<Utc>,
}

/// Producer side of the cache.
///
/// Implementations run on background worker threads. They should poll the
/// token between chunks of work and return `FetchError::Cancelled` promptly.
pub trait MediaFetcher: Send + Sync + 'static {
    fn fetch(&self, request: &FetchRequest, cancel: &CancelToken) -> Result<CachedMedia, FetchError>;
}

impl<F: MediaFetcher> MediaFetcher for Arc<F> {
    fn fetch(&self, request: &FetchRequest, cancel: &CancelToken) -> Result<CachedMedia, FetchError> {
        (**self).fetch(request, cancel)
    }
}
