// Chooser configuration - passed explicitly into the cache and predownloader
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Settings for one media chooser's cache and predownload pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached items
    pub capacity: usize,
    /// Evict the oldest-added entry instead of the least recently accessed one
    pub purge_by_added_date: bool,
    /// How many items ahead of the current one to predownload
    pub predownload_ahead: usize,
    /// Background download threads
    pub workers: usize,
    /// Where downloaded files are written
    pub temp_dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 5,
            purge_by_added_date: false,
            predownload_ahead: 2,
            workers: 2,
            temp_dir: default_temp_dir(),
        }
    }
}

impl CacheConfig {
    /// Load a JSON config file; missing fields take their defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the cache cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        Ok(())
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_purge_by_added_date(mut self, enabled: bool) -> Self {
        self.purge_by_added_date = enabled;
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_predownload_ahead(mut self, ahead: usize) -> Self {
        self.predownload_ahead = ahead;
        self
    }
}

/// Per-user cache directory for downloads
fn default_temp_dir() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("com", "mediachooser", "MediaChooser") {
        proj_dirs.cache_dir().join("downloads")
    } else {
        // Fallback to the system temp directory
        std::env::temp_dir().join("media-chooser")
    }
}
