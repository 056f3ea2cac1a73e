// Error types for configuration and media fetching
use std::path::PathBuf;

use thiserror::Error;

/// Problems loading or validating a `CacheConfig`
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cache capacity must be at least 1")]
    ZeroCapacity,

    #[error("at least one download worker is required")]
    ZeroWorkers,

    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Why a predownload did not produce a cache entry
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request's cancel token fired; partial files are already gone
    #[error("download cancelled")]
    Cancelled,

    #[error("no such item: {0}")]
    NotFound(String),

    #[error("I/O error while downloading")]
    Io(#[from] std::io::Error),

    #[error("could not decode downloaded media")]
    Decode(#[from] image::ImageError),
}

impl FetchError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}
