// Owned temp file handle - deletes its file on drop unless ownership was claimed
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use md5::{Digest, Md5};

/// Per-process counter so two downloads of the same key never share a path
static NEXT_SUFFIX: AtomicU64 = AtomicU64::new(0);

/// Handle to a downloaded file living in the temp directory.
///
/// While `is_owner()` is true the handle deletes the file exactly once, when
/// it is dropped. `claim()` hands the path to someone else and turns the
/// handle into a plain reference that never touches the file again.
#[derive(Debug)]
pub struct TempFileHandle {
    path: PathBuf,
    owner: bool,
    invalid: bool,
}

impl TempFileHandle {
    /// Take ownership of an existing file
    pub fn adopt(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            owner: true,
            invalid: false,
        }
    }

    /// Create an empty, owned file under `dir` named after `key`
    pub fn create_in(dir: &Path, key: &str, extension: &str) -> io::Result<(Self, File)> {
        std::fs::create_dir_all(dir)?;

        let suffix = NEXT_SUFFIX.fetch_add(1, Ordering::Relaxed);
        let name = format!(
            "{}_{}_{}.{}",
            key_digest(key),
            std::process::id(),
            suffix,
            extension.trim_start_matches('.')
        );
        let path = dir.join(name);
        let file = File::create(&path)?;

        Ok((Self::adopt(path), file))
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether dropping this handle deletes the file
    pub fn is_owner(&self) -> bool {
        self.owner
    }

    /// Check the file is still on disk.
    ///
    /// The OS may sweep temp directories behind our back, so once the file is
    /// found missing the handle stays invalid.
    pub fn is_valid(&mut self) -> bool {
        if self.invalid {
            return false;
        }
        if !self.path.is_file() {
            tracing::debug!("Temp file vanished: {}", self.path.display());
            self.invalid = true;
        }
        !self.invalid
    }

    /// Mark the handle unusable without deleting anything
    pub fn invalidate(&mut self) {
        self.invalid = true;
    }

    /// Transfer ownership of the file to the caller.
    ///
    /// Returns `None` if the file is gone. Either way the handle stops owning
    /// the path, so dropping it afterwards leaves the disk untouched.
    pub fn claim(&mut self) -> Option<PathBuf> {
        let valid = self.is_valid();
        if self.owner {
            tracing::debug!("Ownership of {} transferred", self.path.display());
        }
        self.owner = false;
        valid.then(|| self.path.clone())
    }

    /// Give up ownership without checking the file
    pub fn release(&mut self) {
        self.owner = false;
    }
}

impl Drop for TempFileHandle {
    fn drop(&mut self) {
        if !self.owner {
            return;
        }
        // Best effort: the file may already be gone
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::trace!("Could not remove {}: {}", self.path.display(), e);
        }
    }
}

/// Hex md5 digest of a cache key, safe to use in file names
pub fn key_digest(key: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}
