// Cached media payloads - decoded pictures and temp-file backed videos
use std::path::PathBuf;

use image::RgbaImage;
use serde::Serialize;

use super::temp_file::TempFileHandle;
use super::CacheItem;

/// Kind of remote item a chooser browses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Picture,
    Video,
    /// Animated overlay clip, stored like a video
    Overlay,
}

impl MediaKind {
    /// Guess the kind from a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_lowercase().as_str() {
            "jpg" | "jpeg" | "png" | "gif" | "bmp" | "webp" | "tiff" => Some(MediaKind::Picture),
            "mov" | "mp4" | "m4v" | "avi" | "mkv" | "webm" => Some(MediaKind::Video),
            _ => None,
        }
    }

    pub fn is_video_like(self) -> bool {
        matches!(self, MediaKind::Video | MediaKind::Overlay)
    }
}

/// A downloaded picture, decoded in memory
#[derive(Debug)]
pub struct CachedPicture {
    pub image: RgbaImage,
    /// Downloaded original, if it was kept on disk
    pub file: Option<TempFileHandle>,
}

impl CachedPicture {
    pub fn new(image: RgbaImage) -> Self {
        Self { image, file: None }
    }

    pub fn with_file(image: RgbaImage, file: TempFileHandle) -> Self {
        Self {
            image,
            file: Some(file),
        }
    }
}

/// A downloaded video (or overlay) backed by a temp file
#[derive(Debug)]
pub struct CachedVideo {
    pub file: TempFileHandle,
    /// First frame or thumbnail, small enough to show while loading
    pub preview: Option<RgbaImage>,
}

impl CachedVideo {
    pub fn new(file: TempFileHandle) -> Self {
        Self { file, preview: None }
    }

    pub fn with_preview(file: TempFileHandle, preview: RgbaImage) -> Self {
        Self {
            file,
            preview: Some(preview),
        }
    }
}

/// Anything a media chooser keeps in its cache
#[derive(Debug)]
pub enum CachedMedia {
    Picture(CachedPicture),
    Video(CachedVideo),
}

impl CachedMedia {
    /// Backing file handle, if any
    pub fn file(&self) -> Option<&TempFileHandle> {
        match self {
            CachedMedia::Picture(p) => p.file.as_ref(),
            CachedMedia::Video(v) => Some(&v.file),
        }
    }

    pub fn file_mut(&mut self) -> Option<&mut TempFileHandle> {
        match self {
            CachedMedia::Picture(p) => p.file.as_mut(),
            CachedMedia::Video(v) => Some(&mut v.file),
        }
    }

    /// Small image to show for this item: the picture itself or the video preview
    pub fn preview(&self) -> Option<&RgbaImage> {
        match self {
            CachedMedia::Picture(p) => Some(&p.image),
            CachedMedia::Video(v) => v.preview.as_ref(),
        }
    }

    /// Take over the backing file so it outlives the cache entry
    pub fn claim_file(&mut self) -> Option<PathBuf> {
        self.file_mut().and_then(TempFileHandle::claim)
    }
}

impl CacheItem for CachedMedia {
    fn is_valid(&mut self) -> bool {
        match self.file_mut() {
            Some(file) => file.is_valid(),
            // In-memory picture without a file never goes stale
            None => true,
        }
    }

    fn backing_file(&self) -> Option<&std::path::Path> {
        self.file().map(TempFileHandle::path)
    }

    fn release_backing_file(&mut self) {
        if let Some(file) = self.file_mut() {
            file.release();
        }
    }
}
