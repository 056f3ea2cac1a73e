// Local "download" - copies catalog files into owned temp files
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use image::RgbaImage;

use super::resolve_key;
use crate::cache::{CachedMedia, CachedPicture, CachedVideo, TempFileHandle};
use crate::error::FetchError;
use crate::prefetch::{CancelToken, FetchRequest, MediaFetcher};

/// Copy granularity; cancellation is checked between chunks
const CHUNK_SIZE: usize = 64 * 1024;

/// Max preview width, aspect ratio is kept
const PREVIEW_WIDTH: u32 = 320;

/// Picture extensions tried when looking for a video's sidecar thumbnail
const SIDECAR_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Fetches catalog items from a local directory
#[derive(Debug, Clone)]
pub struct LocalFileFetcher {
    root: PathBuf,
    temp_dir: PathBuf,
}

impl LocalFileFetcher {
    pub fn new(root: impl Into<PathBuf>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            temp_dir: temp_dir.into(),
        }
    }

    /// Copy `source` into a fresh temp file, honouring `cancel`
    fn download(&self, key: &str, source: &Path, cancel: &CancelToken) -> Result<TempFileHandle, FetchError> {
        let ext = source
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_default();
        let mut input = File::open(source)?;
        // If anything below fails, dropping the handle removes the partial file
        let (handle, mut output) = TempFileHandle::create_in(&self.temp_dir, key, &ext)?;

        let mut buffer = vec![0u8; CHUNK_SIZE];
        loop {
            cancel.check()?;
            let n = input.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            output.write_all(&buffer[..n])?;
        }
        output.flush()?;

        Ok(handle)
    }
}

impl MediaFetcher for LocalFileFetcher {
    fn fetch(&self, request: &FetchRequest, cancel: &CancelToken) -> Result<CachedMedia, FetchError> {
        let source = resolve_key(&self.root, &request.key)
            .filter(|p| p.is_file())
            .ok_or_else(|| FetchError::NotFound(request.key.clone()))?;

        let file = self.download(&request.key, &source, cancel)?;
        cancel.check()?;

        if request.kind.is_video_like() {
            let video = match sidecar_preview(&source) {
                Some(preview) => CachedVideo::with_preview(file, preview),
                None => CachedVideo::new(file),
            };
            return Ok(CachedMedia::Video(video));
        }

        let image = image::open(file.path())?.to_rgba8();
        Ok(CachedMedia::Picture(CachedPicture::with_file(image, file)))
    }
}

/// Thumbnail stored next to a video as `<stem>.jpg` / `.png`
fn sidecar_preview(video: &Path) -> Option<RgbaImage> {
    let sidecar = SIDECAR_EXTENSIONS
        .iter()
        .map(|ext| video.with_extension(ext))
        .find(|p| p.is_file())?;

    match image::open(&sidecar) {
        Ok(img) => Some(scale_preview(img.to_rgba8())),
        Err(e) => {
            tracing::debug!("Ignoring unreadable thumbnail {}: {}", sidecar.display(), e);
            None
        }
    }
}

fn scale_preview(image: RgbaImage) -> RgbaImage {
    let (width, height) = image.dimensions();
    if width <= PREVIEW_WIDTH {
        return image;
    }
    let preview_height = ((height as f32 * (PREVIEW_WIDTH as f32 / width as f32)) as u32).max(1);
    image::imageops::thumbnail(&image, PREVIEW_WIDTH, preview_height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MediaKind;
    use chrono::Utc;
    use tempfile::tempdir;

    fn request(key: &str, kind: MediaKind) -> FetchRequest {
        FetchRequest {
            key: key.to_string(),
            kind,
            requested_at: Utc::now(),
        }
    }

    #[test]
    fn video_is_copied_into_owned_temp_file() {
        let catalog = tempdir().unwrap();
        let temp = tempdir().unwrap();
        std::fs::write(catalog.path().join("clip.mp4"), vec![7u8; CHUNK_SIZE * 2 + 3]).unwrap();
        RgbaImage::new(640, 360).save(catalog.path().join("clip.png")).unwrap();

        let fetcher = LocalFileFetcher::new(catalog.path(), temp.path());
        let media = fetcher
            .fetch(&request("clip.mp4", MediaKind::Video), &CancelToken::new())
            .unwrap();

        let CachedMedia::Video(video) = &media else {
            panic!("expected a video");
        };
        assert!(video.file.is_owner());
        assert_eq!(std::fs::metadata(video.file.path()).unwrap().len(), (CHUNK_SIZE * 2 + 3) as u64);
        assert_eq!(video.preview.as_ref().map(|p| p.dimensions()), Some((320, 180)));

        let path = video.file.path().to_path_buf();
        drop(media);
        assert!(!path.exists());
    }

    #[test]
    fn picture_is_decoded() {
        let catalog = tempdir().unwrap();
        let temp = tempdir().unwrap();
        RgbaImage::new(12, 8).save(catalog.path().join("still.png")).unwrap();

        let fetcher = LocalFileFetcher::new(catalog.path(), temp.path());
        let media = fetcher
            .fetch(&request("still.png", MediaKind::Picture), &CancelToken::new())
            .unwrap();
        assert_eq!(media.preview().map(|p| p.dimensions()), Some((12, 8)));
        assert!(media.file().is_some());
    }

    #[test]
    fn cancelled_fetch_leaves_no_partial_file() {
        let catalog = tempdir().unwrap();
        let temp = tempdir().unwrap();
        std::fs::write(catalog.path().join("clip.mp4"), b"data").unwrap();

        let token = CancelToken::new();
        token.cancel();
        let fetcher = LocalFileFetcher::new(catalog.path(), temp.path());
        let err = fetcher.fetch(&request("clip.mp4", MediaKind::Video), &token).unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[test]
    fn unknown_key_is_not_found() {
        let catalog = tempdir().unwrap();
        let temp = tempdir().unwrap();
        let fetcher = LocalFileFetcher::new(catalog.path(), temp.path());
        let err = fetcher
            .fetch(&request("missing.mp4", MediaKind::Video), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, FetchError::NotFound(_)));
    }
}
