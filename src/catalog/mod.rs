// Catalog module - a local directory standing in for the remote media service
mod local_fetcher;

pub use local_fetcher::LocalFileFetcher;

use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use crate::cache::MediaKind;

/// Directories to skip
const SKIP_DIRS: &[&str] = &["node_modules", "__MACOSX", ".Trash", ".Spotlight-V100", ".fseventsd"];

/// Video clips under a directory with this name are animated overlays
const OVERLAY_DIR: &str = "overlays";

/// One browsable item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogItem {
    /// Path relative to the catalog root, using `/` separators
    pub key: String,
    pub kind: MediaKind,
    pub source_path: PathBuf,
    pub file_name: String,
    pub file_size: u64,
}

/// Find all pictures and videos under `root`, ordered by key
pub fn scan_catalog(root: &Path) -> Vec<CatalogItem> {
    let mut items: Vec<CatalogItem> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            // Skip hidden files and directories, but never the root itself
            if entry.depth() > 0 && name.starts_with('.') {
                return false;
            }
            if entry.file_type().is_dir() {
                return !SKIP_DIRS.contains(&name.as_ref());
            }
            true
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| catalog_item(root, entry.path()))
        .collect();

    items.sort_by(|a, b| a.key.cmp(&b.key));
    tracing::info!("Catalog {}: {} items", root.display(), items.len());
    items
}

fn catalog_item(root: &Path, path: &Path) -> Option<CatalogItem> {
    let ext = path.extension()?.to_string_lossy();
    let mut kind = MediaKind::from_extension(&ext)?;

    let relative = path.strip_prefix(root).ok()?;
    let in_overlay_dir = relative
        .parent()
        .into_iter()
        .flat_map(Path::components)
        .any(|c| c.as_os_str() == OVERLAY_DIR);
    if kind == MediaKind::Video && in_overlay_dir {
        kind = MediaKind::Overlay;
    }

    Some(CatalogItem {
        key: key_for(relative),
        kind,
        source_path: path.to_path_buf(),
        file_name: path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default(),
        file_size: std::fs::metadata(path).map(|m| m.len()).unwrap_or(0),
    })
}

/// Catalog key for a path relative to the root
fn key_for(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolve a catalog key back to a file under `root`.
/// Keys that try to leave the root resolve to nothing.
pub fn resolve_key(root: &Path, key: &str) -> Option<PathBuf> {
    let relative = Path::new(key);
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if key.is_empty() || escapes {
        return None;
    }
    Some(root.join(relative))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn scan_finds_media_and_skips_hidden() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("overlays")).unwrap();
        std::fs::create_dir_all(dir.path().join(".hidden")).unwrap();
        std::fs::write(dir.path().join("b.mp4"), b"video").unwrap();
        std::fs::write(dir.path().join("a.png"), b"png").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"text").unwrap();
        std::fs::write(dir.path().join("overlays/snow.mov"), b"overlay").unwrap();
        std::fs::write(dir.path().join(".hidden/c.mp4"), b"hidden").unwrap();

        let items = scan_catalog(dir.path());
        let keys: Vec<_> = items.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["a.png", "b.mp4", "overlays/snow.mov"]);
        assert_eq!(items[0].kind, MediaKind::Picture);
        assert_eq!(items[1].kind, MediaKind::Video);
        assert_eq!(items[1].file_size, 5);
        assert_eq!(items[2].kind, MediaKind::Overlay);
    }

    #[test]
    fn resolve_rejects_escaping_keys() {
        let root = Path::new("/catalog");
        assert_eq!(resolve_key(root, "overlays/snow.mov"), Some(root.join("overlays/snow.mov")));
        assert_eq!(resolve_key(root, "../etc/passwd"), None);
        assert_eq!(resolve_key(root, "/etc/passwd"), None);
        assert_eq!(resolve_key(root, ""), None);
    }
}
