use std::{
    fmt,
    path::{Path, PathBuf},
};

use serde::Serialize;

/// One entry returned by a source listing (newest-first order is the source's job).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemDescriptor {
    pub url: String,
    pub title: String,
}

impl ItemDescriptor {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
        }
    }
}

/// Canonical identity of an item, derived from its URL.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(pub String);

impl ItemId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Summary of one scan pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ScanResult {
    /// Valid descriptors returned by the source.
    pub found: usize,
    /// Items selected for delivery (after the cold-start guard).
    pub new: usize,
    /// Items for which rich or text delivery succeeded.
    pub sent: usize,
    /// Items that went out through the text-only path.
    pub fallbacks: usize,
    /// Items where every delivery path failed. They are still recorded.
    pub failed: usize,
}

/// A downloaded media file.
///
/// When `scratch_dir` is set the directory is owned by this value and removed
/// (best-effort) on drop.
#[derive(Debug)]
pub struct MediaFile {
    path: PathBuf,
    scratch_dir: Option<PathBuf>,
}

impl MediaFile {
    /// A file the caller keeps ownership of.
    pub fn borrowed(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            scratch_dir: None,
        }
    }

    /// A file living inside `scratch_dir`, which is deleted with this value.
    pub fn in_scratch_dir(path: impl Into<PathBuf>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            scratch_dir: Some(scratch_dir.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for MediaFile {
    fn drop(&mut self) {
        if let Some(dir) = self.scratch_dir.take() {
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                tracing::debug!(dir = %dir.display(), "failed to remove media scratch dir: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_file_removes_scratch_dir_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let scratch = root.path().join("dl");
        std::fs::create_dir_all(&scratch).unwrap();
        let file = scratch.join("1.mp4");
        std::fs::write(&file, b"x").unwrap();

        let media = MediaFile::in_scratch_dir(&file, &scratch);
        assert_eq!(media.path(), file.as_path());
        drop(media);

        assert!(!scratch.exists());
    }

    #[test]
    fn borrowed_media_file_leaves_file_alone() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("keep.mp4");
        std::fs::write(&file, b"x").unwrap();

        drop(MediaFile::borrowed(&file));

        assert!(file.exists());
    }
}
