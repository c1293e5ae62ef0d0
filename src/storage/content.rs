//! Filesystem content store
//!
//! Blobs live under a root directory at paths derived from their SHA-256
//! hash, fanned out over two directory levels.

use crate::storage::traits::{ContentStore, StorageError, StorageResult};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Distinguishes temp files of concurrent writers within one process
static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Storage path for extracted page text
pub fn page_path(content_hash: &str) -> String {
    format!("pages/{}", sharded(content_hash, "txt"))
}

/// Storage path for a media file
pub fn media_path(file_hash: &str, extension: &str) -> String {
    format!("media/{}", sharded(file_hash, extension))
}

fn sharded(hash: &str, extension: &str) -> String {
    match (hash.get(0..2), hash.get(2..4)) {
        (Some(a), Some(b)) => format!("{}/{}/{}.{}", a, b, hash, extension),
        _ => format!("{}.{}", hash, extension),
    }
}

/// Content store rooted at a local directory
#[derive(Debug, Clone)]
pub struct FsContentStore {
    root: PathBuf,
}

impl FsContentStore {
    /// Creates the store, creating the root directory if needed
    pub fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a relative store path, refusing anything that escapes the root
    fn resolve(&self, path: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(path);
        let clean = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !clean {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl ContentStore for FsContentStore {
    fn exists(&self, path: &str) -> StorageResult<bool> {
        Ok(self.resolve(path)?.is_file())
    }

    fn put(&self, path: &str, bytes: &[u8], content_type: &str) -> StorageResult<String> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        // Rename is atomic on one filesystem, so readers never see partial blobs
        let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = target.with_extension(format!("tmp{}-{}", std::process::id(), seq));
        fs::write(&tmp, bytes)?;
        if let Err(e) = fs::rename(&tmp, &target) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        tracing::trace!(path, content_type, size = bytes.len(), "Stored blob");
        Ok(path.to_string())
    }

    fn get(&self, locator: &str) -> StorageResult<Vec<u8>> {
        Ok(fs::read(self.resolve(locator)?)?)
    }
}
