// src/store.rs

//! Content-addressed archive store
//!
//! Each distinct archive is extracted once into `packages/<sha256>/`. Two
//! byte-identical archives share the directory no matter what name they
//! declare. Extraction for a given hash is serialized in-process and staged
//! in a temporary sibling directory, so a directory under its final name is
//! always complete.

use crate::config::Layout;
use crate::error::Result;
use crate::packages::archive;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

#[derive(Debug)]
pub struct Store {
    dir: PathBuf,
    in_progress: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Store {
    pub fn new(layout: &Layout) -> Self {
        Self {
            dir: layout.store_dir(),
            in_progress: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Directory for an archive with the given content hash
    pub fn package_dir(&self, hash: &str) -> PathBuf {
        self.dir.join(hash)
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.package_dir(hash).is_dir()
    }

    /// Run `f` while holding the mutex for `hash`
    ///
    /// The map entry is created on first use and dropped again once no other
    /// caller holds or waits on it.
    fn with_hash_lock<T>(&self, hash: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock = {
            let mut locks = self
                .in_progress
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(hash.to_string()).or_default())
        };

        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        let mut locks = self
            .in_progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // One reference is the map's, the other is ours
        if Arc::strong_count(&lock) == 2 {
            locks.remove(hash);
        }
        result
    }

    /// Ensure `archive_path` is extracted under `hash`, returning its directory
    pub fn materialize(&self, archive_path: &Path, hash: &str) -> Result<PathBuf> {
        self.with_hash_lock(hash, || self.extract_once(archive_path, hash))
    }

    fn extract_once(&self, archive_path: &Path, hash: &str) -> Result<PathBuf> {
        let target = self.package_dir(hash);
        if target.is_dir() {
            debug!("Reusing extracted archive {}", target.display());
            return Ok(target);
        }

        fs::create_dir_all(&self.dir)?;
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&self.dir)?;
        archive::extract(archive_path, staging.path())?;

        // keep() disarms cleanup; the rename publishes the finished tree
        let staged = staging.keep();
        if let Err(e) = fs::rename(&staged, &target) {
            let _ = fs::remove_dir_all(&staged);
            return Err(e.into());
        }

        info!("Stored {} as {}", archive_path.display(), hash);
        Ok(target)
    }

    /// Delete the extracted tree for `hash`; a missing directory is not an error
    pub fn remove(&self, hash: &str) -> Result<()> {
        self.with_hash_lock(hash, || match fs::remove_dir_all(self.package_dir(hash)) {
            Ok(()) => {
                debug!("Removed stored archive {}", hash);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        })
    }

    #[cfg(test)]
    fn tracked_hashes(&self) -> usize {
        self.in_progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::TempDir;

    fn packed_archive(temp: &TempDir) -> (PathBuf, String) {
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("data")).unwrap();
        fs::write(
            src.join("package.toml"),
            "[package]\nname = \"stored\"\nversion = \"1.0.0\"\n",
        )
        .unwrap();
        fs::write(src.join("data/file.txt"), "content").unwrap();

        let archive_path = temp.path().join("stored.tar.xz");
        archive::pack(&src, &archive_path).unwrap();
        let hash = archive::content_hash(&archive_path).unwrap();
        (archive_path, hash)
    }

    #[test]
    fn test_materialize_extracts_once() {
        let temp = TempDir::new().unwrap();
        let (archive_path, hash) = packed_archive(&temp);
        let store = Store::new(&Layout::new(temp.path().join("root")));

        let dir = store.materialize(&archive_path, &hash).unwrap();
        assert!(dir.join("package.toml").exists());
        assert!(dir.join("data/file.txt").exists());
        assert!(store.contains(&hash));

        // A second call reuses the directory
        fs::write(dir.join("marker"), "").unwrap();
        let again = store.materialize(&archive_path, &hash).unwrap();
        assert_eq!(dir, again);
        assert!(again.join("marker").exists());
    }

    #[test]
    fn test_concurrent_materialize_same_hash() {
        let temp = TempDir::new().unwrap();
        let (archive_path, hash) = packed_archive(&temp);
        let store = Store::new(&Layout::new(temp.path().join("root")));

        thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| store.materialize(&archive_path, &hash).unwrap());
            }
        });

        // Only the final directory remains; no staging leftovers
        let entries: Vec<_> = fs::read_dir(store.dir()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(store.tracked_hashes(), 0);
    }

    #[test]
    fn test_remove() {
        let temp = TempDir::new().unwrap();
        let (archive_path, hash) = packed_archive(&temp);
        let store = Store::new(&Layout::new(temp.path().join("root")));

        store.materialize(&archive_path, &hash).unwrap();
        store.remove(&hash).unwrap();
        assert!(!store.contains(&hash));

        // Removing again is fine
        store.remove(&hash).unwrap();
        assert_eq!(store.tracked_hashes(), 0);
    }

    #[test]
    fn test_failed_extraction_releases_hash_lock() {
        let temp = TempDir::new().unwrap();
        let bogus = temp.path().join("bogus.tar.xz");
        fs::write(&bogus, b"not an archive").unwrap();
        let store = Store::new(&Layout::new(temp.path().join("root")));

        assert!(store.materialize(&bogus, "deadbeef").is_err());
        assert!(!store.contains("deadbeef"));
        assert_eq!(store.tracked_hashes(), 0);
    }
}
