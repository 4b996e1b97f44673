// src/db/lock.rs

//! Process-level lock over a root
//!
//! The lock is a zero-byte `db.lock` marker whose existence means another
//! command owns the registry and the root tree. It is taken once per
//! top-level command and released when the guard is dropped.

use crate::error::{Error, Result};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Held for the lifetime of one command against a root
#[derive(Debug)]
pub struct RootLock {
    path: PathBuf,
    released: bool,
}

impl RootLock {
    /// Create the marker, failing with `AlreadyLocked` if it exists
    pub fn acquire(lock_path: &Path) -> Result<Self> {
        match OpenOptions::new()
            .write(true)
            .create_new(true) // Atomic - fails if the marker already exists
            .open(lock_path)
        {
            Ok(_) => {
                debug!("Acquired lock {}", lock_path.display());
                Ok(Self {
                    path: lock_path.to_path_buf(),
                    released: false,
                })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(Error::AlreadyLocked {
                path: lock_path.to_path_buf(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the marker; failures are logged, never returned
    pub fn release(mut self) {
        self.remove_marker();
    }

    fn remove_marker(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        match fs::remove_file(&self.path) {
            Ok(()) => debug!("Released lock {}", self.path.display()),
            Err(e) => warn!("Failed to remove lock {}: {}", self.path.display(), e),
        }
    }
}

impl Drop for RootLock {
    fn drop(&mut self) {
        self.remove_marker();
    }
}
