// src/db/mod.rs

//! Registry layer for Cairn
//!
//! This module handles the installed-package registry:
//! - Reading and writing `db.toml`
//! - The in-process mutex serializing registry access across install workers
//! - The process-level `db.lock` marker (see [`lock`])

pub mod lock;
pub mod models;

use crate::error::{Error, Result};
use models::Database;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tempfile::NamedTempFile;
use tracing::{debug, info};

pub use lock::RootLock;
pub use models::DbPackage;

/// Load the registry at `db_path`, creating an empty one if absent
///
/// # Arguments
///
/// * `db_path` - Path to `db.toml`
///
/// # Returns
///
/// * `Result<Database>` - The decoded registry
pub fn read(db_path: &Path) -> Result<Database> {
    if !db_path.exists() {
        debug!("Creating empty registry at: {}", db_path.display());
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::File::create(db_path)?;
        return Ok(Database::default());
    }

    let content = fs::read_to_string(db_path)?;
    let db: Database = toml::from_str(&content).map_err(|e| Error::RegistryCorrupt {
        path: db_path.to_path_buf(),
        message: e.to_string(),
    })?;

    debug!("Read registry with {} package(s)", db.len());
    Ok(db)
}

/// Replace the registry at `db_path` with `db`
///
/// The document is written to a temporary file beside `db.toml` and renamed
/// over it, so readers see either the old or the new registry in full.
pub fn write(db_path: &Path, db: &Database) -> Result<()> {
    let content = toml::to_string(db).map_err(|e| Error::RegistryCorrupt {
        path: db_path.to_path_buf(),
        message: e.to_string(),
    })?;

    let dir = db_path.parent().unwrap_or_else(|| Path::new("."));
    let mut staged = NamedTempFile::new_in(dir)?;
    staged.write_all(content.as_bytes())?;
    staged.as_file().sync_all()?;
    staged.persist(db_path).map_err(|e| e.error)?;

    debug!("Wrote registry with {} package(s)", db.len());
    Ok(())
}

/// Registry handle shared by every worker of one command
///
/// Reads go through [`Registry::read`]; every mutation goes through
/// [`Registry::commit`], which holds the mutex across the disk write.
#[derive(Debug)]
pub struct Registry {
    path: PathBuf,
    db: Mutex<Database>,
}

impl Registry {
    /// Load the registry at `db_path`
    pub fn open(db_path: &Path) -> Result<Self> {
        let db = read(db_path)?;
        info!("Opened registry {} ({} installed)", db_path.display(), db.len());
        Ok(Self {
            path: db_path.to_path_buf(),
            db: Mutex::new(db),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn guard(&self) -> MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against a consistent view of the registry
    pub fn read<T>(&self, f: impl FnOnce(&Database) -> T) -> T {
        f(&self.guard())
    }

    /// Clone the current registry
    pub fn snapshot(&self) -> Database {
        self.guard().clone()
    }

    /// Apply `f` to a copy of the registry, persist it, then publish it
    ///
    /// If `f` or the write fails, neither memory nor disk changes.
    pub fn commit<T>(&self, f: impl FnOnce(&mut Database) -> Result<T>) -> Result<T> {
        let mut guard = self.guard();
        let mut next = guard.clone();
        let value = f(&mut next)?;
        write(&self.path, &next)?;
        *guard = next;
        Ok(value)
    }
}
