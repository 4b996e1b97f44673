// src/config.rs

//! Root directory resolution and on-disk layout
//!
//! Everything Cairn persists lives under a single root:
//!
//! ```text
//! <root>/
//!   db.toml              registry
//!   db.lock              marker held for the duration of one command
//!   packages/<sha256>/   extracted archive contents, one per distinct archive
//!   ...                  materialized package files, merged into the root
//! ```

use std::path::{Path, PathBuf};

/// Environment variable consulted when `--root` is not given
pub const ROOT_ENV: &str = "CAIRN_ROOT";

/// Registry file name
pub const DB_FILE: &str = "db.toml";

/// Lock marker file name
pub const LOCK_FILE: &str = "db.lock";

/// Directory holding extracted archives keyed by content hash
pub const STORE_DIR: &str = "packages";

/// Descriptor entry expected at the root of every archive
pub const MANIFEST_FILE: &str = "package.toml";

/// Default root: `$HOME/.cairn`, or `.cairn` in the working directory when
/// no home directory can be determined
pub fn default_root() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".cairn"))
        .unwrap_or_else(|| PathBuf::from(".cairn"))
}

/// Paths derived from a root directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn db_path(&self) -> PathBuf {
        self.root.join(DB_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    pub fn store_dir(&self) -> PathBuf {
        self.root.join(STORE_DIR)
    }

    /// Extraction directory for an archive with the given content hash
    pub fn package_dir(&self, hash: &str) -> PathBuf {
        self.store_dir().join(hash)
    }

    /// Descriptor of an extracted archive
    pub fn manifest_path(&self, hash: &str) -> PathBuf {
        self.package_dir(hash).join(MANIFEST_FILE)
    }
}
