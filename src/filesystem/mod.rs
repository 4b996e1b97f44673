// src/filesystem/mod.rs

//! Materializing package files into the root
//!
//! Declared files are hard-linked from the extracted package directory into
//! the root, so the live tree shares storage with the store. Store contents
//! are never modified in place, which keeps the sharing safe. Neither
//! operation rolls back on failure.

use crate::error::{Error, Result};
use crate::packages::manifest::FileMapping;
use std::fs::{self, DirBuilder};
use std::io;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Link every mapped file into `root`, returning the paths created
pub fn install_files(root: &Path, package_dir: &Path, mappings: &[FileMapping]) -> Result<Vec<PathBuf>> {
    let mut linked = Vec::new();

    for mapping in mappings {
        let source = package_dir.join(&mapping.source);
        let target = root.join(&mapping.target);
        let metadata = fs::symlink_metadata(&source)?;

        if metadata.is_dir() {
            for entry in WalkDir::new(&source).min_depth(1).sort_by_file_name() {
                let entry = entry.map_err(io::Error::from)?;
                let relative = entry
                    .path()
                    .strip_prefix(&source)
                    .map_err(|e| io::Error::other(e.to_string()))?;
                let dest = target.join(relative);

                if entry.file_type().is_dir() {
                    create_dir_like(&dest, entry.path())?;
                } else {
                    if let Some(parent) = dest.parent() {
                        let parent_source = entry.path().parent().unwrap_or(&source);
                        create_dir_like(parent, parent_source)?;
                    }
                    link(entry.path(), &dest, mapping.executable)?;
                    linked.push(dest);
                }
            }
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            link(&source, &target, mapping.executable)?;
            linked.push(target);
        }
    }

    debug!("Linked {} file(s) into {}", linked.len(), root.display());
    Ok(linked)
}

/// Remove every file `install_files` would have created
///
/// Directories are left in place; files already gone are skipped.
pub fn remove_files(root: &Path, package_dir: &Path, mappings: &[FileMapping]) -> Result<usize> {
    let mut removed = 0;

    for mapping in mappings {
        let source = package_dir.join(&mapping.source);
        let target = root.join(&mapping.target);

        let is_dir = fs::symlink_metadata(&source)
            .map(|m| m.is_dir())
            .unwrap_or(false);

        if is_dir {
            for entry in WalkDir::new(&source).min_depth(1) {
                let entry = entry.map_err(io::Error::from)?;
                if entry.file_type().is_dir() {
                    continue;
                }
                let relative = entry
                    .path()
                    .strip_prefix(&source)
                    .map_err(|e| io::Error::other(e.to_string()))?;
                removed += remove_if_present(&target.join(relative))?;
            }
        } else {
            removed += remove_if_present(&target)?;
        }
    }

    debug!("Removed {} file(s) from {}", removed, root.display());
    Ok(removed)
}

fn remove_if_present(path: &Path) -> Result<usize> {
    match fs::remove_file(path) {
        Ok(()) => Ok(1),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("Already gone: {}", path.display());
            Ok(0)
        }
        Err(e) => Err(e.into()),
    }
}

/// Create `dest` (and missing parents) with the permission bits of `like`
fn create_dir_like(dest: &Path, like: &Path) -> Result<()> {
    if dest.is_dir() {
        return Ok(());
    }
    let mode = fs::metadata(like)?.permissions().mode() & 0o7777;
    DirBuilder::new().recursive(true).mode(mode).create(dest)?;
    Ok(())
}

fn link(source: &Path, dest: &Path, executable: bool) -> Result<()> {
    if executable {
        let mut permissions = fs::metadata(source)?.permissions();
        permissions.set_mode(permissions.mode() | 0o755);
        fs::set_permissions(source, permissions)?;
    }

    match fs::hard_link(source, dest) {
        Ok(()) => {
            debug!("Linked {} -> {}", dest.display(), source.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(Error::FileConflict {
            path: dest.to_path_buf(),
        }),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::MetadataExt;
    use tempfile::TempDir;

    fn mapping(target: &str, source: &str) -> FileMapping {
        FileMapping {
            target: target.to_string(),
            source: source.to_string(),
            executable: false,
        }
    }

    fn setup() -> (TempDir, PathBuf, PathBuf) {
        let temp = TempDir::new().unwrap();
        let pkg = temp.path().join("pkg");
        let root = temp.path().join("root");
        fs::create_dir_all(pkg.join("share/nested")).unwrap();
        fs::create_dir_all(&root).unwrap();
        fs::write(pkg.join("share/a.txt"), "a").unwrap();
        fs::write(pkg.join("share/nested/b.txt"), "b").unwrap();
        fs::write(pkg.join("tool"), "#!/bin/sh\n").unwrap();
        fs::set_permissions(pkg.join("share/nested"), fs::Permissions::from_mode(0o750)).unwrap();
        (temp, pkg, root)
    }

    #[test]
    fn test_install_single_file_is_hard_link() {
        let (_temp, pkg, root) = setup();
        let linked = install_files(&root, &pkg, &[mapping("bin/tool", "tool")]).unwrap();

        assert_eq!(linked, vec![root.join("bin/tool")]);
        let src = fs::metadata(pkg.join("tool")).unwrap();
        let dst = fs::metadata(root.join("bin/tool")).unwrap();
        assert_eq!(src.ino(), dst.ino());
    }

    #[test]
    fn test_install_directory_subtree() {
        let (_temp, pkg, root) = setup();
        let linked = install_files(&root, &pkg, &[mapping("usr/share/demo", "share")]).unwrap();

        assert_eq!(linked.len(), 2);
        assert_eq!(fs::read_to_string(root.join("usr/share/demo/a.txt")).unwrap(), "a");
        assert_eq!(
            fs::read_to_string(root.join("usr/share/demo/nested/b.txt")).unwrap(),
            "b"
        );
        let mode = fs::metadata(root.join("usr/share/demo/nested"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o750);
    }

    #[test]
    fn test_executable_mapping_sets_mode() {
        let (_temp, pkg, root) = setup();
        let exe = FileMapping {
            executable: true,
            ..mapping("bin/tool", "tool")
        };
        install_files(&root, &pkg, &[exe]).unwrap();

        let mode = fs::metadata(root.join("bin/tool")).unwrap().permissions().mode();
        assert_eq!(mode & 0o755, 0o755);
    }

    #[test]
    fn test_conflicting_target() {
        let (_temp, pkg, root) = setup();
        fs::create_dir_all(root.join("bin")).unwrap();
        fs::write(root.join("bin/tool"), "someone else's").unwrap();

        assert!(matches!(
            install_files(&root, &pkg, &[mapping("bin/tool", "tool")]),
            Err(Error::FileConflict { .. })
        ));
    }

    #[test]
    fn test_missing_source() {
        let (_temp, pkg, root) = setup();
        assert!(matches!(
            install_files(&root, &pkg, &[mapping("bin/x", "nope")]),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_remove_mirrors_install() {
        let (_temp, pkg, root) = setup();
        let mappings = [mapping("usr/share/demo", "share"), mapping("bin/tool", "tool")];
        install_files(&root, &pkg, &mappings).unwrap();

        let removed = remove_files(&root, &pkg, &mappings).unwrap();
        assert_eq!(removed, 3);
        assert!(!root.join("usr/share/demo/a.txt").exists());
        assert!(!root.join("bin/tool").exists());
        // Directories may stay behind
        assert!(root.join("usr/share/demo/nested").is_dir());
        // Store copies are untouched
        assert!(pkg.join("share/nested/b.txt").exists());

        // Second removal finds nothing
        assert_eq!(remove_files(&root, &pkg, &mappings).unwrap(), 0);
    }
}
