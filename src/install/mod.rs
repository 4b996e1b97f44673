// src/install/mod.rs

//! Package operations against one root
//!
//! [`PackageRoot`] owns everything a command needs while it holds the root:
//! the process-level lock, the registry, the archive store and the hook
//! runner. Batch installs build a [`graph::BatchGraph`] and hand it to the
//! [`scheduler`], which calls back into the single-package install sequence.

pub mod graph;
pub mod scheduler;

use crate::config::Layout;
use crate::db::{DbPackage, Registry, RootLock};
use crate::error::{Error, Result};
use crate::filesystem;
use crate::hooks::HookRunner;
use crate::packages::{HookKind, Manifest, archive};
use crate::resolver;
use crate::store::Store;
use graph::{BatchGraph, Vertex};
use scheduler::VertexInstaller;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A locked root
///
/// The lock is released when the handle is dropped.
#[derive(Debug)]
pub struct PackageRoot {
    layout: Layout,
    registry: Registry,
    store: Store,
    hooks: HookRunner,
    _lock: RootLock,
}

impl PackageRoot {
    /// Create `root` if needed, take its lock and load the registry
    ///
    /// The root is canonicalized, so every derived path stays valid after a
    /// hook changes into its package directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        let layout = Layout::new(fs::canonicalize(&root)?);

        let lock = RootLock::acquire(&layout.lock_path())?;
        let registry = Registry::open(&layout.db_path())?;
        let store = Store::new(&layout);

        Ok(Self {
            layout,
            registry,
            store,
            hooks: HookRunner::new(),
            _lock: lock,
        })
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Install a batch of archives together
    ///
    /// All archives are inspected and their dependencies resolved before
    /// anything is extracted. Packages are then installed dependencies
    /// first, independent ones concurrently. Returns the new registry
    /// entries in the order they were committed.
    pub fn install(&self, archives: &[PathBuf]) -> Result<Vec<DbPackage>> {
        if archives.is_empty() {
            return Ok(Vec::new());
        }

        let graph = self.registry.read(|db| BatchGraph::build(archives, db))?;
        let installed = scheduler::run(&graph, self)?;

        info!("Installed {} package(s)", installed.len());
        Ok(installed)
    }

    /// Single-package install sequence
    fn install_one(&self, vertex: &Vertex) -> Result<DbPackage> {
        let (path, manifest) = (&vertex.path, &vertex.manifest);
        let name = manifest.name();
        info!("Installing {}@{}", name, manifest.version());

        let hash = archive::content_hash(path)?;
        if self.registry.read(|db| db.contains(name)) {
            return Err(Error::AlreadyInstalled(name.to_string()));
        }

        let package_dir = self.store.materialize(path, &hash)?;

        // Batch providers committed since the graph was built are visible here
        self.registry
            .read(|db| resolver::verify_installed(name, &vertex.specs, db))?;

        self.run_hook(manifest, HookKind::PreInstall, &package_dir)?;

        let linked =
            filesystem::install_files(self.layout.root(), &package_dir, &manifest.file_mappings())?;
        debug!("{}: linked {} file(s)", name, linked.len());

        let entry = DbPackage::new(hash, manifest);
        self.registry.commit(|db| {
            if db.contains(name) {
                return Err(Error::AlreadyInstalled(name.to_string()));
            }
            db.packages.insert(name.to_string(), entry.clone());
            Ok(())
        })?;

        self.run_hook(manifest, HookKind::PostInstall, &package_dir)?;

        info!("Installed {}@{} ({})", name, manifest.version(), entry.hash);
        Ok(entry)
    }

    /// Remove an installed package
    ///
    /// Fails with `DependentExists` while another installed package requires
    /// it, unless `force` is set. The stored archive directory is deleted
    /// only when no other entry was installed from the same bytes.
    pub fn remove(&self, name: &str, force: bool) -> Result<DbPackage> {
        let (entry, dependents) = self.registry.read(|db| {
            db.get(name)
                .cloned()
                .map(|entry| (entry, db.dependents_of(name)))
        })
        .ok_or_else(|| Error::NotFound(name.to_string()))?;

        if !dependents.is_empty() {
            if force {
                warn!(
                    "Forcing removal of {} required by: {}",
                    name,
                    dependents.join(", ")
                );
            } else {
                return Err(Error::DependentExists {
                    name: name.to_string(),
                    dependents,
                });
            }
        }

        info!("Removing {}@{}", name, entry.version());

        let package_dir = self.store.package_dir(&entry.hash);
        let manifest = Manifest::from_file(&self.layout.manifest_path(&entry.hash))?;

        self.run_hook(&manifest, HookKind::PreRemove, &package_dir)?;
        let removed =
            filesystem::remove_files(self.layout.root(), &package_dir, &manifest.file_mappings())?;
        debug!("{}: removed {} file(s)", name, removed);
        self.run_hook(&manifest, HookKind::PostRemove, &package_dir)?;

        if self.registry.read(|db| db.hash_in_use(&entry.hash, name)) {
            debug!("Keeping {}: still used by another package", entry.hash);
        } else {
            self.store.remove(&entry.hash)?;
        }

        self.registry.commit(|db| {
            db.packages.remove(name);
            Ok(())
        })?;

        info!("Removed {}", name);
        Ok(entry)
    }

    /// Installed packages sorted by name
    pub fn list(&self) -> Vec<DbPackage> {
        self.registry
            .read(|db| db.packages.values().cloned().collect())
    }

    /// Descriptor of an installed package, read from the store
    pub fn installed_manifest(&self, name: &str) -> Result<Manifest> {
        let hash = self
            .registry
            .read(|db| db.get(name).map(|entry| entry.hash.clone()))
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        Manifest::from_file(&self.layout.manifest_path(&hash))
    }

    fn run_hook(&self, manifest: &Manifest, kind: HookKind, package_dir: &Path) -> Result<()> {
        self.hooks
            .run(manifest.name(), kind, package_dir, manifest.hooks.get(kind))
    }
}

impl VertexInstaller for PackageRoot {
    type Output = DbPackage;

    fn install(&self, vertex: &Vertex) -> Result<DbPackage> {
        self.install_one(vertex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn pack(temp: &TempDir, name: &str, descriptor: &str) -> PathBuf {
        let src = temp.path().join(format!("{name}-src"));
        fs::create_dir_all(src.join("bin")).unwrap();
        fs::write(src.join("package.toml"), descriptor).unwrap();
        fs::write(src.join("bin").join(name), format!("#!/bin/sh\necho {name}\n")).unwrap();
        let out = temp.path().join(format!("{name}.tar.xz"));
        archive::pack(&src, &out).unwrap();
        out
    }

    fn simple(temp: &TempDir, name: &str, required: &str) -> PathBuf {
        pack(
            temp,
            name,
            &format!(
                "[package]\nname = \"{name}\"\nversion = \"1.0.0\"\n\
                 [dependencies]\nrequired = [{required}]\n\
                 [bin]\n{name} = \"bin/{name}\"\n"
            ),
        )
    }

    #[test]
    fn test_open_takes_lock() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("root");

        let handle = PackageRoot::open(&root).unwrap();
        assert!(root.join("db.lock").exists());
        assert!(root.join("db.toml").exists());
        assert!(matches!(
            PackageRoot::open(&root),
            Err(Error::AlreadyLocked { .. })
        ));

        drop(handle);
        assert!(!root.join("db.lock").exists());
        PackageRoot::open(&root).unwrap();
    }

    #[test]
    fn test_install_and_remove_single() {
        let temp = TempDir::new().unwrap();
        let foo = simple(&temp, "foo", "");
        let root = PackageRoot::open(temp.path().join("root")).unwrap();

        let installed = root.install(&[foo]).unwrap();
        assert_eq!(installed.len(), 1);
        let hash = installed[0].hash.clone();
        assert!(root.layout().root().join("bin/foo").exists());
        assert!(root.layout().package_dir(&hash).is_dir());
        assert_eq!(root.list().len(), 1);
        assert_eq!(root.installed_manifest("foo").unwrap().version(), "1.0.0");

        root.remove("foo", false).unwrap();
        assert!(!root.layout().root().join("bin/foo").exists());
        assert!(!root.layout().package_dir(&hash).exists());
        assert!(root.list().is_empty());
    }

    #[test]
    fn test_remove_unknown() {
        let temp = TempDir::new().unwrap();
        let root = PackageRoot::open(temp.path().join("root")).unwrap();
        assert!(matches!(root.remove("ghost", false), Err(Error::NotFound(_))));
        assert!(matches!(
            root.installed_manifest("ghost"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_force_remove_ignores_dependents() {
        let temp = TempDir::new().unwrap();
        let foo = simple(&temp, "foo", "");
        let bar = simple(&temp, "bar", "\"foo@^1.0.0\"");
        let root = PackageRoot::open(temp.path().join("root")).unwrap();
        root.install(&[foo, bar]).unwrap();

        assert!(matches!(
            root.remove("foo", false),
            Err(Error::DependentExists { .. })
        ));
        root.remove("foo", true).unwrap();

        let names: Vec<_> = root.list().iter().map(|p| p.name().to_string()).collect();
        assert_eq!(names, ["bar"]);
    }

    #[test]
    fn test_spaced_dependency_blocks_removal() {
        let temp = TempDir::new().unwrap();
        let foo = simple(&temp, "foo", "");
        let bar = simple(&temp, "bar", "\"foo @^1.0.0\"");
        let root = PackageRoot::open(temp.path().join("root")).unwrap();
        root.install(&[foo, bar]).unwrap();

        match root.remove("foo", false) {
            Err(Error::DependentExists { name, dependents }) => {
                assert_eq!(name, "foo");
                assert_eq!(dependents, ["bar"]);
            }
            other => panic!("expected DependentExists, got {other:?}"),
        }
        assert_eq!(root.list().len(), 2);
    }

    /// Path to `target` spelled relative to the working directory
    fn relative_to_cwd(target: &Path) -> PathBuf {
        let cwd = std::env::current_dir().unwrap();
        let mut rel = PathBuf::new();
        for _ in cwd.components().skip(1) {
            rel.push("..");
        }
        rel.join(target.strip_prefix("/").unwrap())
    }

    #[test]
    fn test_hooks_run_under_relative_root() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("hooked-src");
        fs::create_dir_all(&src).unwrap();
        fs::write(
            src.join("package.toml"),
            "[package]\nname = \"hooked\"\nversion = \"1.0.0\"\n\
             [hooks]\npostinstall = \"post.sh\"\n",
        )
        .unwrap();
        fs::write(src.join("post.sh"), "#!/bin/sh\ntouch ran\n").unwrap();
        let out = temp.path().join("hooked.tar.xz");
        archive::pack(&src, &out).unwrap();

        let relative = relative_to_cwd(&temp.path().join("relroot"));
        assert!(relative.is_relative());
        let root = PackageRoot::open(&relative).unwrap();
        assert!(root.layout().root().is_absolute());

        let installed = root.install(&[out]).unwrap();
        let package_dir = root.layout().package_dir(&installed[0].hash);
        assert!(package_dir.join("ran").exists());
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let temp = TempDir::new().unwrap();
        let root = PackageRoot::open(temp.path().join("root")).unwrap();
        assert!(root.install(&[]).unwrap().is_empty());
    }
}
