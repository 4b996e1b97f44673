// src/packages/manifest.rs

//! Package descriptor model
//!
//! Every archive carries a `package.toml` at its root describing the
//! package identity, its dependencies, which archive paths are materialized
//! into the root, and optional lifecycle hook scripts.

use crate::error::{Error, Result};
use crate::version::{self, VersionConstraint};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path};
use std::str::FromStr;

/// Decoded `package.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Descriptor schema version
    #[serde(default = "default_spec_version")]
    pub spec: u32,
    pub package: Identity,
    #[serde(default)]
    pub dependencies: Dependencies,
    /// Root-relative target -> archive-relative source (file or directory)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub files: BTreeMap<String, String>,
    /// Shorthand for `files` entries under `bin/`; sources are made executable
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub bin: BTreeMap<String, String>,
    /// Shorthand for `files` entries under `lib/`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub lib: BTreeMap<String, String>,
    #[serde(default)]
    pub hooks: Hooks,
}

fn default_spec_version() -> u32 {
    1
}

/// Package identity as recorded in the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub maintainers: Vec<String>,
}

/// Raw `name@constraint` dependency strings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependencies {
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub optional: Vec<String>,
}

impl Dependencies {
    /// Parse every required and optional spec
    pub fn parse_all(&self) -> Result<Vec<DependencySpec>> {
        let required = self
            .required
            .iter()
            .map(|raw| DependencySpec::parse(raw, DependencyKind::Required));
        let optional = self
            .optional
            .iter()
            .map(|raw| DependencySpec::parse(raw, DependencyKind::Optional));
        required.chain(optional).collect()
    }

    /// Whether any required spec names the given package
    ///
    /// Specs that no longer parse name nothing.
    pub fn requires(&self, name: &str) -> bool {
        self.required.iter().any(|raw| {
            DependencySpec::parse(raw, DependencyKind::Required)
                .is_ok_and(|spec| spec.name == name)
        })
    }
}

/// Lifecycle scripts, relative to the extracted package directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hooks {
    #[serde(default)]
    pub preinstall: String,
    #[serde(default)]
    pub postinstall: String,
    #[serde(default)]
    pub preremove: String,
    #[serde(default)]
    pub postremove: String,
}

/// Whether a dependency was declared as required or optional
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKind {
    Required,
    Optional,
}

/// A parsed `name@constraint` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySpec {
    pub name: String,
    pub constraint: VersionConstraint,
    pub kind: DependencyKind,
}

impl DependencySpec {
    /// Split on the single `@` and parse the constraint
    pub fn parse(raw: &str, kind: DependencyKind) -> Result<Self> {
        let mut parts = raw.split('@');
        let (Some(name), Some(constraint), None) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::InvalidDependencySpec(raw.to_string()));
        };

        let name = name.trim();
        if name.is_empty() || constraint.trim().is_empty() {
            return Err(Error::InvalidDependencySpec(raw.to_string()));
        }

        let constraint = VersionConstraint::from_str(constraint)
            .map_err(|_| Error::InvalidDependencySpec(raw.to_string()))?;

        Ok(Self {
            name: name.to_string(),
            constraint,
            kind,
        })
    }
}

impl fmt::Display for DependencySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.constraint)
    }
}

/// One effective file mapping after folding in `bin` and `lib`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMapping {
    pub target: String,
    pub source: String,
    pub executable: bool,
}

impl Manifest {
    /// Decode and validate a descriptor; `source_name` labels errors
    pub fn from_toml(content: &str, source_name: &str) -> Result<Self> {
        let manifest: Manifest = toml::from_str(content).map_err(|e| Error::InvalidManifest {
            source_name: source_name.to_string(),
            message: e.to_string(),
        })?;
        manifest.validate(source_name)?;
        Ok(manifest)
    }

    /// Read a descriptor from an extracted package directory
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content, &path.display().to_string())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::InvalidManifest {
            source_name: self.package.name.clone(),
            message: e.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.package.name
    }

    pub fn version(&self) -> &str {
        &self.package.version
    }

    /// All file mappings, `files` first, then `bin/<key>` and `lib/<key>`
    pub fn file_mappings(&self) -> Vec<FileMapping> {
        let files = self.files.iter().map(|(target, source)| FileMapping {
            target: target.clone(),
            source: source.clone(),
            executable: false,
        });
        let bin = self.bin.iter().map(|(name, source)| FileMapping {
            target: format!("bin/{name}"),
            source: source.clone(),
            executable: true,
        });
        let lib = self.lib.iter().map(|(name, source)| FileMapping {
            target: format!("lib/{name}"),
            source: source.clone(),
            executable: false,
        });
        files.chain(bin).chain(lib).collect()
    }

    fn validate(&self, source_name: &str) -> Result<()> {
        let invalid = |message: String| Error::InvalidManifest {
            source_name: source_name.to_string(),
            message,
        };

        let name = &self.package.name;
        if name.is_empty() || name.contains(['@', '/', '\\']) || name.trim() != name {
            return Err(invalid(format!("invalid package name '{name}'")));
        }

        version::parse_version(&self.package.version)
            .map_err(|e| invalid(format!("invalid version: {e}")))?;

        for mapping in self.file_mappings() {
            if !is_contained(&mapping.target) {
                return Err(invalid(format!("file target '{}' escapes the root", mapping.target)));
            }
            if !is_contained(&mapping.source) {
                return Err(invalid(format!(
                    "file source '{}' escapes the package",
                    mapping.source
                )));
            }
        }

        for (kind, hook) in self.hooks.iter() {
            if let Some(hook) = hook
                && !is_contained(hook)
            {
                return Err(invalid(format!("{kind} hook '{hook}' escapes the package")));
            }
        }

        Ok(())
    }
}

impl Hooks {
    /// Hook path for a lifecycle point, `None` when not declared
    pub fn get(&self, kind: HookKind) -> Option<&str> {
        let path = match kind {
            HookKind::PreInstall => &self.preinstall,
            HookKind::PostInstall => &self.postinstall,
            HookKind::PreRemove => &self.preremove,
            HookKind::PostRemove => &self.postremove,
        };
        let path = path.trim();
        (!path.is_empty()).then_some(path)
    }

    fn iter(&self) -> impl Iterator<Item = (HookKind, Option<&str>)> {
        HookKind::ALL.into_iter().map(|kind| (kind, self.get(kind)))
    }
}

/// Lifecycle points at which a package may run a script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    PreInstall,
    PostInstall,
    PreRemove,
    PostRemove,
}

impl HookKind {
    pub const ALL: [HookKind; 4] = [
        HookKind::PreInstall,
        HookKind::PostInstall,
        HookKind::PreRemove,
        HookKind::PostRemove,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            HookKind::PreInstall => "preinstall",
            HookKind::PostInstall => "postinstall",
            HookKind::PreRemove => "preremove",
            HookKind::PostRemove => "postremove",
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relative, non-empty, and free of `..` and root components
fn is_contained(path: &str) -> bool {
    let path = Path::new(path);
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
