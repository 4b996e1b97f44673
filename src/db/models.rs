// src/db/models.rs

//! Data models for the Cairn registry
//!
//! The registry is one TOML document whose `package` table maps each
//! installed package name to its content hash, identity, and dependencies.

use crate::packages::manifest::{Dependencies, Identity, Manifest};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The whole registry, keyed by package name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Database {
    #[serde(rename = "package", default)]
    pub packages: BTreeMap<String, DbPackage>,
}

/// An installed package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbPackage {
    /// SHA-256 of the archive the package was installed from
    pub hash: String,
    pub package: Identity,
    #[serde(default)]
    pub dependencies: Dependencies,
    /// RFC 3339 timestamp of the registry commit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_at: Option<String>,
}

impl DbPackage {
    /// Create a registry entry for a package installed from `hash`
    pub fn new(hash: String, manifest: &Manifest) -> Self {
        Self {
            hash,
            package: manifest.package.clone(),
            dependencies: manifest.dependencies.clone(),
            installed_at: Some(chrono::Utc::now().to_rfc3339()),
        }
    }

    pub fn name(&self) -> &str {
        &self.package.name
    }

    pub fn version(&self) -> &str {
        &self.package.version
    }
}

impl Database {
    pub fn get(&self, name: &str) -> Option<&DbPackage> {
        self.packages.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    /// Names of other installed packages listing `name` as a required dependency
    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        self.packages
            .iter()
            .filter(|(other, pkg)| other.as_str() != name && pkg.dependencies.requires(name))
            .map(|(other, _)| other.clone())
            .collect()
    }

    /// Whether any entry other than `except` was installed from `hash`
    pub fn hash_in_use(&self, hash: &str, except: &str) -> bool {
        self.packages
            .iter()
            .any(|(name, pkg)| name != except && pkg.hash == hash)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}
