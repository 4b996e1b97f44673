// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Core error types for Cairn
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Another invocation holds the root
    #[error("Database already locked: {} exists", .path.display())]
    AlreadyLocked { path: PathBuf },

    /// Registry file exists but cannot be decoded
    #[error("Registry at {} is unreadable: {message}", .path.display())]
    RegistryCorrupt { path: PathBuf, message: String },

    /// Archive stream could not be decoded
    #[error("Corrupt archive {}: {message}", .path.display())]
    CorruptArchive { path: PathBuf, message: String },

    /// Archive has no package.toml at its root
    #[error("package.toml not found in {}", .path.display())]
    ManifestNotFound { path: PathBuf },

    /// Descriptor could not be decoded or failed validation
    #[error("Invalid manifest {source_name}: {message}")]
    InvalidManifest { source_name: String, message: String },

    /// Dependency spec is not a single `name@constraint` pair
    #[error("Invalid dependency spec: {0}")]
    InvalidDependencySpec(String),

    #[error("Invalid version '{version}': {message}")]
    InvalidVersion { version: String, message: String },

    #[error("Invalid version constraint '{constraint}': {message}")]
    InvalidConstraint { constraint: String, message: String },

    /// Dependency resolvable neither from the registry nor the batch
    #[error("Dependency not found: {spec} (required by {package})")]
    DependencyNotFound { package: String, spec: String },

    /// Dependency present but at a version outside the constraint
    #[error("Version constraint for package {name} not met. Required {required}, found {found}")]
    UnmetConstraint {
        name: String,
        required: String,
        found: String,
    },

    #[error("Package is already installed with name {0}")]
    AlreadyInstalled(String),

    /// Two archives in one batch declare the same package name
    #[error("Package {name} is provided by both {} and {}", .first.display(), .second.display())]
    DuplicatePackage {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Package {0} is not installed")]
    NotFound(String),

    /// Removal blocked by packages that require the target
    #[error("Package {name} is required by: {}", .dependents.join(", "))]
    DependentExists {
        name: String,
        dependents: Vec<String>,
    },

    /// Lifecycle script exited unsuccessfully
    #[error("{hook} hook of {package} failed ({})", describe_status(.status))]
    HookFailed {
        package: String,
        hook: String,
        status: Option<i32>,
    },

    /// Batch dependency graph contains a cycle
    #[error("Dependency cycle detected: {}", .cycle.join(" -> "))]
    CycleDetected { cycle: Vec<String> },

    /// An in-batch dependency failed before this package could start
    #[error("Cannot install {package}: dependency {dependency} failed")]
    DependencyFailed { package: String, dependency: String },

    /// Materialization target already exists under the root
    #[error("File conflict: {} already exists", .path.display())]
    FileConflict { path: PathBuf },
}

fn describe_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit status {code}"),
        None => "terminated by signal".to_string(),
    }
}

/// Result type alias using Cairn's Error type
pub type Result<T> = std::result::Result<T, Error>;
