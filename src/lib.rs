// src/lib.rs

//! Cairn Package Manager
//!
//! Small source-agnostic package manager that installs self-describing
//! compressed archives into a root directory.
//!
//! # Architecture
//!
//! - Registry-first: installed state lives in one `db.toml` file under the root
//! - Content-addressed store: each distinct archive is extracted once, keyed by SHA-256
//! - Hard-linked trees: package files are linked from the store into the root
//! - Batch installs: archives installed together form a dependency graph and
//!   install concurrently in dependency order

pub mod config;
pub mod db;
mod error;
pub mod filesystem;
pub mod hooks;
pub mod install;
pub mod packages;
pub mod resolver;
pub mod store;
pub mod version;

pub use error::{Error, Result};
pub use install::PackageRoot;
