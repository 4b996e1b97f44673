// src/packages/mod.rs

//! Package archives and their descriptors
//!
//! `manifest` models the `package.toml` descriptor; `archive` reads, extracts,
//! hashes, and packs the compressed tarballs that carry it.

pub mod archive;
pub mod manifest;

pub use manifest::{DependencyKind, DependencySpec, HookKind, Manifest};
