// src/resolver.rs

//! Dependency resolution against the registry and the current batch
//!
//! A dependency is satisfied by the registry when a package of that name is
//! installed, and otherwise by a package of that name in the batch being
//! installed. Either way the provider's version must satisfy the constraint.
//! Optional dependencies are resolved exactly like required ones.

use crate::db::models::Database;
use crate::error::{Error, Result};
use crate::packages::manifest::DependencySpec;
use crate::version;

/// Where a dependency was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution<Id> {
    /// Already installed
    Registry,
    /// Provided by another member of the batch
    Batch(Id),
}

/// A batch member that can satisfy dependencies
pub trait Candidate {
    type Id: Copy;

    fn id(&self) -> Self::Id;
    fn name(&self) -> &str;
    fn version(&self) -> &str;
}

/// Check `found` against the spec's constraint
fn check(spec: &DependencySpec, found: &str) -> Result<()> {
    let version = version::parse_version(found)?;
    if spec.constraint.matches(&version) {
        Ok(())
    } else {
        Err(Error::UnmetConstraint {
            name: spec.name.clone(),
            required: spec.constraint.to_string(),
            found: found.to_string(),
        })
    }
}

/// Resolve one dependency of `requester`
///
/// The registry is consulted first; a batch candidate is only considered when
/// no package of that name is installed.
pub fn resolve_dependency<C: Candidate>(
    requester: &str,
    spec: &DependencySpec,
    db: &Database,
    candidates: &[C],
) -> Result<Resolution<C::Id>> {
    if let Some(installed) = db.get(&spec.name) {
        check(spec, installed.version())?;
        return Ok(Resolution::Registry);
    }

    if let Some(candidate) = candidates.iter().find(|c| c.name() == spec.name) {
        check(spec, candidate.version())?;
        return Ok(Resolution::Batch(candidate.id()));
    }

    Err(Error::DependencyNotFound {
        package: requester.to_string(),
        spec: spec.to_string(),
    })
}

/// Re-check the parsed dependencies of `requester` against installed
/// packages only
///
/// Run right before a package is installed, when every in-batch provider
/// must already have been committed.
pub fn verify_installed(requester: &str, specs: &[DependencySpec], db: &Database) -> Result<()> {
    for spec in specs {
        let installed = db.get(&spec.name).ok_or_else(|| Error::DependencyNotFound {
            package: requester.to_string(),
            spec: spec.to_string(),
        })?;
        check(spec, installed.version())?;
    }
    Ok(())
}
