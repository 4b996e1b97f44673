// src/version.rs

//! Semantic version parsing and range constraints
//!
//! Constraints use the `semver` crate's requirement grammar, with two
//! additions applied before parsing:
//! - `>=1.0.0,<2.0.0` - comma-separated comparators must all match
//! - `^1.2.3` / `~1.2.3` - caret and tilde ranges
//! - `1.*`, `*` - wildcards
//! - `1.2.3` - a bare version matches exactly, like `=1.2.3`
//! - `1.0.0 - 2.0.0` - inclusive hyphen range, like `>=1.0.0, <=2.0.0`
//! - `^1.0 || ^2.0` - any alternative may match

use crate::error::{Error, Result};
use semver::{Version, VersionReq};
use std::fmt;
use std::str::FromStr;

/// Parse a version string, tolerating a leading `v` and missing components
///
/// `1` and `1.2` are read as `1.0.0` and `1.2.0`.
pub fn parse_version(input: &str) -> Result<Version> {
    let trimmed = input.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);

    if let Ok(version) = Version::parse(trimmed) {
        return Ok(version);
    }

    // Pad the numeric core while leaving any pre-release/build suffix intact
    let split = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    let (core, suffix) = trimmed.split_at(split);
    let padded = match core.split('.').count() {
        1 => format!("{core}.0.0{suffix}"),
        2 => format!("{core}.0{suffix}"),
        _ => trimmed.to_string(),
    };

    Version::parse(&padded).map_err(|e| Error::InvalidVersion {
        version: input.to_string(),
        message: e.to_string(),
    })
}

/// Rewrite one `||` alternative into `semver` requirement syntax
fn normalize(alternative: &str) -> String {
    let alternative = alternative.trim();
    if let Some((low, high)) = alternative.split_once(" - ") {
        return format!(">={}, <={}", low.trim(), high.trim());
    }

    alternative
        .split(',')
        .map(|comparator| {
            let comparator = comparator.trim();
            let core = comparator.split(['-', '+']).next().unwrap_or(comparator);
            let bare = comparator.starts_with(|c: char| c.is_ascii_digit());
            let wildcard = core.contains(['*', 'x', 'X']);
            if bare && !wildcard {
                format!("={comparator}")
            } else {
                comparator.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// A version range: one or more alternatives, each a conjunction of comparators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    raw: String,
    alternatives: Vec<VersionReq>,
}

impl VersionConstraint {
    /// Check whether a version falls inside this range
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }

    /// The constraint as written in the descriptor
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for VersionConstraint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let raw = s.trim();
        if raw.is_empty() {
            return Err(Error::InvalidConstraint {
                constraint: s.to_string(),
                message: "empty constraint".to_string(),
            });
        }

        let alternatives = raw
            .split("||")
            .map(|alt| {
                VersionReq::parse(&normalize(alt)).map_err(|e| Error::InvalidConstraint {
                    constraint: raw.to_string(),
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            raw: raw.to_string(),
            alternatives,
        })
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Check an installed version string against a constraint expression
pub fn check_constraint(installed_version: &str, constraint: &str) -> Result<bool> {
    let version = parse_version(installed_version)?;
    let constraint: VersionConstraint = constraint.parse()?;
    Ok(constraint.matches(&version))
}
