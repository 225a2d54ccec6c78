//! The `Pyrite.lock` format: a fully pinned, hash-verified resolution
//! graph plus the top-level requirements that produced it.
//!
//! Serialization is canonical (packages, dependencies, hashes, and extras
//! all sorted) so re-serializing an unchanged graph is byte-identical.
//! The file is replaced wholesale on re-resolution, never patched in
//! place.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;

use pyrite_util::errors::PyriteError;
use pyrite_util::hash::is_valid_digest;

/// Newest lockfile schema this build can read.
pub const SCHEMA_VERSION: u32 = 1;

/// Deterministic lockfile recording the resolved dependency graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lockfile {
    #[serde(rename = "schema-version")]
    pub schema_version: u32,

    /// Canonical strings of the top-level requirements the lock was
    /// produced from, for drift detection.
    #[serde(default)]
    pub requirements: Vec<String>,

    #[serde(default)]
    pub package: Vec<LockedPackage>,
}

/// A single locked package with its pinned version and integrity hashes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockedPackage {
    pub name: String,
    pub version: String,
    pub source: String,
    pub hashes: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub extras: Vec<String>,
}

impl Lockfile {
    /// Build a lockfile with canonical ordering applied throughout.
    pub fn generate(mut requirements: Vec<String>, mut packages: Vec<LockedPackage>) -> Self {
        requirements.sort();
        for pkg in &mut packages {
            pkg.hashes.sort();
            pkg.dependencies.sort();
            pkg.extras.sort();
        }
        packages.sort_by(|a, b| a.name.cmp(&b.name));
        Lockfile {
            schema_version: SCHEMA_VERSION,
            requirements,
            package: packages,
        }
    }

    /// Load and parse a `Pyrite.lock` file, validating schema and
    /// invariants.
    pub fn from_path(path: &Path) -> miette::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PyriteError::Lockfile {
            message: format!("Failed to read {}: {e}", path.display()),
        })?;
        Self::parse_toml(&content)
    }

    /// Parse lockfile TOML content, validating schema and invariants.
    pub fn parse_toml(content: &str) -> miette::Result<Self> {
        let lockfile: Lockfile = toml::from_str(content).map_err(|e| PyriteError::Lockfile {
            message: format!("Failed to parse lockfile: {e}"),
        })?;
        if lockfile.schema_version > SCHEMA_VERSION {
            return Err(PyriteError::IncompatibleLockFormat {
                found: lockfile.schema_version,
                supported: SCHEMA_VERSION,
            }
            .into());
        }
        lockfile.validate()?;
        Ok(lockfile)
    }

    /// Check the structural invariants: unique names, every referenced
    /// dependency present, at least one well-formed digest per package.
    pub fn validate(&self) -> Result<(), PyriteError> {
        let mut names = BTreeSet::new();
        for pkg in &self.package {
            if !names.insert(pkg.name.as_str()) {
                return Err(PyriteError::Lockfile {
                    message: format!("duplicate package entry: {}", pkg.name),
                });
            }
        }
        for pkg in &self.package {
            if pkg.hashes.is_empty() {
                return Err(PyriteError::Lockfile {
                    message: format!("package {} has no integrity hashes", pkg.name),
                });
            }
            for digest in &pkg.hashes {
                if !is_valid_digest(digest) {
                    return Err(PyriteError::Lockfile {
                        message: format!("package {} has malformed digest {digest:?}", pkg.name),
                    });
                }
            }
            for dep in &pkg.dependencies {
                if !names.contains(dep.as_str()) {
                    return Err(PyriteError::Lockfile {
                        message: format!(
                            "package {} depends on {dep}, which has no lock entry",
                            pkg.name
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    /// Serialize to canonical TOML.
    pub fn to_string_pretty(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Write atomically: serialize to a temp file in the same directory,
    /// then rename over the destination.
    pub fn write_to(&self, path: &Path) -> miette::Result<()> {
        let content = self.to_string_pretty().map_err(|e| PyriteError::Lockfile {
            message: format!("Failed to serialize lockfile: {e}"),
        })?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(PyriteError::Io)?;
        tmp.write_all(content.as_bytes()).map_err(PyriteError::Io)?;
        tmp.persist(path).map_err(|e| PyriteError::Io(e.error))?;
        Ok(())
    }

    /// The locked version for a package name, if present.
    pub fn locked_version(&self, name: &str) -> Option<&str> {
        self.package
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.version.as_str())
    }

    /// Drift detection: whether the stored top-level requirements match
    /// the given canonical requirement strings.
    pub fn matches_requirements(&self, current: &[String]) -> bool {
        let mut current = current.to_vec();
        current.sort();
        self.requirements == current
    }
}
