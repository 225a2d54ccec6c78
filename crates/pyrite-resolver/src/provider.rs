//! Metadata provider abstraction: the resolver's only window onto
//! package indexes.
//!
//! Implementations must be idempotent for a given package/version so the
//! session cache can memoize freely. The resolver queries lazily and may
//! abandon enumeration after a few candidates.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use pyrite_core::requirement::{PackageName, Requirement};
use pyrite_core::version::Version;

/// Errors at the provider boundary.
///
/// `Fetch` is recoverable: the resolver treats it as "this candidate is
/// unavailable" and moves on. Retrying with backoff is the provider's
/// job, not the resolver's.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("package {name} not found in any index")]
    PackageNotFound { name: PackageName },

    #[error("failed to fetch metadata: {message}")]
    Fetch { message: String },
}

/// A source of available versions, declared dependencies, and integrity
/// hashes for package names.
#[allow(async_fn_in_trait)]
pub trait MetadataProvider {
    /// All known versions of a package, most-preferred (highest) first.
    async fn list_versions(&self, name: &PackageName) -> Result<Vec<Version>, ProviderError>;

    /// The declared dependency requirements of one release.
    async fn dependencies(
        &self,
        name: &PackageName,
        version: &Version,
    ) -> Result<Vec<Requirement>, ProviderError>;

    /// Integrity digests (`algo:hex`) for the release's artifacts.
    async fn integrity_hashes(
        &self,
        name: &PackageName,
        version: &Version,
    ) -> Result<Vec<String>, ProviderError>;

    /// The source URL that serves this package, recorded in the lockfile.
    fn source_of(&self, name: &PackageName) -> String;
}

/// An in-memory provider backed by a fixed release table.
///
/// Used by tests and offline fixtures; every lookup is deterministic.
#[derive(Debug, Default)]
pub struct StaticProvider {
    source: String,
    releases: BTreeMap<PackageName, BTreeMap<Version, Release>>,
    unavailable: BTreeSet<(PackageName, String)>,
}

#[derive(Debug, Clone)]
struct Release {
    requires: Vec<Requirement>,
    hashes: Vec<String>,
}

impl StaticProvider {
    pub fn new(source: &str) -> Self {
        StaticProvider {
            source: source.to_string(),
            releases: BTreeMap::new(),
            unavailable: BTreeSet::new(),
        }
    }

    /// Register a release with its requirement strings.
    ///
    /// A synthetic sha256 digest is derived from the coordinate so every
    /// release carries integrity data.
    pub fn add(&mut self, name: &str, version: &str, requires: &[&str]) {
        let name = PackageName::new(name).expect("valid package name");
        let version = Version::parse(version).expect("valid version");
        let requires = requires
            .iter()
            .map(|r| Requirement::parse(r).expect("valid requirement"))
            .collect();
        let digest = format!(
            "sha256:{}",
            pyrite_util::hash::sha256_bytes(format!("{name}-{version}").as_bytes())
        );
        self.releases.entry(name).or_default().insert(
            version,
            Release {
                requires,
                hashes: vec![digest],
            },
        );
    }

    /// Make metadata lookups for one release fail with a fetch error.
    pub fn mark_unavailable(&mut self, name: &str, version: &str) {
        let name = PackageName::new(name).expect("valid package name");
        self.unavailable.insert((name, version.to_string()));
    }

    fn release(&self, name: &PackageName, version: &Version) -> Result<&Release, ProviderError> {
        if self
            .unavailable
            .contains(&(name.clone(), version.to_string()))
        {
            return Err(ProviderError::Fetch {
                message: format!("metadata for {name} {version} unavailable"),
            });
        }
        self.releases
            .get(name)
            .and_then(|versions| versions.get(version))
            .ok_or_else(|| ProviderError::PackageNotFound { name: name.clone() })
    }
}

impl MetadataProvider for StaticProvider {
    async fn list_versions(&self, name: &PackageName) -> Result<Vec<Version>, ProviderError> {
        let versions = self
            .releases
            .get(name)
            .ok_or_else(|| ProviderError::PackageNotFound { name: name.clone() })?;
        Ok(versions.keys().rev().cloned().collect())
    }

    async fn dependencies(
        &self,
        name: &PackageName,
        version: &Version,
    ) -> Result<Vec<Requirement>, ProviderError> {
        Ok(self.release(name, version)?.requires.clone())
    }

    async fn integrity_hashes(
        &self,
        name: &PackageName,
        version: &Version,
    ) -> Result<Vec<String>, ProviderError> {
        Ok(self.release(name, version)?.hashes.clone())
    }

    fn source_of(&self, _name: &PackageName) -> String {
        self.source.clone()
    }
}
