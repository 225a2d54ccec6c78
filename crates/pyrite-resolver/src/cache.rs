//! Session metadata cache.
//!
//! The cache is an explicit object owned by the caller and passed into the
//! resolver, never ambient global state. Entries are keyed by package name
//! (and version for per-release metadata) and survive across resolution
//! runs when the caller shares one cache; `refresh` is the caller's
//! invalidation signal.

use std::collections::BTreeMap;

use pyrite_core::requirement::{PackageName, Requirement};
use pyrite_core::version::Version;

use crate::provider::{MetadataProvider, ProviderError};

/// Memoized provider responses for one or more resolution runs.
#[derive(Debug, Default)]
pub struct MetadataCache {
    versions: BTreeMap<PackageName, Vec<Version>>,
    dependencies: BTreeMap<(PackageName, Version), Vec<Requirement>>,
    hashes: BTreeMap<(PackageName, Version), Vec<String>>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all cached entries for one package.
    pub fn refresh(&mut self, name: &PackageName) {
        self.versions.remove(name);
        self.dependencies.retain(|(n, _), _| n != name);
        self.hashes.retain(|(n, _), _| n != name);
    }

    /// Seed the version list for a package, used by prefetching.
    pub fn insert_versions(&mut self, name: PackageName, versions: Vec<Version>) {
        self.versions.insert(name, versions);
    }

    pub fn has_versions(&self, name: &PackageName) -> bool {
        self.versions.contains_key(name)
    }

    /// The known versions of a package, fetching through the provider on
    /// a cache miss.
    pub async fn versions<P: MetadataProvider>(
        &mut self,
        provider: &P,
        name: &PackageName,
    ) -> Result<Vec<Version>, ProviderError> {
        if let Some(cached) = self.versions.get(name) {
            return Ok(cached.clone());
        }
        let versions = provider.list_versions(name).await?;
        self.versions.insert(name.clone(), versions.clone());
        Ok(versions)
    }

    pub async fn dependencies<P: MetadataProvider>(
        &mut self,
        provider: &P,
        name: &PackageName,
        version: &Version,
    ) -> Result<Vec<Requirement>, ProviderError> {
        let key = (name.clone(), version.clone());
        if let Some(cached) = self.dependencies.get(&key) {
            return Ok(cached.clone());
        }
        let requires = provider.dependencies(name, version).await?;
        self.dependencies.insert(key, requires.clone());
        Ok(requires)
    }

    pub async fn hashes<P: MetadataProvider>(
        &mut self,
        provider: &P,
        name: &PackageName,
        version: &Version,
    ) -> Result<Vec<String>, ProviderError> {
        let key = (name.clone(), version.clone());
        if let Some(cached) = self.hashes.get(&key) {
            return Ok(cached.clone());
        }
        let hashes = provider.integrity_hashes(name, version).await?;
        self.hashes.insert(key, hashes.clone());
        Ok(hashes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::StaticProvider;

    fn name(s: &str) -> PackageName {
        PackageName::new(s).unwrap()
    }

    #[tokio::test]
    async fn memoizes_and_refreshes() {
        let mut provider = StaticProvider::new("https://example.test/pypi");
        provider.add("foo", "1.0", &[]);

        let mut cache = MetadataCache::new();
        let foo = name("foo");
        cache.versions(&provider, &foo).await.unwrap();
        assert!(cache.has_versions(&foo));

        cache.refresh(&foo);
        assert!(!cache.has_versions(&foo));
    }

    #[tokio::test]
    async fn seeded_versions_skip_the_provider() {
        // An empty provider would fail; the seeded entry answers instead.
        let provider = StaticProvider::new("https://example.test/pypi");
        let mut cache = MetadataCache::new();
        let foo = name("foo");
        cache.insert_versions(foo.clone(), vec![Version::parse("1.0").unwrap()]);

        let versions = cache.versions(&provider, &foo).await.unwrap();
        assert_eq!(versions.len(), 1);
    }
}
