//! Package index abstraction: URL layout and configuration.

use std::collections::BTreeMap;

use pyrite_core::requirement::normalize_name;

/// The default public index.
pub const PYPI_URL: &str = "https://pypi.org/pypi";

/// A configured package index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageIndex {
    pub name: String,
    pub url: String,
}

impl PackageIndex {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.trim_end_matches('/').to_string(),
        }
    }

    /// Construct the default PyPI index.
    pub fn pypi() -> Self {
        Self::new("pypi", PYPI_URL)
    }

    /// URL of the project document: version listing plus latest metadata.
    pub fn project_url(&self, name: &str) -> String {
        format!("{}/{}/json", self.url, normalize_name(name))
    }

    /// URL of the per-release document for one pinned version.
    pub fn release_url(&self, name: &str, version: &str) -> String {
        format!("{}/{}/{}/json", self.url, normalize_name(name), version)
    }
}

/// Build the ordered index list for a resolution run.
///
/// Manifest-declared indexes come first, in declaration (name) order; the
/// default index is appended last unless the manifest already declares an
/// index with the default URL.
pub fn build_indexes(declared: &BTreeMap<String, String>) -> Vec<PackageIndex> {
    let mut indexes: Vec<PackageIndex> = declared
        .iter()
        .map(|(name, url)| PackageIndex::new(name, url))
        .collect();
    if !indexes.iter().any(|idx| idx.url == PYPI_URL) {
        indexes.push(PackageIndex::pypi());
    }
    indexes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_url_normalizes_the_name() {
        let idx = PackageIndex::pypi();
        assert_eq!(
            idx.project_url("Typing_Extensions"),
            "https://pypi.org/pypi/typing-extensions/json"
        );
    }

    #[test]
    fn release_url_format() {
        let idx = PackageIndex::pypi();
        assert_eq!(
            idx.release_url("requests", "2.31.0"),
            "https://pypi.org/pypi/requests/2.31.0/json"
        );
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let idx = PackageIndex::new("corp", "https://pypi.corp.example/simple/");
        assert_eq!(idx.url, "https://pypi.corp.example/simple");
    }

    #[test]
    fn default_index_is_appended_last() {
        let declared = BTreeMap::from([(
            "corp".to_string(),
            "https://pypi.corp.example/pypi".to_string(),
        )]);
        let indexes = build_indexes(&declared);
        assert_eq!(indexes.len(), 2);
        assert_eq!(indexes[0].name, "corp");
        assert_eq!(indexes[1], PackageIndex::pypi());
    }

    #[test]
    fn default_index_is_not_duplicated() {
        let declared = BTreeMap::from([("main".to_string(), format!("{PYPI_URL}/"))]);
        let indexes = build_indexes(&declared);
        assert_eq!(indexes.len(), 1);
        assert_eq!(indexes[0].name, "main");
    }
}
