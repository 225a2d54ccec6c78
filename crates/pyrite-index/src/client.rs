//! HTTP metadata client over the JSON index API.
//!
//! One project document per package lists every release; one release
//! document per pinned version carries the dependency declarations and
//! artifact digests. Transient failures are retried here so the resolver
//! never sees them.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use pyrite_core::requirement::{PackageName, Requirement};
use pyrite_core::version::Version;
use pyrite_resolver::cache::MetadataCache;
use pyrite_resolver::provider::{MetadataProvider, ProviderError};
use pyrite_util::errors::PyriteError;

use crate::repository::{PackageIndex, PYPI_URL};

const MAX_RETRIES: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(2);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const PREFETCH_PARALLELISM: usize = 8;

/// Build the shared reqwest client for index traffic.
pub fn build_client() -> miette::Result<Client> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("pyrite/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| {
            PyriteError::Network {
                message: format!("Failed to create HTTP client: {e}"),
            }
            .into()
        })
}

/// Project document: the version listing for one package.
#[derive(Debug, Deserialize)]
struct ProjectDocument {
    #[serde(default)]
    releases: BTreeMap<String, Vec<ArtifactEntry>>,
}

/// Release document: metadata for one pinned version.
#[derive(Debug, Deserialize)]
struct ReleaseDocument {
    info: ReleaseInfo,
    #[serde(default)]
    urls: Vec<ArtifactEntry>,
}

#[derive(Debug, Deserialize)]
struct ReleaseInfo {
    #[serde(default)]
    requires_dist: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ArtifactEntry {
    #[serde(default)]
    digests: BTreeMap<String, String>,
    #[serde(default)]
    yanked: bool,
}

/// Versions with at least one installable artifact, highest first.
fn parse_versions(doc: &ProjectDocument) -> Vec<Version> {
    let mut versions: Vec<Version> = doc
        .releases
        .iter()
        .filter(|(_, files)| files.iter().any(|f| !f.yanked))
        .filter_map(|(raw, _)| match Version::parse(raw) {
            Ok(v) => Some(v),
            Err(_) => {
                debug!(version = raw, "skipping unparseable version");
                None
            }
        })
        .collect();
    versions.sort();
    versions.reverse();
    versions
}

/// The declared requirements of one release, skipping malformed entries.
fn parse_requires(doc: &ReleaseDocument) -> Vec<Requirement> {
    doc.info
        .requires_dist
        .as_deref()
        .unwrap_or_default()
        .iter()
        .filter_map(|raw| match Requirement::parse(raw) {
            Ok(req) => Some(req),
            Err(err) => {
                warn!(requirement = raw, %err, "skipping malformed requirement");
                None
            }
        })
        .collect()
}

/// sha256 digests of the release's non-yanked artifacts, sorted.
fn parse_hashes(doc: &ReleaseDocument) -> Vec<String> {
    let mut hashes: Vec<String> = doc
        .urls
        .iter()
        .filter(|f| !f.yanked)
        .filter_map(|f| f.digests.get("sha256"))
        .map(|hex| format!("sha256:{hex}"))
        .collect();
    hashes.sort();
    hashes.dedup();
    hashes
}

#[derive(Debug, Clone)]
struct ReleaseMetadata {
    requires: Vec<Requirement>,
    hashes: Vec<String>,
}

/// Metadata provider backed by one or more remote indexes.
///
/// Indexes are tried in configuration order; the first index that knows a
/// package serves all of its metadata. A per-package pin restricts lookup
/// to one named index.
#[derive(Clone)]
pub struct IndexClient {
    client: Client,
    indexes: Vec<PackageIndex>,
    pins: BTreeMap<PackageName, String>,
    origins: Arc<Mutex<BTreeMap<PackageName, PackageIndex>>>,
    releases: Arc<Mutex<BTreeMap<(PackageName, String), ReleaseMetadata>>>,
}

impl IndexClient {
    pub fn new(client: Client, indexes: Vec<PackageIndex>) -> Self {
        Self {
            client,
            indexes,
            pins: BTreeMap::new(),
            origins: Arc::new(Mutex::new(BTreeMap::new())),
            releases: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Restrict one package to the index with the given name.
    pub fn pin(&mut self, name: PackageName, index_name: &str) {
        self.pins.insert(name, index_name.to_string());
    }

    fn candidate_indexes(&self, name: &PackageName) -> Vec<&PackageIndex> {
        match self.pins.get(name) {
            Some(pinned) => self
                .indexes
                .iter()
                .filter(|idx| idx.name == *pinned)
                .collect(),
            None => self.indexes.iter().collect(),
        }
    }

    fn origin_of(&self, name: &PackageName) -> Option<PackageIndex> {
        self.origins
            .lock()
            .ok()
            .and_then(|origins| origins.get(name).cloned())
    }

    fn record_origin(&self, name: &PackageName, index: &PackageIndex) {
        if let Ok(mut origins) = self.origins.lock() {
            origins.insert(name.clone(), index.clone());
        }
    }

    /// GET a JSON document with retries. `Ok(None)` means 404.
    async fn fetch_document<T: DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<Option<T>, ProviderError> {
        let mut last_err = String::new();

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                tokio::time::sleep(RETRY_DELAY * attempt).await;
            }

            match self.client.get(url).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status == reqwest::StatusCode::NOT_FOUND {
                        return Ok(None);
                    }
                    if status.is_server_error() {
                        last_err = format!("HTTP {status} from {url}");
                        continue;
                    }
                    if !status.is_success() {
                        return Err(ProviderError::Fetch {
                            message: format!("HTTP {status} fetching {url}"),
                        });
                    }

                    return match resp.json::<T>().await {
                        Ok(doc) => Ok(Some(doc)),
                        Err(e) => Err(ProviderError::Fetch {
                            message: format!("Invalid JSON from {url}: {e}"),
                        }),
                    };
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    last_err = format!("{e}");
                    continue;
                }
                Err(e) => {
                    return Err(ProviderError::Fetch {
                        message: format!("Request to {url} failed: {e}"),
                    });
                }
            }
        }

        Err(ProviderError::Fetch {
            message: format!("Failed after {MAX_RETRIES} retries for {url}: {last_err}"),
        })
    }

    /// Fetch (or reuse) the parsed release document for one version.
    async fn release_metadata(
        &self,
        name: &PackageName,
        version: &Version,
    ) -> Result<ReleaseMetadata, ProviderError> {
        let key = (name.clone(), version.to_string());
        if let Ok(releases) = self.releases.lock() {
            if let Some(cached) = releases.get(&key) {
                return Ok(cached.clone());
            }
        }

        let indexes = match self.origin_of(name) {
            Some(origin) => vec![origin],
            None => self.candidate_indexes(name).into_iter().cloned().collect(),
        };

        for index in &indexes {
            let url = index.release_url(name.as_str(), &version.to_string());
            match self.fetch_document::<ReleaseDocument>(&url).await {
                Ok(Some(doc)) => {
                    let metadata = ReleaseMetadata {
                        requires: parse_requires(&doc),
                        hashes: parse_hashes(&doc),
                    };
                    self.record_origin(name, index);
                    if let Ok(mut releases) = self.releases.lock() {
                        releases.insert(key, metadata.clone());
                    }
                    return Ok(metadata);
                }
                Ok(None) => continue,
                Err(err) => {
                    warn!(%name, %version, index = index.name, %err, "release lookup failed");
                }
            }
        }

        Err(ProviderError::Fetch {
            message: format!("no index has metadata for {name} {version}"),
        })
    }

    /// Warm the cache with the version lists for the given packages.
    ///
    /// Fetches run concurrently, bounded by [`PREFETCH_PARALLELISM`]; the
    /// cache is seeded in name order afterwards so completion order never
    /// influences resolution. Failures are dropped here, the resolver
    /// refetches and reports them in context.
    pub async fn prefetch(&self, names: &[PackageName], cache: &mut MetadataCache) {
        let mut pending: Vec<PackageName> = names
            .iter()
            .filter(|name| !cache.has_versions(name))
            .cloned()
            .collect();
        pending.sort();
        pending.dedup();
        if pending.is_empty() {
            return;
        }

        let semaphore = Arc::new(Semaphore::new(PREFETCH_PARALLELISM));
        let mut tasks = JoinSet::new();
        for name in pending {
            let client = self.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire().await;
                let versions = client.list_versions(&name).await;
                (name, versions)
            });
        }

        let mut fetched = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            let Ok((name, result)) = joined else { continue };
            match result {
                Ok(versions) => {
                    fetched.insert(name, versions);
                }
                Err(err) => debug!(%name, %err, "prefetch skipped"),
            }
        }
        for (name, versions) in fetched {
            cache.insert_versions(name, versions);
        }
    }
}

impl MetadataProvider for IndexClient {
    async fn list_versions(&self, name: &PackageName) -> Result<Vec<Version>, ProviderError> {
        let mut errored = false;
        for index in self.candidate_indexes(name) {
            let url = index.project_url(name.as_str());
            match self.fetch_document::<ProjectDocument>(&url).await {
                Ok(Some(doc)) => {
                    self.record_origin(name, index);
                    return Ok(parse_versions(&doc));
                }
                Ok(None) => continue,
                Err(err) => {
                    warn!(%name, index = index.name, %err, "index lookup failed");
                    errored = true;
                }
            }
        }
        if errored {
            Err(ProviderError::Fetch {
                message: format!("every index lookup for {name} failed"),
            })
        } else {
            Err(ProviderError::PackageNotFound { name: name.clone() })
        }
    }

    async fn dependencies(
        &self,
        name: &PackageName,
        version: &Version,
    ) -> Result<Vec<Requirement>, ProviderError> {
        Ok(self.release_metadata(name, version).await?.requires)
    }

    async fn integrity_hashes(
        &self,
        name: &PackageName,
        version: &Version,
    ) -> Result<Vec<String>, ProviderError> {
        Ok(self.release_metadata(name, version).await?.hashes)
    }

    fn source_of(&self, name: &PackageName) -> String {
        match self.origin_of(name) {
            Some(origin) => origin.url,
            None => self
                .indexes
                .first()
                .map(|idx| idx.url.clone())
                .unwrap_or_else(|| PYPI_URL.to_string()),
        }
    }
}
