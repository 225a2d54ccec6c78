//! Core resolution algorithm: backtracking depth-first search with an
//! explicit checkpoint stack.
//!
//! Each search frame snapshots the partial assignment before a candidate
//! is tried, so backtracking is a restore, not a re-derivation. The frame
//! stack replaces language-level recursion, which bounds memory and gives
//! the cancellation check a single place to live. Candidate ordering is
//! fully deterministic: identical inputs and provider responses produce a
//! bit-identical lockfile.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use miette::Diagnostic;
use thiserror::Error;
use tracing::{debug, trace, warn};

use pyrite_core::lockfile::{LockedPackage, Lockfile};
use pyrite_core::marker::Environment;
use pyrite_core::requirement::{PackageName, Requirement};
use pyrite_core::specifier::SpecifierSet;
use pyrite_core::version::Version;

use crate::cache::MetadataCache;
use crate::conflict::{Conflict, ConflictCause, ConflictReport};
use crate::graph::{DependencyGraph, GraphNode};
use crate::provider::{MetadataProvider, ProviderError};

/// Errors surfaced by [`resolve`].
#[derive(Debug, Error, Diagnostic)]
pub enum ResolveError {
    /// The search space was exhausted without a satisfying assignment.
    #[error("dependency resolution is impossible\n\n{report}")]
    #[diagnostic(help("relax one of the conflicting requirements shown above"))]
    Impossible { report: ConflictReport },

    /// The caller cancelled the run; no partial output was produced.
    #[error("resolution was cancelled")]
    Cancelled,

    /// A top-level requirement names a package no index knows.
    #[error("package {name} not found in any index")]
    PackageNotFound { name: PackageName },
}

/// Cooperative cancellation signal, checked at every search-tree node.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Tuning for one resolution run.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Consider pre-releases even when a stable candidate satisfies.
    pub allow_prerelease: bool,
    /// Versions to try first when they still satisfy all constraints,
    /// typically the pins of an existing lockfile (stable re-lock).
    pub preferred: BTreeMap<PackageName, Version>,
}

/// A fully pinned package in a successful resolution.
#[derive(Debug, Clone)]
pub struct ResolvedPackage {
    pub name: PackageName,
    pub version: Version,
    pub source: String,
    pub hashes: Vec<String>,
    pub extras: BTreeSet<String>,
    pub dependencies: Vec<PackageName>,
}

/// The output of a successful resolution run.
#[derive(Debug)]
pub struct Resolution {
    pub packages: BTreeMap<PackageName, ResolvedPackage>,
    pub graph: DependencyGraph,
}

impl Resolution {
    /// Build the canonical lockfile for this resolution.
    pub fn to_lockfile(&self, roots: &[Requirement]) -> Lockfile {
        let requirements = roots.iter().map(|r| r.to_string()).collect();
        let packages = self
            .packages
            .values()
            .map(|pkg| LockedPackage {
                name: pkg.name.to_string(),
                version: pkg.version.to_string(),
                source: pkg.source.clone(),
                hashes: pkg.hashes.clone(),
                dependencies: pkg.dependencies.iter().map(|d| d.to_string()).collect(),
                extras: pkg.extras.iter().cloned().collect(),
            })
            .collect();
        Lockfile::generate(requirements, packages)
    }
}

/// The partial assignment being built during search.
///
/// Checkpoints are whole-state snapshots taken before each tentative
/// choice; restoring one is a plain assignment.
#[derive(Debug, Clone, Default)]
struct ResolutionState {
    pinned: BTreeMap<PackageName, Pinned>,
    constraints: BTreeMap<PackageName, Vec<ConflictCause>>,
    /// Unresolved names in first-introduction order.
    queue: VecDeque<PackageName>,
}

#[derive(Debug, Clone)]
struct Pinned {
    version: Version,
    source: String,
    hashes: Vec<String>,
    requires: Vec<Requirement>,
    extras: BTreeSet<String>,
}

impl ResolutionState {
    /// The next name needing a decision, skipping names pinned since they
    /// were queued.
    fn next_unresolved(&mut self) -> Option<PackageName> {
        while let Some(name) = self.queue.pop_front() {
            if !self.pinned.contains_key(&name) {
                return Some(name);
            }
        }
        None
    }

    /// Intersection of every accumulated specifier set naming a package.
    fn combined_specifiers(&self, name: &PackageName) -> SpecifierSet {
        let mut combined = SpecifierSet::any();
        if let Some(causes) = self.constraints.get(name) {
            for cause in causes {
                combined.merge(&cause.requirement.specifiers);
            }
        }
        combined
    }

    /// Union of the extras every constraining requirement asks of a package.
    fn wanted_extras(&self, name: &PackageName) -> BTreeSet<String> {
        let mut extras = BTreeSet::new();
        if let Some(causes) = self.constraints.get(name) {
            for cause in causes {
                extras.extend(cause.requirement.extras.iter().cloned());
            }
        }
        extras
    }

    fn is_root(&self, name: &PackageName) -> bool {
        self.constraints
            .get(name)
            .is_some_and(|causes| causes.iter().any(|c| c.introduced_by.is_none()))
    }

    fn causes_of(&self, name: &PackageName) -> Vec<ConflictCause> {
        self.constraints.get(name).cloned().unwrap_or_default()
    }
}

/// One checkpoint on the explicit search stack.
struct Frame {
    name: PackageName,
    /// Ordered candidates still to try; `next` indexes the current one.
    candidates: Vec<Version>,
    next: usize,
    /// Everything the provider had, for conflict messages.
    available: Vec<Version>,
    /// State snapshot taken before any candidate of this frame was tried.
    saved: ResolutionState,
}

/// Resolve a set of top-level requirements into a pinned assignment.
///
/// The provider is queried lazily through `cache`; `cancel` aborts the
/// search at the next node boundary.
pub async fn resolve<P: MetadataProvider>(
    roots: &[Requirement],
    env: &Environment,
    provider: &P,
    cache: &mut MetadataCache,
    options: &ResolveOptions,
    cancel: &CancelToken,
) -> Result<Resolution, ResolveError> {
    let mut state = ResolutionState::default();
    let no_extras = BTreeSet::new();
    for req in roots {
        if !req.is_active(env, &no_extras) {
            debug!(requirement = %req, "skipping root requirement, marker is false");
            continue;
        }
        state
            .constraints
            .entry(req.name.clone())
            .or_default()
            .push(ConflictCause {
                requirement: req.clone(),
                introduced_by: None,
            });
        if !state.queue.contains(&req.name) {
            state.queue.push_back(req.name.clone());
        }
    }

    let mut frames: Vec<Frame> = Vec::new();
    let mut report = ConflictReport::new();

    'search: loop {
        if cancel.is_cancelled() {
            return Err(ResolveError::Cancelled);
        }

        let Some(name) = state.next_unresolved() else {
            break;
        };

        let combined = state.combined_specifiers(&name);
        let available = match cache.versions(provider, &name).await {
            Ok(versions) => versions,
            Err(ProviderError::PackageNotFound { .. }) => {
                if state.is_root(&name) {
                    return Err(ResolveError::PackageNotFound { name });
                }
                Vec::new()
            }
            Err(ProviderError::Fetch { message }) => {
                warn!(package = %name, %message, "failed to list versions");
                Vec::new()
            }
        };
        let candidates = order_candidates(&available, &combined, options, &name);
        trace!(package = %name, candidates = candidates.len(), "decision point");

        let mut frame = Frame {
            name,
            candidates,
            next: 0,
            available,
            saved: state.clone(),
        };

        loop {
            if cancel.is_cancelled() {
                return Err(ResolveError::Cancelled);
            }

            match frame.candidates.get(frame.next).cloned() {
                Some(version) => {
                    state = frame.saved.clone();
                    match apply_candidate(&mut state, &frame.name, &version, provider, cache, env)
                        .await
                    {
                        Applied::Ok => {
                            trace!(package = %frame.name, %version, "pinned");
                            frames.push(frame);
                            continue 'search;
                        }
                        Applied::Rejected(conflict) => {
                            trace!(package = %frame.name, %version, "candidate rejected");
                            if let Some(conflict) = conflict {
                                report.push(conflict);
                            }
                            frame.next += 1;
                        }
                    }
                }
                None => {
                    // Exhausted: record why, then backtrack to the nearest
                    // frame with an untried candidate.
                    report.push(Conflict {
                        package: frame.name.clone(),
                        causes: frame.saved.causes_of(&frame.name),
                        available: frame.available.clone(),
                    });
                    debug!(package = %frame.name, "no satisfying candidate, backtracking");
                    match frames.pop() {
                        Some(parent) => {
                            frame = parent;
                            frame.next += 1;
                        }
                        None => return Err(ResolveError::Impossible { report }),
                    }
                }
            }
        }
    }

    Ok(build_resolution(state, env))
}

enum Applied {
    Ok,
    /// Candidate cannot be used; optionally carries the conflict it hit.
    Rejected(Option<Conflict>),
}

/// Tentatively pin one candidate and propagate its requirements.
///
/// Fetch failures for this release reject the candidate (the provider has
/// already retried). A propagated requirement that an existing pin
/// violates also rejects it.
async fn apply_candidate<P: MetadataProvider>(
    state: &mut ResolutionState,
    name: &PackageName,
    version: &Version,
    provider: &P,
    cache: &mut MetadataCache,
    env: &Environment,
) -> Applied {
    let requires = match cache.dependencies(provider, name, version).await {
        Ok(requires) => requires,
        Err(err) => {
            warn!(package = %name, %version, %err, "metadata unavailable");
            return Applied::Rejected(None);
        }
    };
    let hashes = match cache.hashes(provider, name, version).await {
        Ok(hashes) => hashes,
        Err(err) => {
            warn!(package = %name, %version, %err, "integrity data unavailable");
            return Applied::Rejected(None);
        }
    };
    if hashes.is_empty() {
        warn!(package = %name, %version, "release carries no integrity hashes");
        return Applied::Rejected(None);
    }

    let extras = state.wanted_extras(name);
    state.pinned.insert(
        name.clone(),
        Pinned {
            version: version.clone(),
            source: provider.source_of(name),
            hashes,
            requires: requires.clone(),
            extras: extras.clone(),
        },
    );

    // Propagate the candidate's active requirements. Growth of a pinned
    // package's extras re-activates its own requirements, hence the
    // worklist instead of a single pass.
    let mut work: VecDeque<(Requirement, (PackageName, Version))> = requires
        .into_iter()
        .filter(|r| r.is_active(env, &extras))
        .map(|r| (r, (name.clone(), version.clone())))
        .collect();

    while let Some((req, introduced_by)) = work.pop_front() {
        let target = req.name.clone();
        let cause = ConflictCause {
            requirement: req,
            introduced_by: Some(introduced_by),
        };
        state
            .constraints
            .entry(target.clone())
            .or_default()
            .push(cause.clone());

        let Some(pinned) = state.pinned.get(&target) else {
            if !state.queue.contains(&target) {
                state.queue.push_back(target);
            }
            continue;
        };

        // An already-pinned, still-compatible package short-circuits, so
        // cycles terminate; an incompatible one fails this candidate.
        if !cause.requirement.specifiers.contains(&pinned.version) {
            let conflict = Conflict {
                package: target.clone(),
                causes: state.causes_of(&target),
                available: vec![pinned.version.clone()],
            };
            return Applied::Rejected(Some(conflict));
        }

        let wanted = state.wanted_extras(&target);
        if wanted != pinned.extras {
            let pinned_version = pinned.version.clone();
            let old_extras = pinned.extras.clone();
            let requires = pinned.requires.clone();
            if let Some(entry) = state.pinned.get_mut(&target) {
                entry.extras = wanted.clone();
            }
            for r in requires {
                if r.is_active(env, &wanted) && !r.is_active(env, &old_extras) {
                    work.push_back((r, (target.clone(), pinned_version.clone())));
                }
            }
        }
    }

    Applied::Ok
}

/// Deterministic candidate ordering: preferred pin first, then versions
/// descending. Pre-releases are considered only when requested, when the
/// constraint itself mentions one, or when no stable candidate satisfies;
/// once admitted they rank by version like any other candidate.
fn order_candidates(
    available: &[Version],
    combined: &SpecifierSet,
    options: &ResolveOptions,
    name: &PackageName,
) -> Vec<Version> {
    let satisfying: Vec<&Version> = available.iter().filter(|v| combined.contains(v)).collect();

    let include_prereleases = options.allow_prerelease
        || combined.mentions_prerelease()
        || satisfying.iter().all(|v| v.is_prerelease());

    let mut ordered: Vec<Version> = satisfying
        .into_iter()
        .filter(|v| include_prereleases || !v.is_prerelease())
        .cloned()
        .collect();
    ordered.sort();
    ordered.reverse();

    if let Some(preferred) = options.preferred.get(name) {
        if let Some(pos) = ordered.iter().position(|v| v == preferred) {
            let v = ordered.remove(pos);
            ordered.insert(0, v);
        }
    }

    ordered
}

fn build_resolution(state: ResolutionState, env: &Environment) -> Resolution {
    let mut packages = BTreeMap::new();
    let mut graph = DependencyGraph::new();

    for (name, pinned) in &state.pinned {
        graph.add_node(GraphNode {
            name: name.clone(),
            version: pinned.version.clone(),
        });
    }

    for (name, pinned) in state.pinned.iter() {
        let dependencies: BTreeSet<PackageName> = pinned
            .requires
            .iter()
            .filter(|r| r.is_active(env, &pinned.extras))
            .map(|r| r.name.clone())
            .filter(|dep| state.pinned.contains_key(dep))
            .collect();

        if let Some(from) = graph.find(name) {
            for dep in &dependencies {
                if let Some(to) = graph.find(dep) {
                    graph.add_edge(from, to);
                }
            }
        }

        packages.insert(
            name.clone(),
            ResolvedPackage {
                name: name.clone(),
                version: pinned.version.clone(),
                source: pinned.source.clone(),
                hashes: pinned.hashes.clone(),
                extras: pinned.extras.clone(),
                dependencies: dependencies.into_iter().collect(),
            },
        );
    }

    Resolution { packages, graph }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn name(s: &str) -> PackageName {
        PackageName::new(s).unwrap()
    }

    #[test]
    fn ordering_prefers_highest_stable() {
        let available = vec![v("1.0"), v("1.5"), v("2.0"), v("2.1a1")];
        let combined = SpecifierSet::parse(">=1.0").unwrap();
        let ordered = order_candidates(&available, &combined, &ResolveOptions::default(), &name("foo"));
        assert_eq!(ordered[0], v("2.0"));
        assert!(!ordered.contains(&v("2.1a1")));
    }

    #[test]
    fn prereleases_used_when_nothing_stable_satisfies() {
        let available = vec![v("1.0"), v("2.0rc1")];
        let combined = SpecifierSet::parse(">=2.0rc1").unwrap();
        let ordered = order_candidates(&available, &combined, &ResolveOptions::default(), &name("foo"));
        assert_eq!(ordered, vec![v("2.0rc1")]);
    }

    #[test]
    fn prereleases_opt_in() {
        let available = vec![v("1.0"), v("2.0a1")];
        let combined = SpecifierSet::any();
        let opts = ResolveOptions {
            allow_prerelease: true,
            ..Default::default()
        };
        let ordered = order_candidates(&available, &combined, &opts, &name("foo"));
        assert_eq!(ordered, vec![v("2.0a1"), v("1.0")]);
    }

    #[test]
    fn preferred_version_moves_to_front() {
        let available = vec![v("1.0"), v("1.5"), v("2.0")];
        let combined = SpecifierSet::any();
        let opts = ResolveOptions {
            preferred: [(name("foo"), v("1.5"))].into(),
            ..Default::default()
        };
        let ordered = order_candidates(&available, &combined, &opts, &name("foo"));
        assert_eq!(ordered[0], v("1.5"));
        assert_eq!(ordered[1], v("2.0"));
    }

    #[test]
    fn preferred_version_ignored_when_unsatisfying() {
        let available = vec![v("1.0"), v("2.0")];
        let combined = SpecifierSet::parse(">=1.5").unwrap();
        let opts = ResolveOptions {
            preferred: [(name("foo"), v("1.0"))].into(),
            ..Default::default()
        };
        let ordered = order_candidates(&available, &combined, &opts, &name("foo"));
        assert_eq!(ordered, vec![v("2.0")]);
    }

    #[test]
    fn cancel_token_flips_once() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
        assert!(token.clone().is_cancelled());
    }
}
