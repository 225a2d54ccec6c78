//! End-to-end resolution scenarios against an in-memory provider.

use std::collections::BTreeMap;

use pyrite_core::marker::Environment;
use pyrite_core::requirement::{PackageName, Requirement};
use pyrite_core::version::Version;
use pyrite_resolver::cache::MetadataCache;
use pyrite_resolver::provider::StaticProvider;
use pyrite_resolver::resolver::{resolve, CancelToken, ResolveError, ResolveOptions, Resolution};

const SOURCE: &str = "https://example.test/pypi";

fn name(s: &str) -> PackageName {
    PackageName::new(s).unwrap()
}

fn reqs(inputs: &[&str]) -> Vec<Requirement> {
    inputs.iter().map(|r| Requirement::parse(r).unwrap()).collect()
}

async fn run(provider: &StaticProvider, roots: &[&str]) -> Result<Resolution, ResolveError> {
    run_with(provider, roots, &ResolveOptions::default()).await
}

async fn run_with(
    provider: &StaticProvider,
    roots: &[&str],
    options: &ResolveOptions,
) -> Result<Resolution, ResolveError> {
    let mut cache = MetadataCache::new();
    resolve(
        &reqs(roots),
        &Environment::default(),
        provider,
        &mut cache,
        options,
        &CancelToken::new(),
    )
    .await
}

fn version_of(resolution: &Resolution, package: &str) -> String {
    resolution.packages[&name(package)].version.to_string()
}

#[tokio::test]
async fn picks_highest_satisfying_stable() {
    let mut provider = StaticProvider::new(SOURCE);
    for v in ["1.0", "1.5", "1.9", "2.0"] {
        provider.add("foo", v, &[]);
    }

    let resolution = run(&provider, &["foo>=1.0,<2.0"]).await.unwrap();
    assert_eq!(version_of(&resolution, "foo"), "1.9");
}

#[tokio::test]
async fn resolves_transitive_graph() {
    let mut provider = StaticProvider::new(SOURCE);
    provider.add("requests", "2.31.0", &["idna>=2.5,<4", "certifi>=2017.4.17"]);
    provider.add("idna", "3.7", &[]);
    provider.add("idna", "2.8", &[]);
    provider.add("certifi", "2024.2.2", &[]);

    let resolution = run(&provider, &["requests>=2.0"]).await.unwrap();
    assert_eq!(resolution.packages.len(), 3);
    assert_eq!(version_of(&resolution, "idna"), "3.7");

    let requests = &resolution.packages[&name("requests")];
    assert_eq!(
        requests.dependencies,
        vec![name("certifi"), name("idna")]
    );
}

#[tokio::test]
async fn unsatisfiable_toplevel_conflict_is_explained() {
    let mut provider = StaticProvider::new(SOURCE);
    provider.add("a", "0.5", &[]);
    provider.add("a", "2.5", &[]);

    let err = run(&provider, &["a>=2.0", "a<1.0"]).await.unwrap_err();
    let ResolveError::Impossible { report } = err else {
        panic!("expected Impossible, got {err:?}");
    };
    let text = report.to_string();
    assert!(text.contains("Unable to choose a version for a"));
    assert!(text.contains(">=2.0"));
    assert!(text.contains("<1.0"));
    assert!(text.contains("0.5"));
    assert!(text.contains("2.5"));
}

#[tokio::test]
async fn backtracks_to_an_older_parent() {
    // bar 2.0 needs a child constraint nothing satisfies together with the
    // top-level pin; bar 1.0 works.
    let mut provider = StaticProvider::new(SOURCE);
    provider.add("bar", "2.0", &["child<1.0"]);
    provider.add("bar", "1.0", &["child>=1.0"]);
    provider.add("child", "1.4", &[]);

    let resolution = run(&provider, &["bar", "child>=1.0"]).await.unwrap();
    assert_eq!(version_of(&resolution, "bar"), "1.0");
    assert_eq!(version_of(&resolution, "child"), "1.4");
}

#[tokio::test]
async fn dependency_cycles_resolve() {
    let mut provider = StaticProvider::new(SOURCE);
    provider.add("a", "1.0", &["b>=1.0"]);
    provider.add("b", "1.0", &["a>=1.0"]);

    let resolution = run(&provider, &["a"]).await.unwrap();
    assert_eq!(version_of(&resolution, "a"), "1.0");
    assert_eq!(version_of(&resolution, "b"), "1.0");
    assert_eq!(resolution.packages[&name("a")].dependencies, vec![name("b")]);
    assert_eq!(resolution.packages[&name("b")].dependencies, vec![name("a")]);
}

#[tokio::test]
async fn resolution_is_deterministic() {
    let mut provider = StaticProvider::new(SOURCE);
    provider.add("requests", "2.31.0", &["idna>=2.5", "urllib3>=1.21,<3"]);
    provider.add("idna", "3.7", &[]);
    provider.add("idna", "3.6", &[]);
    provider.add("urllib3", "2.2.1", &[]);
    provider.add("urllib3", "1.26.18", &[]);

    let roots = ["requests>=2.0"];
    let first = run(&provider, &roots).await.unwrap();
    let second = run(&provider, &roots).await.unwrap();

    let root_reqs = reqs(&roots);
    let lock_a = first.to_lockfile(&root_reqs).to_string_pretty().unwrap();
    let lock_b = second.to_lockfile(&root_reqs).to_string_pretty().unwrap();
    assert_eq!(lock_a, lock_b);
}

#[tokio::test]
async fn stable_relock_prefers_locked_versions() {
    let mut provider = StaticProvider::new(SOURCE);
    provider.add("foo", "1.5", &[]);
    provider.add("foo", "1.9", &[]);

    let options = ResolveOptions {
        preferred: BTreeMap::from([(name("foo"), Version::parse("1.5").unwrap())]),
        ..Default::default()
    };
    let resolution = run_with(&provider, &["foo>=1.0"], &options).await.unwrap();
    assert_eq!(version_of(&resolution, "foo"), "1.5");
}

#[tokio::test]
async fn stale_lock_preference_is_dropped() {
    let mut provider = StaticProvider::new(SOURCE);
    provider.add("foo", "1.5", &[]);
    provider.add("foo", "2.1", &[]);

    // The previously locked 1.5 no longer satisfies the widened floor.
    let options = ResolveOptions {
        preferred: BTreeMap::from([(name("foo"), Version::parse("1.5").unwrap())]),
        ..Default::default()
    };
    let resolution = run_with(&provider, &["foo>=2.0"], &options).await.unwrap();
    assert_eq!(version_of(&resolution, "foo"), "2.1");
}

#[tokio::test]
async fn fetch_failure_skips_to_next_candidate() {
    let mut provider = StaticProvider::new(SOURCE);
    provider.add("foo", "1.9", &[]);
    provider.add("foo", "1.5", &[]);
    provider.mark_unavailable("foo", "1.9");

    let resolution = run(&provider, &["foo>=1.0"]).await.unwrap();
    assert_eq!(version_of(&resolution, "foo"), "1.5");
}

#[tokio::test]
async fn unknown_toplevel_package_errors() {
    let provider = StaticProvider::new(SOURCE);
    let err = run(&provider, &["ghost>=1.0"]).await.unwrap_err();
    assert!(matches!(err, ResolveError::PackageNotFound { .. }));
}

#[tokio::test]
async fn markers_gate_transitive_requirements() {
    let mut provider = StaticProvider::new(SOURCE);
    provider.add(
        "portable",
        "1.0",
        &["pywin32>=300; sys_platform == \"win32\""],
    );
    // pywin32 is deliberately absent; a correct resolver never asks for it
    // on linux.
    let resolution = run(&provider, &["portable"]).await.unwrap();
    assert_eq!(resolution.packages.len(), 1);
}

#[tokio::test]
async fn extras_pull_in_optional_dependencies() {
    let mut provider = StaticProvider::new(SOURCE);
    provider.add(
        "httpx",
        "0.27.0",
        &["idna", "socksio>=1.0; extra == \"socks\""],
    );
    provider.add("idna", "3.7", &[]);
    provider.add("socksio", "1.0.0", &[]);

    let without = run(&provider, &["httpx"]).await.unwrap();
    assert!(!without.packages.contains_key(&name("socksio")));

    let with = run(&provider, &["httpx[socks]"]).await.unwrap();
    assert!(with.packages.contains_key(&name("socksio")));
    let httpx = &with.packages[&name("httpx")];
    assert!(httpx.extras.contains("socks"));
}

#[tokio::test]
async fn prerelease_not_chosen_when_stable_satisfies() {
    let mut provider = StaticProvider::new(SOURCE);
    provider.add("foo", "1.0", &[]);
    provider.add("foo", "2.0b1", &[]);

    let resolution = run(&provider, &["foo"]).await.unwrap();
    assert_eq!(version_of(&resolution, "foo"), "1.0");

    let options = ResolveOptions {
        allow_prerelease: true,
        ..Default::default()
    };
    let resolution = run_with(&provider, &["foo"], &options).await.unwrap();
    assert_eq!(version_of(&resolution, "foo"), "2.0b1");
}

#[tokio::test]
async fn cancellation_aborts_without_output() {
    let mut provider = StaticProvider::new(SOURCE);
    provider.add("foo", "1.0", &[]);

    let cancel = CancelToken::new();
    cancel.cancel();
    let mut cache = MetadataCache::new();
    let err = resolve(
        &reqs(&["foo"]),
        &Environment::default(),
        &provider,
        &mut cache,
        &ResolveOptions::default(),
        &cancel,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ResolveError::Cancelled));
}

#[tokio::test]
async fn lockfile_satisfies_every_edge() {
    let mut provider = StaticProvider::new(SOURCE);
    provider.add("requests", "2.31.0", &["idna>=2.5,<4"]);
    provider.add("idna", "3.7", &[]);

    let roots = reqs(&["requests>=2.0"]);
    let resolution = run(&provider, &["requests>=2.0"]).await.unwrap();
    let lock = resolution.to_lockfile(&roots);

    assert!(lock.validate().is_ok());
    assert!(lock.matches_requirements(&["requests>=2.0".to_string()]));
    for pkg in &lock.package {
        assert!(!pkg.hashes.is_empty());
        assert_eq!(pkg.source, SOURCE);
    }
    // Every edge target satisfies the edge constraint.
    let idna = Version::parse(lock.locked_version("idna").unwrap()).unwrap();
    let constraint = Requirement::parse("idna>=2.5,<4").unwrap();
    assert!(constraint.specifiers.contains(&idna));
}
