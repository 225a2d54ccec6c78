//! Operation: display the dependency tree.

use std::path::Path;

use pyrite_core::lockfile::Lockfile;
use pyrite_core::requirement::PackageName;
use pyrite_core::version::Version;
use pyrite_resolver::graph::{DependencyGraph, GraphNode};
use pyrite_resolver::resolver::ResolveOptions;
use pyrite_util::errors::PyriteError;
use pyrite_util::progress;
use tracing::debug;

use crate::load_project;

/// Options for `pyrite tree`.
#[derive(Default)]
pub struct TreeOptions {
    /// Maximum tree depth to display.
    pub depth: Option<usize>,
    /// Show dependents of a specific package instead of the full tree.
    pub why: Option<String>,
}

/// Display the resolved dependency tree for the project.
///
/// A current lockfile answers without network traffic; otherwise one
/// fresh resolution runs (the lockfile is not rewritten).
pub async fn tree(project_root: &Path, opts: &TreeOptions) -> miette::Result<()> {
    let ctx = load_project(project_root)?;
    let tops: Vec<PackageName> = ctx.roots.iter().map(|r| r.name.clone()).collect();

    let lockfile_path = project_root.join("Pyrite.lock");
    let graph = match read_current_lock(&lockfile_path, &ctx)? {
        Some(lock) => {
            debug!(packages = lock.package.len(), "answering from lockfile");
            graph_from_lockfile(&lock)?
        }
        None => {
            let resolution =
                super::ops_resolve::run_resolution(&ctx, &ResolveOptions::default()).await?;
            resolution.graph
        }
    };

    if let Some(target) = &opts.why {
        return print_dependents(&graph, target);
    }

    print!("{}", graph.print_tree(&tops, opts.depth));
    Ok(())
}

fn read_current_lock(path: &Path, ctx: &crate::ProjectContext) -> miette::Result<Option<Lockfile>> {
    if !path.is_file() {
        return Ok(None);
    }
    let lock = Lockfile::from_path(path)?;
    if super::ops_lock::lock_is_current(&lock, &ctx.roots) {
        Ok(Some(lock))
    } else {
        progress::status_warn(
            "Outdated",
            "Pyrite.toml has changed since Pyrite.lock was written; resolving fresh",
        );
        Ok(None)
    }
}

/// Rebuild the dependency graph recorded in a lockfile.
fn graph_from_lockfile(lock: &Lockfile) -> miette::Result<DependencyGraph> {
    let mut graph = DependencyGraph::new();
    for pkg in &lock.package {
        graph.add_node(GraphNode {
            name: PackageName::new(&pkg.name)?,
            version: Version::parse(&pkg.version)?,
        });
    }
    for pkg in &lock.package {
        let name = PackageName::new(&pkg.name)?;
        let Some(from) = graph.find(&name) else { continue };
        for dep in &pkg.dependencies {
            let dep = PackageName::new(dep)?;
            if let Some(to) = graph.find(&dep) {
                graph.add_edge(from, to);
            }
        }
    }
    Ok(graph)
}

/// Print who depends on `target`, one dependent per line.
fn print_dependents(graph: &DependencyGraph, target: &str) -> miette::Result<()> {
    let name = PackageName::new(target)?;
    let Some(idx) = graph.find(&name) else {
        return Err(PyriteError::Generic {
            message: format!("package '{name}' is not in the resolved graph"),
        }
        .into());
    };

    let dependents = graph.dependents_of(idx);
    if dependents.is_empty() {
        println!("{} (top-level requirement)", graph.node(idx));
        return Ok(());
    }
    println!("{} is required by:", graph.node(idx));
    for dep in dependents {
        println!("  {}", graph.node(dep));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyrite_core::lockfile::LockedPackage;

    fn locked(name: &str, version: &str, deps: &[&str]) -> LockedPackage {
        LockedPackage {
            name: name.to_string(),
            version: version.to_string(),
            source: "https://pypi.org/pypi".to_string(),
            hashes: vec![format!("sha256:{}", "a".repeat(64))],
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            extras: vec![],
        }
    }

    #[test]
    fn lockfile_round_trips_into_a_graph() {
        let lock = Lockfile::generate(
            vec!["requests>=2.0".to_string()],
            vec![
                locked("requests", "2.31.0", &["idna"]),
                locked("idna", "3.7", &[]),
            ],
        );
        let graph = graph_from_lockfile(&lock).unwrap();
        assert_eq!(graph.len(), 2);

        let requests = graph.find(&PackageName::new("requests").unwrap()).unwrap();
        let deps = graph.dependencies_of(requests);
        assert_eq!(deps.len(), 1);
        assert_eq!(graph.node(deps[0]).name.as_str(), "idna");
    }
}
