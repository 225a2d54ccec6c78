//! Operation: resolve and display without touching the lockfile.

use std::path::Path;

use pyrite_core::requirement::PackageName;
use pyrite_resolver::cache::MetadataCache;
use pyrite_resolver::resolver::{self, Resolution, ResolveOptions};
use pyrite_util::progress;
use tracing::debug;

use crate::{cancel_on_ctrl_c, load_project, ProjectContext};

/// Options for `pyrite resolve`.
#[derive(Default)]
pub struct ResolveCmdOptions {
    /// Consider pre-release versions for every package.
    pub allow_prerelease: bool,
    pub verbose: bool,
}

/// Run one resolution with prefetching, a spinner, and Ctrl-C wiring.
pub(crate) async fn run_resolution(
    ctx: &ProjectContext,
    options: &ResolveOptions,
) -> miette::Result<Resolution> {
    let mut cache = MetadataCache::new();
    let root_names: Vec<PackageName> = ctx.roots.iter().map(|r| r.name.clone()).collect();

    debug!(roots = root_names.len(), "starting resolution");
    let sp = progress::spinner("Resolving dependencies...");
    ctx.provider.prefetch(&root_names, &mut cache).await;

    let cancel = cancel_on_ctrl_c();
    let result = resolver::resolve(
        &ctx.roots,
        &ctx.manifest.environment,
        &ctx.provider,
        &mut cache,
        options,
        &cancel,
    )
    .await;
    sp.finish_and_clear();

    let resolution = result?;
    progress::status("Resolved", &format!("{} packages", resolution.packages.len()));
    Ok(resolution)
}

/// Resolve the manifest's requirements and print the dependency tree,
/// without writing `Pyrite.lock`.
pub async fn resolve_preview(project_root: &Path, opts: &ResolveCmdOptions) -> miette::Result<()> {
    let ctx = load_project(project_root)?;

    let options = ResolveOptions {
        allow_prerelease: opts.allow_prerelease,
        ..Default::default()
    };
    let resolution = run_resolution(&ctx, &options).await?;

    let tops: Vec<PackageName> = ctx.roots.iter().map(|r| r.name.clone()).collect();
    print!("{}", resolution.graph.print_tree(&tops, None));

    if opts.verbose {
        for pkg in resolution.packages.values() {
            for digest in &pkg.hashes {
                eprintln!("  {}=={} {digest}", pkg.name, pkg.version);
            }
        }
    }

    Ok(())
}
