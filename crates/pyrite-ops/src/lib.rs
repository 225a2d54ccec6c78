//! High-level operations wiring CLI commands to the resolver and lockfile
//! subsystems.

pub mod ops_lock;
pub mod ops_resolve;
pub mod ops_tree;

use std::path::Path;

use pyrite_core::manifest::Manifest;
use pyrite_core::requirement::Requirement;
use pyrite_index::client::{self, IndexClient};
use pyrite_index::repository::build_indexes;
use pyrite_resolver::resolver::CancelToken;

/// Everything an operation needs before it can talk to the resolver.
pub struct ProjectContext {
    pub manifest: Manifest,
    pub roots: Vec<Requirement>,
    pub provider: IndexClient,
}

/// Load the manifest and assemble the index client for a project.
pub fn load_project(project_root: &Path) -> miette::Result<ProjectContext> {
    let manifest_path = project_root.join("Pyrite.toml");
    let manifest = Manifest::from_path(&manifest_path)?;
    let roots = manifest.requirements()?;

    let indexes = build_indexes(&manifest.indexes);
    let mut provider = IndexClient::new(client::build_client()?, indexes);
    for req in &roots {
        if let Some(index_name) = &req.index {
            provider.pin(req.name.clone(), index_name);
        }
    }

    Ok(ProjectContext {
        manifest,
        roots,
        provider,
    })
}

/// A cancel token flipped by Ctrl-C, so an aborted run never leaves a
/// half-written lockfile behind.
pub fn cancel_on_ctrl_c() -> CancelToken {
    let cancel = CancelToken::new();
    let handle = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });
    cancel
}
