//! Command dispatch and handler modules.

mod lock;
mod resolve;
mod tree;

use miette::Result;

use crate::cli::{Cli, Command};

/// Route a parsed CLI invocation to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Lock { pre, refresh } => lock::exec(pre, refresh, cli.verbose).await,
        Command::Resolve { pre } => resolve::exec(pre, cli.verbose).await,
        Command::Tree { depth, why } => tree::exec(depth, why).await,
    }
}

/// The project root is wherever `pyrite` was invoked; every command
/// requires a manifest there.
pub(crate) fn project_root() -> Result<std::path::PathBuf> {
    let root = std::env::current_dir().map_err(pyrite_util::errors::PyriteError::Io)?;
    if !root.join("Pyrite.toml").is_file() {
        return Err(pyrite_util::errors::PyriteError::Manifest {
            message: "No Pyrite.toml found in current directory".to_string(),
        }
        .into());
    }
    Ok(root)
}
