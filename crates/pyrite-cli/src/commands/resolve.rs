//! Handler for `pyrite resolve`.

use miette::Result;

use pyrite_ops::ops_resolve::{self, ResolveCmdOptions};

pub async fn exec(pre: bool, verbose: bool) -> Result<()> {
    let project_root = super::project_root()?;
    let opts = ResolveCmdOptions {
        allow_prerelease: pre,
        verbose,
    };
    ops_resolve::resolve_preview(&project_root, &opts).await
}
