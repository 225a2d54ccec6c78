//! Handler for `pyrite lock`.

use miette::Result;

use pyrite_ops::ops_lock::{self, LockOptions};

pub async fn exec(pre: bool, refresh: bool, verbose: bool) -> Result<()> {
    let project_root = super::project_root()?;
    let opts = LockOptions {
        allow_prerelease: pre,
        refresh,
        verbose,
    };
    ops_lock::lock(&project_root, &opts).await
}
