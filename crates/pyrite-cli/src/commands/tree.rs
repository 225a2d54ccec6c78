//! Handler for `pyrite tree`.

use miette::Result;

use pyrite_ops::ops_tree::{self, TreeOptions};

pub async fn exec(depth: Option<u32>, why: Option<String>) -> Result<()> {
    let project_root = super::project_root()?;
    let opts = TreeOptions {
        depth: depth.map(|d| d as usize),
        why,
    };
    ops_tree::tree(&project_root, &opts).await
}
