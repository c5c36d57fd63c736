//! Delete command

use crate::ops::Context;
use anyhow::Result;

/// Delete `path`; a missing path is reported, not an error.
pub async fn delete(ctx: &Context, repository: &str, path: &str, force: bool) -> Result<()> {
    let target = ctx.path(repository, path)?;
    if ctx.service.delete(&target, force).await? {
        println!("Deleted {target}");
    } else {
        println!("Nothing to delete at {target}");
    }
    Ok(())
}
