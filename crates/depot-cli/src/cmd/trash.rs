//! Trash commands: restore and empty

use crate::ops::Context;
use anyhow::Result;

/// Restore one path, or every trash entry when `path` is `None`.
pub async fn restore(ctx: &Context, repository: &str, path: Option<&str>) -> Result<()> {
    match path {
        Some(path) => {
            let target = ctx.path(repository, path)?;
            if ctx.service.restore(&target).await? {
                println!("Restored {target}");
            } else {
                println!("Nothing in trash for {target}");
            }
        }
        None => {
            let restored = ctx.service.restore_all(&ctx.storage, repository).await?;
            println!("Restored {restored} file(s) in {}:{repository}", ctx.storage);
        }
    }
    Ok(())
}

/// Remove the whole trash of `repository`.
pub async fn empty(ctx: &Context, repository: &str) -> Result<()> {
    if ctx.service.empty_trash(&ctx.storage, repository).await? {
        println!("Emptied trash of {}:{repository}", ctx.storage);
    } else {
        println!("Trash of {}:{repository} is already empty", ctx.storage);
    }
    Ok(())
}
