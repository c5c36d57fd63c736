//! List command

use crate::ops::Context;
use anyhow::Result;

/// Print the entries of `dir`, one per line.
pub async fn list(ctx: &Context, repository: &str, dir: &str) -> Result<()> {
    let entries = ctx.service.list(&ctx.storage, repository, dir).await?;
    if entries.is_empty() {
        println!("  (empty)");
        return Ok(());
    }
    for entry in entries {
        println!("{entry}");
    }
    Ok(())
}
