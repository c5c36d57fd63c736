//! Store command

use crate::ops::Context;
use anyhow::{Context as _, Result};
use std::path::Path;
use tokio_util::io::ReaderStream;

/// Upload `file` to `path` in a hosted repository and print its digests.
pub async fn store(ctx: &Context, repository: &str, path: &str, file: &Path) -> Result<()> {
    let target = ctx.path(repository, path)?;
    let source = tokio::fs::File::open(file)
        .await
        .with_context(|| format!("Failed to open {}", file.display()))?;
    let digests = ctx
        .service
        .store(&target, Box::pin(ReaderStream::new(source)))
        .await?;

    println!("Stored {target}");
    for (algorithm, checksum) in &digests {
        println!("  {algorithm:<7} {checksum}");
    }
    Ok(())
}
