//! Resolve command

use crate::ops::Context;
use anyhow::{Result, bail};
use futures::StreamExt;
use std::io::Write;
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Fetch `path` through `repository` and write it to `output` or stdout.
pub async fn resolve(
    ctx: &Context,
    repository: &str,
    path: &str,
    output: Option<&Path>,
) -> Result<()> {
    let Some(artifact) = ctx.service.resolve(&ctx.storage, repository, path).await? else {
        bail!("{path} not found in {}:{repository}", ctx.storage);
    };
    let mut stream = artifact.open().await?;

    match output {
        Some(target) => {
            let mut file = tokio::fs::File::create(target).await?;
            while let Some(chunk) = stream.next().await {
                file.write_all(&chunk?).await?;
            }
            file.flush().await?;
            eprintln!("Wrote {} bytes to {}", artifact.size(), target.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            while let Some(chunk) = stream.next().await {
                stdout.write_all(&chunk?)?;
            }
            stdout.flush()?;
        }
    }
    Ok(())
}
