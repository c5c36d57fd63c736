//! Metadata maintenance: regeneration and snapshot pruning

use crate::ops::Context;
use anyhow::Result;

/// Regenerate the documents under `base` and print the version list.
pub async fn generate(ctx: &Context, repository: &str, base: &str) -> Result<()> {
    let target = ctx.path(repository, base)?;
    let doc = ctx.service.generate_metadata(&target).await?;
    println!("Generated metadata for {target}");
    for version in &doc.versioning.versions {
        println!("  {version}");
    }
    if let Some(latest) = &doc.versioning.latest {
        println!("  latest:  {latest}");
    }
    if let Some(release) = &doc.versioning.release {
        println!("  release: {release}");
    }
    Ok(())
}

/// Prune snapshot builds of `repository`.
pub async fn prune(ctx: &Context, repository: &str, keep: usize, days: u32) -> Result<()> {
    let report = ctx
        .service
        .prune_snapshots(&ctx.storage, repository, keep, days)
        .await?;
    for build in &report.removed_builds {
        println!("  removed {build}");
    }
    println!(
        "Pruned {} build(s), {} file(s) across {} snapshot version(s)",
        report.removed_builds.len(),
        report.removed_files,
        report.documents
    );
    Ok(())
}
