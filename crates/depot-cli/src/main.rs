//! depot - artifact repository manager CLI

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use depot_cli::cmd;
use depot_cli::ops::Context;
use depot_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let ctx = Context::load(cli.config.as_deref(), &cli.storage)?;

    match cli.command {
        Commands::Resolve {
            repository,
            path,
            output,
        } => cmd::resolve::resolve(&ctx, &repository, &path, output.as_deref()).await,
        Commands::Store {
            repository,
            path,
            file,
        } => cmd::store::store(&ctx, &repository, &path, &file).await,
        Commands::Delete {
            repository,
            path,
            force,
        } => cmd::delete::delete(&ctx, &repository, &path, force).await,
        Commands::Restore { repository, path } => {
            cmd::trash::restore(&ctx, &repository, path.as_deref()).await
        }
        Commands::EmptyTrash { repository } => cmd::trash::empty(&ctx, &repository).await,
        Commands::GenerateMetadata { repository, base } => {
            cmd::metadata::generate(&ctx, &repository, &base).await
        }
        Commands::Prune {
            repository,
            keep,
            days,
        } => cmd::metadata::prune(&ctx, &repository, keep, days).await,
        Commands::List { repository, dir } => cmd::list::list(&ctx, &repository, &dir).await,
        Commands::Repositories => {
            cmd::repositories::repositories(&ctx);
            Ok(())
        }
    }
}
