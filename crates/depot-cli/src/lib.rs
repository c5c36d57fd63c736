//! depot - artifact repository manager
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Operator front end to the depot core: resolve artifacts through hosted,
//! proxy and group repositories, upload into hosted repositories, and run
//! the trash, metadata and retention maintenance jobs.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.depot/
//! ├── depot.toml            # Storages and repositories
//! └── storages/<storage>/   # Default storage base directories
//!     └── <repository>/
//!         ├── .trash/       # Soft-deleted files
//!         └── .temp/        # In-flight uploads
//! ```

pub mod cmd;
pub mod ops;

pub use depot_core::paths::*;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "depot")]
#[command(author, version, about = "depot - artifact repository manager")]
pub struct Cli {
    /// Configuration file (defaults to $DEPOT_HOME/depot.toml)
    #[arg(long, global = true, env = "DEPOT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Storage the repository arguments refer to
    #[arg(long, global = true, env = "DEPOT_STORAGE", default_value = "storage0")]
    pub storage: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Fetch an artifact through a repository
    Resolve {
        /// Repository id
        repository: String,
        /// Path inside the repository
        path: String,
        /// Write the artifact here instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
    /// Upload a file into a hosted repository
    Store {
        /// Repository id
        repository: String,
        /// Destination path inside the repository
        path: String,
        /// Local file to upload
        file: PathBuf,
    },
    /// Delete a file or directory (to trash when enabled)
    Delete {
        /// Repository id
        repository: String,
        /// Path inside the repository
        path: String,
        /// Bypass the trash and drop any trash entry
        #[arg(long, short = 'f')]
        force: bool,
    },
    /// Restore a path from trash, or the whole trash
    Restore {
        /// Repository id
        repository: String,
        /// Path inside the repository (all trash entries if omitted)
        path: Option<String>,
    },
    /// Permanently remove a repository's trash
    #[command(name = "empty-trash")]
    EmptyTrash {
        /// Repository id
        repository: String,
    },
    /// Regenerate metadata documents from the files on disk
    #[command(name = "generate-metadata")]
    GenerateMetadata {
        /// Repository id
        repository: String,
        /// Artifact-group base path, e.g. org/example/lib
        base: String,
    },
    /// Remove old snapshot builds
    Prune {
        /// Repository id
        repository: String,
        /// Builds to keep per snapshot version (0 to use --days)
        #[arg(long, default_value_t = 0)]
        keep: usize,
        /// Keep builds newer than this many days
        #[arg(long, default_value_t = 0)]
        days: u32,
    },
    /// List a directory (member union for groups)
    List {
        /// Repository id
        repository: String,
        /// Directory inside the repository
        #[arg(default_value = "")]
        dir: String,
    },
    /// Show configured repositories
    Repositories,
}
