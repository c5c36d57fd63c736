//! Command context.
//!
//! Loads `depot.toml` once and builds the [`ArtifactManagementService`] every
//! command runs against.

use anyhow::{Context as _, Result, bail};
use depot_core::{ArtifactManagementService, DepotConfig, config_path, try_depot_home};
use depot_core::vfs::VirtualPath;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Groups the service and the storage commands address.
pub struct Context {
    pub service: ArtifactManagementService,
    pub storage: String,
    pub home: PathBuf,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("storage", &self.storage)
            .field("home", &self.home)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Load configuration from `config`, or from `$DEPOT_HOME/depot.toml`.
    ///
    /// A missing default file yields an empty configuration; a missing
    /// explicit file is an error.
    pub fn load(config: Option<&Path>, storage: &str) -> Result<Self> {
        let Some(home) = try_depot_home() else {
            bail!("Cannot determine depot home; set DEPOT_HOME");
        };
        let loaded = match config {
            Some(path) => DepotConfig::load(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => {
                let path = config_path(&home);
                if path.exists() {
                    DepotConfig::load(&path)
                        .with_context(|| format!("Failed to load {}", path.display()))?
                } else {
                    debug!(path = %path.display(), "No configuration file, starting empty");
                    DepotConfig::default()
                }
            }
        };
        Ok(Self {
            service: ArtifactManagementService::from_config(loaded, &home),
            storage: storage.to_string(),
            home,
        })
    }

    /// A path in `repository` of the selected storage.
    pub fn path(&self, repository: &str, relative: &str) -> Result<VirtualPath> {
        self.service
            .path(&self.storage, repository, relative)
            .with_context(|| format!("Invalid path '{relative}' in {}:{repository}", self.storage))
    }
}
