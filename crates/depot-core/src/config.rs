//! `depot.toml` loading and the repository registry built from it.

use crate::layout::LayoutRegistry;
use crate::paths::storage_path;
use depot_schema::{
    ChecksumAlgorithm, Repository, RepositoryKey, RepositoryStatus, RepositoryType,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

/// Errors loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// Configuration file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for the configuration schema.
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration is well-formed but inconsistent.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

fn default_checksums() -> Vec<ChecksumAlgorithm> {
    ChecksumAlgorithm::ALL.to_vec()
}

/// One `[[storages]]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage id.
    pub id: String,
    /// Base directory; defaults to `$DEPOT_HOME/storages/<id>`.
    #[serde(default)]
    pub basedir: Option<PathBuf>,
    /// Repositories of this storage.
    #[serde(default)]
    pub repositories: Vec<Repository>,
}

/// The whole `depot.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepotConfig {
    /// Digests computed for every stored artifact.
    #[serde(default = "default_checksums")]
    pub checksums: Vec<ChecksumAlgorithm>,
    /// Storages and their repositories.
    #[serde(default)]
    pub storages: Vec<StorageConfig>,
}

impl Default for DepotConfig {
    fn default() -> Self {
        Self {
            checksums: default_checksums(),
            storages: Vec::new(),
        }
    }
}

impl DepotConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(contents)?;
        for storage in &mut config.storages {
            for repository in &mut storage.repositories {
                repository.storage_id.clone_from(&storage.id);
            }
        }
        config.validate(&LayoutRegistry::new())?;
        Ok(config)
    }

    /// Check cross-references: unique ids, existing group members, remotes
    /// on proxies and known layouts.
    pub fn validate(&self, layouts: &LayoutRegistry) -> Result<(), ConfigError> {
        let mut storages = HashSet::new();
        let mut keys = HashSet::new();
        for storage in &self.storages {
            if !storages.insert(storage.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate storage '{}'", storage.id)));
            }
            for repository in &storage.repositories {
                if !keys.insert(repository.key()) {
                    return Err(ConfigError::Invalid(format!(
                        "duplicate repository '{}'",
                        repository.key()
                    )));
                }
            }
        }

        for repository in self.storages.iter().flat_map(|s| &s.repositories) {
            let key = repository.key();
            if !layouts.contains(&repository.layout) {
                return Err(ConfigError::Invalid(format!(
                    "repository '{key}' uses unknown layout '{}'",
                    repository.layout
                )));
            }
            match repository.repository_type {
                RepositoryType::Proxy if repository.remote.is_none() => {
                    return Err(ConfigError::Invalid(format!(
                        "proxy repository '{key}' has no [remote] section"
                    )));
                }
                RepositoryType::Group => {
                    for member in repository.member_keys() {
                        if member == key {
                            return Err(ConfigError::Invalid(format!(
                                "group '{key}' lists itself as a member"
                            )));
                        }
                        if !keys.contains(&member) {
                            return Err(ConfigError::Invalid(format!(
                                "group '{key}' references unknown repository '{member}'"
                            )));
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Build the runtime registry, resolving storage base directories
    /// against `home`.
    pub fn into_registry(self, home: &Path) -> RepositoryRegistry {
        let registry = RepositoryRegistry::new();
        for storage in self.storages {
            let basedir = storage
                .basedir
                .unwrap_or_else(|| storage_path(home, &storage.id));
            registry.add_storage(&storage.id, basedir);
            for repository in storage.repositories {
                registry.insert(repository);
            }
        }
        registry
    }
}

/// Read-mostly view of every configured repository.
#[derive(Debug, Default)]
pub struct RepositoryRegistry {
    repositories: RwLock<BTreeMap<RepositoryKey, Arc<Repository>>>,
    storages: RwLock<HashMap<String, PathBuf>>,
}

impl RepositoryRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a storage base directory.
    pub fn add_storage(&self, storage_id: &str, basedir: PathBuf) {
        self.storages
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(storage_id.to_string(), basedir);
    }

    /// Add or replace a repository.
    pub fn insert(&self, repository: Repository) -> Arc<Repository> {
        let repository = Arc::new(repository);
        self.repositories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(repository.key(), Arc::clone(&repository));
        repository
    }

    /// Remove a repository.
    pub fn remove(&self, key: &RepositoryKey) -> Option<Arc<Repository>> {
        self.repositories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    /// Look up a repository.
    pub fn get(&self, key: &RepositoryKey) -> Option<Arc<Repository>> {
        self.repositories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Every repository, ordered by key.
    pub fn repositories(&self) -> Vec<Arc<Repository>> {
        self.repositories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Take a repository in or out of service. Returns false if unknown.
    pub fn set_status(&self, key: &RepositoryKey, status: RepositoryStatus) -> bool {
        let mut repositories = self
            .repositories
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(current) = repositories.get_mut(key) else {
            return false;
        };
        let mut updated = Repository::clone(current);
        updated.status = status;
        *current = Arc::new(updated);
        true
    }

    /// Root directory of a repository: its explicit `basedir`, else
    /// `<storage basedir>/<repository id>`.
    pub fn root(&self, repository: &Repository) -> PathBuf {
        if let Some(basedir) = &repository.basedir {
            return basedir.clone();
        }
        let storages = self.storages.read().unwrap_or_else(PoisonError::into_inner);
        let storage = storages
            .get(&repository.storage_id)
            .cloned()
            .unwrap_or_else(|| PathBuf::from(&repository.storage_id));
        storage.join(&repository.id)
    }
}
