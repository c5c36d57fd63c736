//! Repository configuration model.
//!
//! These types are deserialized from `depot.toml` and are read-mostly at
//! request time; the only runtime mutation is the service status toggle.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Separator between storage and repository ids in a [`RepositoryKey`].
pub const KEY_SEPARATOR: char = ':';

/// Process-wide identity of a repository: `(storageId, repositoryId)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RepositoryKey {
    /// Id of the storage the repository belongs to.
    pub storage_id: String,
    /// Id of the repository within its storage.
    pub repository_id: String,
}

impl RepositoryKey {
    /// Create a key from its two components.
    pub fn new(storage_id: impl Into<String>, repository_id: impl Into<String>) -> Self {
        Self {
            storage_id: storage_id.into(),
            repository_id: repository_id.into(),
        }
    }

    /// Parse a `storage:repository` reference.
    ///
    /// A bare `repository` reference resolves against `default_storage`.
    ///
    /// ```
    /// use depot_schema::RepositoryKey;
    ///
    /// let key = RepositoryKey::parse("releases", "storage0");
    /// assert_eq!(key, RepositoryKey::new("storage0", "releases"));
    /// let key = RepositoryKey::parse("other:central", "storage0");
    /// assert_eq!(key.to_string(), "other:central");
    /// ```
    pub fn parse(reference: &str, default_storage: &str) -> Self {
        match reference.split_once(KEY_SEPARATOR) {
            Some((storage, repository)) => Self::new(storage, repository),
            None => Self::new(default_storage, reference),
        }
    }
}

impl std::fmt::Display for RepositoryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{KEY_SEPARATOR}{}", self.storage_id, self.repository_id)
    }
}

/// How a repository answers requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryType {
    /// Artifacts are authoritatively stored locally.
    Hosted,
    /// Artifacts are fetched from a remote and cached locally.
    Proxy,
    /// An ordered aggregation of other repositories.
    Group,
}

impl std::fmt::Display for RepositoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Hosted => "hosted",
            Self::Proxy => "proxy",
            Self::Group => "group",
        })
    }
}

/// Which kinds of versions a repository holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryPolicy {
    /// Immutable release versions only.
    #[default]
    Release,
    /// Mutable snapshot versions with timestamped builds.
    Snapshot,
    /// Both releases and snapshots.
    Mixed,
}

impl RepositoryPolicy {
    /// Returns true if a version of this kind may be stored under the policy.
    pub fn accepts(self, version: &str) -> bool {
        match self {
            Self::Release => crate::version::is_release(version),
            Self::Snapshot => crate::version::is_snapshot(version),
            Self::Mixed => true,
        }
    }
}

impl std::fmt::Display for RepositoryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Release => "release",
            Self::Snapshot => "snapshot",
            Self::Mixed => "mixed",
        })
    }
}

/// Whether a repository currently answers requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepositoryStatus {
    /// Serving requests.
    #[default]
    InService,
    /// Temporarily withdrawn; skipped by groups.
    OutOfService,
}

/// How a proxy decides that cached metadata is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum MetadataExpiration {
    /// Cached metadata older than `seconds` is refetched.
    Interval {
        /// Maximum age of cached metadata.
        seconds: u64,
    },
    /// Cached metadata is refetched when the remote checksum differs.
    Checksum,
}

impl Default for MetadataExpiration {
    fn default() -> Self {
        Self::Interval { seconds: 600 }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

/// Upstream endpoint of a proxy repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRepository {
    /// Base URL artifacts are fetched relative to.
    pub url: String,
    /// Per-request deadline for remote fetches.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Staleness policy for cached metadata.
    #[serde(default)]
    pub metadata_expiration: MetadataExpiration,
}

impl RemoteRepository {
    /// Create a remote with default timeout and expiration policy.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout_secs: default_timeout_secs(),
            metadata_expiration: MetadataExpiration::default(),
        }
    }
}

/// Effect of a matching routing rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingRuleType {
    /// Only the named members may answer matching paths.
    Accept,
    /// The named members never answer matching paths.
    Deny,
}

/// A pattern-based filter on which group members may answer a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRule {
    /// Glob over the repository-relative path, e.g. `com/blocked/**`.
    pub pattern: String,
    /// Member references (`repo`, `storage:repo`) or `*` for every member.
    #[serde(default)]
    pub repositories: Vec<String>,
    /// Accept or deny.
    #[serde(rename = "type")]
    pub rule_type: RoutingRuleType,
}

fn default_layout() -> String {
    "maven2".to_string()
}

fn default_implementation() -> String {
    "file-system".to_string()
}

/// A configured repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    /// Repository id, unique within its storage.
    pub id: String,
    /// Owning storage id; filled in from the enclosing storage on load.
    #[serde(default)]
    pub storage_id: String,
    /// Hosted, proxy or group.
    #[serde(rename = "type")]
    pub repository_type: RepositoryType,
    /// Release, snapshot or mixed.
    #[serde(default)]
    pub policy: RepositoryPolicy,
    /// Layout provider id.
    #[serde(default = "default_layout")]
    pub layout: String,
    /// Storage backend alias.
    #[serde(default = "default_implementation")]
    pub implementation: String,
    /// Explicit base directory; defaults to `<storage basedir>/<id>`.
    #[serde(default)]
    pub basedir: Option<PathBuf>,
    /// Deletes move artifacts to `.trash` instead of removing them.
    #[serde(default)]
    pub trash_enabled: bool,
    /// Forced deletes may bypass the trash.
    #[serde(default)]
    pub allows_force_deletion: bool,
    /// In or out of service.
    #[serde(default)]
    pub status: RepositoryStatus,
    /// Ordered member references, for groups.
    #[serde(default)]
    pub group_members: Vec<String>,
    /// Upstream endpoint, for proxies.
    #[serde(default)]
    pub remote: Option<RemoteRepository>,
    /// Member filters, for groups.
    #[serde(default)]
    pub routing_rules: Vec<RoutingRule>,
}

impl Repository {
    /// Create a hosted repository with default settings.
    pub fn new(
        storage_id: impl Into<String>,
        id: impl Into<String>,
        repository_type: RepositoryType,
    ) -> Self {
        Self {
            id: id.into(),
            storage_id: storage_id.into(),
            repository_type,
            policy: RepositoryPolicy::default(),
            layout: default_layout(),
            implementation: default_implementation(),
            basedir: None,
            trash_enabled: false,
            allows_force_deletion: false,
            status: RepositoryStatus::default(),
            group_members: Vec::new(),
            remote: None,
            routing_rules: Vec::new(),
        }
    }

    /// Identity of this repository.
    pub fn key(&self) -> RepositoryKey {
        RepositoryKey::new(&self.storage_id, &self.id)
    }

    /// Returns true if the repository is serving requests.
    pub fn is_in_service(&self) -> bool {
        self.status == RepositoryStatus::InService
    }

    /// Group member keys, in configured order.
    pub fn member_keys(&self) -> Vec<RepositoryKey> {
        self.group_members
            .iter()
            .map(|m| RepositoryKey::parse(m, &self.storage_id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_group_with_rules() {
        let toml = r#"
            id = "public"
            type = "group"
            group_members = ["releases", "other:central"]

            [[routing_rules]]
            pattern = "com/blocked/**"
            repositories = ["releases"]
            type = "deny"
        "#;
        let mut repo: Repository = toml::from_str(toml).unwrap();
        repo.storage_id = "storage0".to_string();

        assert_eq!(repo.repository_type, RepositoryType::Group);
        assert_eq!(repo.layout, "maven2");
        assert!(repo.is_in_service());
        assert_eq!(
            repo.member_keys(),
            vec![
                RepositoryKey::new("storage0", "releases"),
                RepositoryKey::new("other", "central"),
            ]
        );
        assert_eq!(repo.routing_rules[0].rule_type, RoutingRuleType::Deny);
    }

    #[test]
    fn deserializes_proxy_expiration() {
        let toml = r#"
            id = "central"
            type = "proxy"
            [remote]
            url = "https://repo.example.org/maven2"
            metadata_expiration = { strategy = "checksum" }
        "#;
        let repo: Repository = toml::from_str(toml).unwrap();
        let remote = repo.remote.unwrap();
        assert_eq!(remote.timeout_secs, 30);
        assert_eq!(remote.metadata_expiration, MetadataExpiration::Checksum);
    }

    #[test]
    fn policy_accepts_versions() {
        assert!(RepositoryPolicy::Release.accepts("1.0"));
        assert!(!RepositoryPolicy::Release.accepts("1.0-SNAPSHOT"));
        assert!(RepositoryPolicy::Snapshot.accepts("1.0-20240101.000000-1"));
        assert!(RepositoryPolicy::Mixed.accepts("1.0-SNAPSHOT"));
    }
}
