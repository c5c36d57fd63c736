//! Layout providers: how coordinates map to paths and how versions order.
//!
//! The core calls a [`LayoutProvider`] to compare versions, to recognize
//! metadata and checksum files, and to split an artifact path into its
//! artifact-group base path, version directory and file version.

mod maven;

pub use maven::{MAVEN2_LAYOUT, Maven2Layout};

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

/// Coordinates extracted from an artifact path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactCoordinates {
    /// Group segments, `/`-joined (e.g. `org/example`).
    pub group_path: String,
    /// Artifact name.
    pub artifact_id: String,
    /// Version directory (a `-SNAPSHOT` base for snapshot builds).
    pub version: String,
    /// Version as it appears in the file name; a timestamped build for
    /// deployed snapshots.
    pub file_version: String,
    /// Optional classifier.
    pub classifier: Option<String>,
    /// Extension after the version and classifier, e.g. `jar` or `jar.sha1`.
    pub extension: String,
}

impl ArtifactCoordinates {
    /// Artifact-group base path: `<group>/<artifact>`.
    pub fn base_path(&self) -> String {
        if self.group_path.is_empty() {
            self.artifact_id.clone()
        } else {
            format!("{}/{}", self.group_path, self.artifact_id)
        }
    }

    /// Version directory: `<group>/<artifact>/<version>`.
    pub fn version_path(&self) -> String {
        format!("{}/{}", self.base_path(), self.version)
    }

    /// Dotted group id.
    pub fn group_id(&self) -> String {
        self.group_path.replace('/', ".")
    }
}

/// A pluggable path and version scheme.
pub trait LayoutProvider: Send + Sync + std::fmt::Debug {
    /// Identifier referenced by `Repository::layout`.
    fn id(&self) -> &str;

    /// Total order over version strings.
    fn compare_versions(&self, a: &str, b: &str) -> Ordering;

    /// File name of metadata documents.
    fn metadata_file_name(&self) -> &str;

    /// Returns true for snapshot (mutable) versions.
    fn is_snapshot_version(&self, version: &str) -> bool;

    /// Split an artifact file path into coordinates.
    fn parse_artifact_path(&self, relative: &str) -> Option<ArtifactCoordinates>;

    /// Inverse of [`Self::parse_artifact_path`].
    fn artifact_path(&self, coordinates: &ArtifactCoordinates) -> String;

    /// Group and artifact ids of an artifact-group base path.
    fn base_coordinates(&self, base_path: &str) -> (Option<String>, Option<String>);

    /// Returns true if `relative` names a metadata document.
    fn is_metadata(&self, relative: &str) -> bool {
        file_name(relative) == self.metadata_file_name()
    }

    /// Returns true if `relative` names a checksum of a metadata document.
    fn is_metadata_checksum(&self, relative: &str) -> bool {
        checksum_subject(relative).is_some_and(|subject| self.is_metadata(subject))
    }

    /// Returns true if `relative` names a checksum companion file.
    fn is_checksum(&self, relative: &str) -> bool {
        checksum_subject(relative).is_some()
    }

    /// Path of the metadata document describing the directory `dir`.
    fn metadata_path(&self, dir: &str) -> String {
        if dir.is_empty() {
            self.metadata_file_name().to_string()
        } else {
            format!("{dir}/{}", self.metadata_file_name())
        }
    }
}

fn file_name(relative: &str) -> &str {
    relative.rsplit('/').next().unwrap_or(relative)
}

/// For `a/b.jar.sha1` returns `a/b.jar`.
pub fn checksum_subject(relative: &str) -> Option<&str> {
    let (subject, ext) = relative.rsplit_once('.')?;
    depot_schema::ChecksumAlgorithm::from_extension(ext).map(|_| subject)
}

/// Layouts by id.
#[derive(Debug, Clone)]
pub struct LayoutRegistry {
    layouts: HashMap<String, Arc<dyn LayoutProvider>>,
}

impl Default for LayoutRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutRegistry {
    /// Registry with the `maven2` layout.
    pub fn new() -> Self {
        let mut registry = Self {
            layouts: HashMap::new(),
        };
        registry.register(Arc::new(Maven2Layout));
        registry
    }

    /// Register a layout under its id.
    pub fn register(&mut self, layout: Arc<dyn LayoutProvider>) {
        self.layouts.insert(layout.id().to_string(), layout);
    }

    /// Layout for `id`.
    pub fn get(&self, id: &str) -> Option<Arc<dyn LayoutProvider>> {
        self.layouts.get(id).cloned()
    }

    /// Returns true if a layout is registered under `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.layouts.contains_key(id)
    }
}
