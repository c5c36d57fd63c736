//! Artifact metadata documents.
//!
//! One document lives at each artifact-group directory (the version list)
//! and, for snapshot repositories, one at each snapshot-version directory
//! (the build list). Documents are always replaced wholesale.

use serde::{Deserialize, Serialize};

/// A metadata document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Group coordinate, when the layout has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// Artifact coordinate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_id: Option<String>,
    /// Base version, set only on version-level documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Version and build listings.
    #[serde(default)]
    pub versioning: Versioning,
}

impl Metadata {
    /// Returns true for snapshot-version documents.
    pub fn is_version_level(&self) -> bool {
        self.version.is_some()
    }
}

/// Version listing, pointers and snapshot builds.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Versioning {
    /// Highest known version of any kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest: Option<String>,
    /// Highest known release version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
    /// De-duplicated versions, in layout order.
    #[serde(default)]
    pub versions: Vec<String>,
    /// Most recent build, on version-level documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Snapshot>,
    /// Every file of every retained build, on version-level documents.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub snapshot_versions: Vec<SnapshotVersion>,
    /// Write stamp, `yyyyMMddHHmmss` in UTC.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

/// The latest build of a snapshot version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Build timestamp, `yyyyMMdd.HHmmss`.
    pub timestamp: String,
    /// Build number.
    pub build_number: u32,
}

/// One file of one snapshot build.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotVersion {
    /// Classifier, if the file has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier: Option<String>,
    /// File extension (e.g. `jar`).
    pub extension: String,
    /// Timestamped version string.
    pub value: String,
    /// Build timestamp without the dot, `yyyyMMddHHmmss`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_camel_case_and_skips_empty() {
        let doc = Metadata {
            group_id: Some("org.example".into()),
            artifact_id: Some("lib".into()),
            version: None,
            versioning: Versioning {
                latest: Some("1.1".into()),
                release: Some("1.1".into()),
                versions: vec!["1.0".into(), "1.1".into()],
                last_updated: Some("20240101000000".into()),
                ..Versioning::default()
            },
        };
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["groupId"], "org.example");
        assert_eq!(json["versioning"]["lastUpdated"], "20240101000000");
        assert!(json["versioning"].get("snapshotVersions").is_none());
        assert!(!doc.is_version_level());

        let back: Metadata = serde_json::from_value(json).unwrap();
        assert_eq!(back, doc);
    }
}
