use super::{ArtifactCoordinates, LayoutProvider};
use depot_schema::SnapshotBuild;
use depot_schema::version::SNAPSHOT_QUALIFIER;
use std::cmp::Ordering;

/// Id of the Maven-style layout.
pub const MAVEN2_LAYOUT: &str = "maven2";

const METADATA_FILE: &str = "maven-metadata.json";

/// `group/segments/artifact/version/artifact-version[-classifier].ext`
#[derive(Debug, Clone, Copy, Default)]
pub struct Maven2Layout;

/// Split `rest` (everything after `artifact-version`) into classifier and extension.
fn split_tail(rest: &str) -> Option<(Option<String>, String)> {
    if let Some(ext) = rest.strip_prefix('.') {
        return (!ext.is_empty()).then(|| (None, ext.to_string()));
    }
    let rest = rest.strip_prefix('-')?;
    let (classifier, ext) = rest.split_once('.')?;
    if classifier.is_empty() || ext.is_empty() {
        return None;
    }
    Some((Some(classifier.to_string()), ext.to_string()))
}

/// Find the file version of a snapshot file: either the literal
/// `-SNAPSHOT` base or a timestamped build of it.
fn snapshot_file_version<'a>(rest: &'a str, version: &str) -> Option<(String, &'a str)> {
    if let Some(tail) = rest.strip_prefix(version) {
        return Some((version.to_string(), tail));
    }
    let prefix = version.strip_suffix(&format!("-{SNAPSHOT_QUALIFIER}"))?;
    let after = rest.strip_prefix(prefix)?.strip_prefix('-')?;
    // `yyyyMMdd.HHmmss-N` followed by the classifier/extension tail.
    let stamp_len = "yyyyMMdd.HHmmss".len();
    let stamp = after.get(..stamp_len)?;
    let after_stamp = after.get(stamp_len..)?.strip_prefix('-')?;
    let digits = after_stamp
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(after_stamp.len());
    if digits == 0 {
        return None;
    }
    let candidate = format!("{prefix}-{stamp}-{}", &after_stamp[..digits]);
    SnapshotBuild::parse(&candidate)?;
    Some((candidate, &after_stamp[digits..]))
}

impl LayoutProvider for Maven2Layout {
    fn id(&self) -> &str {
        MAVEN2_LAYOUT
    }

    fn compare_versions(&self, a: &str, b: &str) -> Ordering {
        depot_schema::compare_versions(a, b)
    }

    fn metadata_file_name(&self) -> &str {
        METADATA_FILE
    }

    fn is_snapshot_version(&self, version: &str) -> bool {
        depot_schema::version::is_snapshot(version)
    }

    fn parse_artifact_path(&self, relative: &str) -> Option<ArtifactCoordinates> {
        let segments: Vec<&str> = relative.split('/').filter(|s| !s.is_empty()).collect();
        if segments.len() < 3 {
            return None;
        }
        let n = segments.len();
        let (file, version, artifact_id) = (segments[n - 1], segments[n - 2], segments[n - 3]);
        let group_path = segments[..n - 3].join("/");

        let rest = file.strip_prefix(artifact_id)?.strip_prefix('-')?;
        let (file_version, tail) = if self.is_snapshot_version(version) {
            snapshot_file_version(rest, version)?
        } else {
            (version.to_string(), rest.strip_prefix(version)?)
        };
        let (classifier, extension) = split_tail(tail)?;

        Some(ArtifactCoordinates {
            group_path,
            artifact_id: artifact_id.to_string(),
            version: version.to_string(),
            file_version,
            classifier,
            extension,
        })
    }

    fn artifact_path(&self, c: &ArtifactCoordinates) -> String {
        let classifier = c
            .classifier
            .as_deref()
            .map(|cl| format!("-{cl}"))
            .unwrap_or_default();
        format!(
            "{}/{}-{}{classifier}.{}",
            c.version_path(),
            c.artifact_id,
            c.file_version,
            c.extension
        )
    }

    fn base_coordinates(&self, base_path: &str) -> (Option<String>, Option<String>) {
        match base_path.trim_matches('/').rsplit_once('/') {
            Some((group, artifact)) => (
                Some(group.replace('/', ".")),
                Some(artifact.to_string()),
            ),
            None if base_path.is_empty() => (None, None),
            None => (None, Some(base_path.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_release_artifact() {
        let c = Maven2Layout
            .parse_artifact_path("org/example/lib/1.2/lib-1.2-sources.jar")
            .unwrap();
        assert_eq!(c.group_id(), "org.example");
        assert_eq!(c.artifact_id, "lib");
        assert_eq!(c.version, "1.2");
        assert_eq!(c.file_version, "1.2");
        assert_eq!(c.classifier.as_deref(), Some("sources"));
        assert_eq!(c.extension, "jar");
        assert_eq!(c.base_path(), "org/example/lib");
        assert_eq!(
            Maven2Layout.artifact_path(&c),
            "org/example/lib/1.2/lib-1.2-sources.jar"
        );
    }

    #[test]
    fn parses_timestamped_snapshot() {
        let c = Maven2Layout
            .parse_artifact_path("org/lib/1.0-SNAPSHOT/lib-1.0-20240105.101500-3.pom.sha1")
            .unwrap();
        assert_eq!(c.version, "1.0-SNAPSHOT");
        assert_eq!(c.file_version, "1.0-20240105.101500-3");
        assert_eq!(c.classifier, None);
        assert_eq!(c.extension, "pom.sha1");
    }

    #[test]
    fn parses_plain_snapshot_file() {
        let c = Maven2Layout
            .parse_artifact_path("org/lib/1.0-SNAPSHOT/lib-1.0-SNAPSHOT.jar")
            .unwrap();
        assert_eq!(c.file_version, "1.0-SNAPSHOT");
        assert_eq!(c.extension, "jar");
    }

    #[test]
    fn rejects_mismatched_names() {
        assert!(Maven2Layout.parse_artifact_path("org/lib/1.0/other-1.0.jar").is_none());
        assert!(Maven2Layout.parse_artifact_path("org/lib/maven-metadata.json").is_none());
        assert!(Maven2Layout.parse_artifact_path("lib-1.0.jar").is_none());
    }

    #[test]
    fn base_coordinates() {
        assert_eq!(
            Maven2Layout.base_coordinates("org/example/lib"),
            (Some("org.example".into()), Some("lib".into()))
        );
    }
}
