//! Version ordering and snapshot-version parsing.
//!
//! Versions are compared component-wise rather than as strings, so that
//! `1.10` sorts after `1.9` and `1.0-beta` sorts before `1.0`.

use chrono::NaiveDateTime;
use std::cmp::Ordering;

/// Qualifier that marks a mutable, pre-release version.
pub const SNAPSHOT_QUALIFIER: &str = "SNAPSHOT";

/// `chrono` format of the `lastUpdated` metadata stamp.
pub const LAST_UPDATED_FORMAT: &str = "%Y%m%d%H%M%S";

/// `chrono` format of a snapshot build timestamp.
pub const SNAPSHOT_TIMESTAMP_FORMAT: &str = "%Y%m%d.%H%M%S";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Item {
    Int(u64),
    Qualifier(String),
}

fn push_token(current: &mut String, digits: bool, items: &mut Vec<Item>) {
    if current.is_empty() {
        return;
    }
    let item = if digits {
        // Overlong numeric segments fall back to qualifier ordering.
        current
            .parse::<u64>()
            .map_or_else(|_| Item::Qualifier(current.clone()), Item::Int)
    } else {
        Item::Qualifier(current.to_ascii_lowercase())
    };
    items.push(item);
    current.clear();
}

fn tokenize(version: &str) -> Vec<Item> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut digits = false;

    for c in version.chars() {
        if c == '.' || c == '-' || c == '_' {
            push_token(&mut current, digits, &mut items);
            continue;
        }
        let is_digit = c.is_ascii_digit();
        if !current.is_empty() && is_digit != digits {
            push_token(&mut current, digits, &mut items);
        }
        digits = is_digit;
        current.push(c);
    }
    push_token(&mut current, digits, &mut items);

    // `1.0.0` and `1` are the same version.
    while matches!(items.last(), Some(Item::Int(0))) {
        items.pop();
    }
    items
}

fn canonical_qualifier(q: &str) -> &str {
    match q {
        "a" => "alpha",
        "b" => "beta",
        "m" => "milestone",
        "cr" => "rc",
        "ga" | "final" | "release" => "",
        other => other,
    }
}

fn qualifier_rank(q: &str) -> u8 {
    match q {
        "alpha" => 0,
        "beta" => 1,
        "milestone" => 2,
        "rc" => 3,
        "snapshot" => 4,
        "" => 5,
        "sp" => 6,
        _ => 7,
    }
}

fn compare_qualifiers(a: &str, b: &str) -> Ordering {
    let a = canonical_qualifier(a);
    let b = canonical_qualifier(b);
    qualifier_rank(a)
        .cmp(&qualifier_rank(b))
        .then_with(|| a.cmp(b))
}

fn compare_items(a: Option<&Item>, b: Option<&Item>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (Some(Item::Int(x)), Some(Item::Int(y))) => x.cmp(y),
        (Some(Item::Int(_)), Some(Item::Qualifier(_))) => Ordering::Greater,
        (Some(Item::Qualifier(_)), Some(Item::Int(_))) => Ordering::Less,
        (Some(Item::Qualifier(x)), Some(Item::Qualifier(y))) => compare_qualifiers(x, y),
        (Some(Item::Int(x)), None) => x.cmp(&0),
        (None, Some(Item::Int(y))) => 0.cmp(y),
        (Some(Item::Qualifier(x)), None) => compare_qualifiers(x, ""),
        (None, Some(Item::Qualifier(y))) => compare_qualifiers("", y),
    }
}

/// Compare two version strings.
///
/// Numeric segments compare numerically, known qualifiers compare by
/// maturity (`alpha < beta < milestone < rc < snapshot < release < sp`),
/// and unknown qualifiers sort after known ones, lexicographically.
///
/// ```
/// use depot_schema::version::compare_versions;
/// use std::cmp::Ordering;
///
/// assert_eq!(compare_versions("1.10", "1.9"), Ordering::Greater);
/// assert_eq!(compare_versions("1.0", "1.0.0"), Ordering::Equal);
/// assert_eq!(compare_versions("1.0-beta", "1.0"), Ordering::Less);
/// ```
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left = tokenize(a);
    let right = tokenize(b);
    let len = left.len().max(right.len());
    for i in 0..len {
        let ord = compare_items(left.get(i), right.get(i));
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Returns true for `-SNAPSHOT` versions and timestamped snapshot builds.
pub fn is_snapshot(version: &str) -> bool {
    version.ends_with(&format!("-{SNAPSHOT_QUALIFIER}")) || SnapshotBuild::parse(version).is_some()
}

/// Returns true for versions that are neither snapshots nor timestamped builds.
pub fn is_release(version: &str) -> bool {
    !is_snapshot(version)
}

/// One timestamped build of a snapshot version, e.g. `1.0-20240105.101500-3`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotBuild {
    /// Version prefix without the `-SNAPSHOT` qualifier (e.g. `1.0`).
    pub prefix: String,
    /// Build timestamp in `yyyyMMdd.HHmmss` form.
    pub timestamp: String,
    /// Monotonic build number.
    pub build_number: u32,
}

impl SnapshotBuild {
    /// Parse a timestamped snapshot version.
    ///
    /// Returns `None` when `version` is not of the form
    /// `<prefix>-<yyyyMMdd.HHmmss>-<build>`.
    pub fn parse(version: &str) -> Option<Self> {
        let (rest, build) = version.rsplit_once('-')?;
        let build_number = build.parse::<u32>().ok()?;
        let (prefix, timestamp) = rest.rsplit_once('-')?;
        if prefix.is_empty() || !is_build_timestamp(timestamp) {
            return None;
        }
        Some(Self {
            prefix: prefix.to_string(),
            timestamp: timestamp.to_string(),
            build_number,
        })
    }

    /// The `-SNAPSHOT` base version this build belongs to.
    pub fn base_version(&self) -> String {
        format!("{}-{SNAPSHOT_QUALIFIER}", self.prefix)
    }

    /// The timestamped version string.
    pub fn version(&self) -> String {
        format!("{}-{}-{}", self.prefix, self.timestamp, self.build_number)
    }

    /// Build timestamp as a calendar value.
    pub fn datetime(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.timestamp, SNAPSHOT_TIMESTAMP_FORMAT).ok()
    }
}

impl std::fmt::Display for SnapshotBuild {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.version())
    }
}

/// Ordering of snapshot builds: by build number, then by timestamp.
pub fn compare_snapshot_builds(a: &SnapshotBuild, b: &SnapshotBuild) -> Ordering {
    a.build_number
        .cmp(&b.build_number)
        .then_with(|| a.timestamp.cmp(&b.timestamp))
}

fn is_build_timestamp(s: &str) -> bool {
    let Some((date, time)) = s.split_once('.') else {
        return false;
    };
    date.len() == 8
        && time.len() == 6
        && date.chars().all(|c| c.is_ascii_digit())
        && time.chars().all(|c| c.is_ascii_digit())
}

/// Map a version string to the base version it is stored under.
///
/// Timestamped builds map to their `-SNAPSHOT` base; everything else is
/// returned unchanged.
pub fn base_version(version: &str) -> String {
    SnapshotBuild::parse(version).map_or_else(|| version.to_string(), |b| b.base_version())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_segments_compare_numerically() {
        assert_eq!(compare_versions("1.10", "1.9"), Ordering::Greater);
        assert_eq!(compare_versions("2.0", "10.0"), Ordering::Less);
        assert_eq!(compare_versions("1.0.1", "1.0"), Ordering::Greater);
    }

    #[test]
    fn qualifiers_sort_before_release() {
        let mut versions = vec![
            "1.0", "1.0-rc1", "1.0-alpha", "1.0-SNAPSHOT", "1.0-beta-2", "1.0-sp1", "0.9",
        ];
        versions.sort_by(|a, b| compare_versions(a, b));
        assert_eq!(
            versions,
            vec![
                "0.9", "1.0-alpha", "1.0-beta-2", "1.0-rc1", "1.0-SNAPSHOT", "1.0", "1.0-sp1"
            ]
        );
    }

    #[test]
    fn trailing_zeros_are_equal() {
        assert_eq!(compare_versions("1", "1.0.0"), Ordering::Equal);
        assert_eq!(compare_versions("1.0-final", "1.0"), Ordering::Equal);
    }

    #[test]
    fn parses_timestamped_builds() {
        let build = SnapshotBuild::parse("1.2-20240105.101500-3").unwrap();
        assert_eq!(build.prefix, "1.2");
        assert_eq!(build.timestamp, "20240105.101500");
        assert_eq!(build.build_number, 3);
        assert_eq!(build.base_version(), "1.2-SNAPSHOT");
        assert_eq!(build.version(), "1.2-20240105.101500-3");
        assert!(build.datetime().is_some());

        assert!(SnapshotBuild::parse("1.2-SNAPSHOT").is_none());
        assert!(SnapshotBuild::parse("1.2-beta-3").is_none());
        assert!(SnapshotBuild::parse("-20240105.101500-3").is_none());
    }

    #[test]
    fn snapshot_detection() {
        assert!(is_snapshot("1.0-SNAPSHOT"));
        assert!(is_snapshot("1.0-20240105.101500-1"));
        assert!(is_release("1.0"));
        assert_eq!(base_version("1.0-20240105.101500-1"), "1.0-SNAPSHOT");
        assert_eq!(base_version("1.0"), "1.0");
    }

    #[test]
    fn snapshot_builds_order_by_build_number() {
        let a = SnapshotBuild::parse("1.0-20240105.101500-9").unwrap();
        let b = SnapshotBuild::parse("1.0-20240101.101500-10").unwrap();
        assert_eq!(compare_snapshot_builds(&a, &b), Ordering::Less);
    }
}
