//! Checksum algorithms, hex digests and the per-write digest map.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Digest algorithms computed for every stored artifact.
///
/// The declaration order is the order companion files are written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChecksumAlgorithm {
    /// MD5, kept for legacy build-tool clients.
    Md5,
    /// SHA-1, the default checksum most layouts verify.
    Sha1,
    /// SHA-256.
    Sha256,
    /// SHA-512.
    Sha512,
}

impl ChecksumAlgorithm {
    /// Every supported algorithm.
    pub const ALL: [Self; 4] = [Self::Md5, Self::Sha1, Self::Sha256, Self::Sha512];

    /// Canonical algorithm name (e.g. `SHA-1`).
    pub fn name(self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Sha1 => "SHA-1",
            Self::Sha256 => "SHA-256",
            Self::Sha512 => "SHA-512",
        }
    }

    /// File extension of the companion checksum file, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    /// Length of the hex-encoded digest.
    pub fn hex_len(self) -> usize {
        match self {
            Self::Md5 => 32,
            Self::Sha1 => 40,
            Self::Sha256 => 64,
            Self::Sha512 => 128,
        }
    }

    /// Look up an algorithm by its companion file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|a| a.extension().eq_ignore_ascii_case(ext))
    }

    /// Detect a checksum companion by its file name (e.g. `foo.jar.sha1`).
    pub fn from_file_name(name: &str) -> Option<Self> {
        let (_, ext) = name.rsplit_once('.')?;
        Self::from_extension(ext)
    }

    /// Name of the companion file for `file_name`.
    pub fn companion_name(self, file_name: &str) -> String {
        format!("{file_name}.{}", self.extension())
    }
}

impl std::fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Mapping from algorithm to lowercase-hex digest, produced by one write.
pub type DigestMap = BTreeMap<ChecksumAlgorithm, Checksum>;

/// A lowercase hex digest string.
///
/// Validated on construction: only ASCII hex digits, normalized to lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checksum(String);

/// Errors produced when parsing a checksum.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ChecksumError {
    /// The checksum file was empty.
    #[error("Empty checksum")]
    Empty,

    /// The value contains characters outside `[0-9a-fA-F]`.
    #[error("Invalid checksum: non-hex characters in '{0}'")]
    NotHex(String),

    /// The digest length does not match the algorithm.
    #[error("Invalid {algorithm} checksum: expected {expected} hex chars, got {actual}")]
    Length {
        /// Algorithm the value was checked against.
        algorithm: ChecksumAlgorithm,
        /// Expected hex length.
        expected: usize,
        /// Actual hex length.
        actual: usize,
    },
}

impl Checksum {
    /// Encode raw digest bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(bytes))
    }

    /// Parse a hex digest, normalizing to lowercase.
    pub fn parse(s: &str) -> Result<Self, ChecksumError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ChecksumError::Empty);
        }
        if !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ChecksumError::NotHex(s.to_string()));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    /// Parse the contents of a companion checksum file.
    ///
    /// Accepts both the bare form (`<hex>`) and the `sha1sum` form
    /// (`<hex>  <file name>`); only the first token is read.
    pub fn parse_file(contents: &str, algorithm: ChecksumAlgorithm) -> Result<Self, ChecksumError> {
        let token = contents
            .split_whitespace()
            .next()
            .ok_or(ChecksumError::Empty)?;
        let checksum = Self::parse(token)?;
        if checksum.0.len() != algorithm.hex_len() {
            return Err(ChecksumError::Length {
                algorithm,
                expected: algorithm.hex_len(),
                actual: checksum.0.len(),
            });
        }
        Ok(checksum)
    }

    /// Return the hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Checksum {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_companion_files() {
        assert_eq!(
            ChecksumAlgorithm::from_file_name("foo-1.0.jar.sha1"),
            Some(ChecksumAlgorithm::Sha1)
        );
        assert_eq!(
            ChecksumAlgorithm::from_file_name("foo-1.0.jar.MD5"),
            Some(ChecksumAlgorithm::Md5)
        );
        assert_eq!(ChecksumAlgorithm::from_file_name("foo-1.0.jar"), None);
        assert_eq!(ChecksumAlgorithm::from_file_name("README"), None);
    }

    #[test]
    fn parses_sha1sum_style_files() {
        let contents = "DA39A3EE5E6B4B0D3255BFEF95601890AFD80709  foo.jar\n";
        let checksum = Checksum::parse_file(contents, ChecksumAlgorithm::Sha1).unwrap();
        assert_eq!(checksum.as_str(), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[test]
    fn rejects_wrong_length() {
        let err = Checksum::parse_file("abcd", ChecksumAlgorithm::Sha256).unwrap_err();
        assert!(matches!(err, ChecksumError::Length { actual: 4, .. }));
        assert_eq!(
            Checksum::parse_file("  \n", ChecksumAlgorithm::Md5),
            Err(ChecksumError::Empty)
        );
        assert!(matches!(
            Checksum::parse("xyz"),
            Err(ChecksumError::NotHex(_))
        ));
    }

    #[test]
    fn digest_map_serializes_with_algorithm_keys() {
        let mut map = DigestMap::new();
        map.insert(ChecksumAlgorithm::Sha1, Checksum::parse("00ff").unwrap());
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"sha1":"00ff"}"#);
    }
}
