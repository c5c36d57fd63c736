//! Streaming multi-digest computation and checksum companion files.

use crate::storage::StorageError;
use crate::vfs::{PathProvider, VirtualPath};
use depot_schema::{Checksum, ChecksumAlgorithm, DigestMap};
use futures::StreamExt;
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use tracing::warn;

#[derive(Clone)]
enum Hasher {
    Md5(Md5),
    Sha1(Sha1),
    Sha256(Sha256),
    Sha512(Sha512),
}

impl Hasher {
    fn new(algorithm: ChecksumAlgorithm) -> Self {
        match algorithm {
            ChecksumAlgorithm::Md5 => Self::Md5(Md5::new()),
            ChecksumAlgorithm::Sha1 => Self::Sha1(Sha1::new()),
            ChecksumAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
            ChecksumAlgorithm::Sha512 => Self::Sha512(Sha512::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(h) => h.update(data),
            Self::Sha1(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
        }
    }

    fn finalize(self) -> Checksum {
        match self {
            Self::Md5(h) => Checksum::from_bytes(&h.finalize()),
            Self::Sha1(h) => Checksum::from_bytes(&h.finalize()),
            Self::Sha256(h) => Checksum::from_bytes(&h.finalize()),
            Self::Sha512(h) => Checksum::from_bytes(&h.finalize()),
        }
    }
}

/// One hasher per configured algorithm, fed in a single pass.
#[derive(Clone)]
pub struct DigestSet {
    hashers: Vec<(ChecksumAlgorithm, Hasher)>,
}

impl std::fmt::Debug for DigestSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.hashers.iter().map(|(a, _)| a))
            .finish()
    }
}

impl DigestSet {
    /// Hashers for `algorithms`; duplicates are ignored.
    pub fn new(algorithms: &[ChecksumAlgorithm]) -> Self {
        let mut hashers: Vec<(ChecksumAlgorithm, Hasher)> = Vec::new();
        for &algorithm in algorithms {
            if !hashers.iter().any(|(a, _)| *a == algorithm) {
                hashers.push((algorithm, Hasher::new(algorithm)));
            }
        }
        Self { hashers }
    }

    /// Feed `data` to every hasher.
    pub fn update(&mut self, data: &[u8]) {
        for (_, hasher) in &mut self.hashers {
            hasher.update(data);
        }
    }

    /// Finish all hashers.
    pub fn finalize(self) -> DigestMap {
        self.hashers
            .into_iter()
            .map(|(algorithm, hasher)| (algorithm, hasher.finalize()))
            .collect()
    }

    /// Digest a byte slice in one call.
    pub fn digest(algorithms: &[ChecksumAlgorithm], data: &[u8]) -> DigestMap {
        let mut set = Self::new(algorithms);
        set.update(data);
        set.finalize()
    }
}

/// Companion checksum path of `path` for `algorithm` (e.g. `foo.jar.sha1`).
pub fn companion_path(path: &VirtualPath, algorithm: ChecksumAlgorithm) -> VirtualPath {
    path.with_suffix(&format!(".{}", algorithm.extension()))
}

/// Every possible companion path of `path`.
pub fn companion_paths(path: &VirtualPath) -> Vec<VirtualPath> {
    ChecksumAlgorithm::ALL
        .into_iter()
        .map(|a| companion_path(path, a))
        .collect()
}

/// Read the companion checksum of `path`, if present and well-formed.
pub async fn read_companion<P: PathProvider + ?Sized>(
    provider: &P,
    path: &VirtualPath,
    algorithm: ChecksumAlgorithm,
) -> Result<Option<Checksum>, StorageError> {
    let companion = companion_path(path, algorithm);
    if !provider.exists(&companion).await? {
        return Ok(None);
    }
    let mut stream = provider.open_read(&companion).await?;
    let mut contents = Vec::new();
    while let Some(chunk) = stream.next().await {
        contents.extend_from_slice(&chunk.map_err(|e| StorageError::io(companion.target(), e))?);
    }
    match Checksum::parse_file(&String::from_utf8_lossy(&contents), algorithm) {
        Ok(checksum) => Ok(Some(checksum)),
        Err(e) => {
            warn!(path = %companion, error = %e, "Ignoring malformed checksum file");
            Ok(None)
        }
    }
}

/// Persist one companion file per digest next to `path`.
pub async fn write_companions(path: &VirtualPath, digests: &DigestMap) -> Result<(), StorageError> {
    for (algorithm, checksum) in digests {
        let companion = companion_path(path, *algorithm);
        super::writer::store_bytes(&companion, checksum.as_str().as_bytes().to_vec(), &[]).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vectors() {
        let digests = DigestSet::digest(&ChecksumAlgorithm::ALL, b"abc");
        assert_eq!(
            digests[&ChecksumAlgorithm::Md5].as_str(),
            "900150983cd24fb0d6963f7d28e17f72"
        );
        assert_eq!(
            digests[&ChecksumAlgorithm::Sha1].as_str(),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        assert_eq!(
            digests[&ChecksumAlgorithm::Sha256].as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(digests[&ChecksumAlgorithm::Sha512].as_str().len(), 128);
    }

    #[test]
    fn chunked_updates_match_single_pass() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let mut set = DigestSet::new(&[ChecksumAlgorithm::Sha1, ChecksumAlgorithm::Sha1]);
        for chunk in data.chunks(333) {
            set.update(chunk);
        }
        let chunked = set.finalize();
        assert_eq!(chunked.len(), 1);
        assert_eq!(chunked, DigestSet::digest(&[ChecksumAlgorithm::Sha1], &data));
    }
}
