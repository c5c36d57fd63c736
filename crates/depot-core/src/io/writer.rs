//! Atomic artifact writes.
//!
//! Bytes go to `.temp/<relative-path>.<timestamp>` while every configured
//! digest is computed in the same pass. Only a successful [`ArtifactWriter::finish`]
//! moves the file to its final path, so readers see either the old file,
//! no file, or the complete new one.

use super::checksum::DigestSet;
use crate::storage::{ByteSink, ByteStream, StorageError};
use crate::vfs::{BackendProvider, PathProvider, VirtualPath};
use bytes::Bytes;
use depot_schema::{ChecksumAlgorithm, DigestMap};
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Result of a published write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Digest per configured algorithm, lowercase hex.
    pub digests: DigestMap,
    /// Bytes written.
    pub size: u64,
}

/// Streams bytes to a temporary sibling and publishes them on finish.
///
/// Temporary files never go through the trash, so the writer always talks
/// to the backend directly.
pub struct ArtifactWriter {
    destination: VirtualPath,
    temp: VirtualPath,
    sink: ByteSink,
    digests: DigestSet,
    size: u64,
}

impl std::fmt::Debug for ArtifactWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactWriter")
            .field("destination", &self.destination)
            .field("temp", &self.temp)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl ArtifactWriter {
    /// Open a temporary file for a write to `destination`.
    pub async fn create(
        destination: VirtualPath,
        algorithms: &[ChecksumAlgorithm],
    ) -> Result<Self, StorageError> {
        let temp = destination.file_system().temp_path(&destination);
        if let Some(parent) = temp.parent() {
            BackendProvider.create_dirs(&parent).await?;
        }
        let sink = BackendProvider.open_write(&temp).await?;
        Ok(Self {
            destination,
            temp,
            sink,
            digests: DigestSet::new(algorithms),
            size: 0,
        })
    }

    /// Final location of the artifact.
    pub fn destination(&self) -> &VirtualPath {
        &self.destination
    }

    /// Temporary location bytes are currently written to.
    pub fn temp_path(&self) -> &VirtualPath {
        &self.temp
    }

    /// Append `data` and feed it to every digest.
    pub async fn write(&mut self, data: &[u8]) -> Result<(), StorageError> {
        self.sink
            .write_all(data)
            .await
            .map_err(|e| StorageError::io(self.temp.target(), e))?;
        self.digests.update(data);
        self.size += data.len() as u64;
        Ok(())
    }

    /// Close the temporary file and move it to the destination, replacing
    /// any existing file there.
    pub async fn finish(mut self) -> Result<WriteOutcome, StorageError> {
        if let Err(e) = self.close().await {
            self.discard_temp().await;
            return Err(e);
        }
        if let Err(e) = self.publish().await {
            self.discard_temp().await;
            return Err(e);
        }
        debug!(path = %self.destination, size = self.size, "Published artifact");
        Ok(WriteOutcome {
            digests: self.digests.finalize(),
            size: self.size,
        })
    }

    /// Abandon the write; the destination is left untouched.
    pub async fn abort(mut self) {
        // Closing may fail on a broken sink; the temp file is removed regardless.
        let _ = self.sink.shutdown().await;
        self.discard_temp().await;
    }

    async fn close(&mut self) -> Result<(), StorageError> {
        self.sink
            .flush()
            .await
            .map_err(|e| StorageError::io(self.temp.target(), e))?;
        self.sink
            .shutdown()
            .await
            .map_err(|e| StorageError::io(self.temp.target(), e))
    }

    async fn publish(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.destination.parent() {
            BackendProvider.create_dirs(&parent).await?;
        }
        BackendProvider.move_path(&self.temp, &self.destination).await
    }

    async fn discard_temp(&self) {
        if let Err(e) = BackendProvider.delete(&self.temp).await {
            warn!(path = %self.temp, error = %e, "Failed to remove abandoned temp file");
        }
    }
}

/// Write `stream` to `destination` atomically.
///
/// Any error, from the source stream or the backend, abandons the write.
pub async fn store_stream(
    destination: &VirtualPath,
    mut stream: ByteStream,
    algorithms: &[ChecksumAlgorithm],
) -> Result<WriteOutcome, StorageError> {
    let mut writer = ArtifactWriter::create(destination.clone(), algorithms).await?;
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                writer.abort().await;
                return Err(StorageError::io(destination.target(), e));
            }
        };
        if let Err(e) = writer.write(&chunk).await {
            writer.abort().await;
            return Err(e);
        }
    }
    writer.finish().await
}

/// Write an in-memory buffer to `destination` atomically.
pub async fn store_bytes(
    destination: &VirtualPath,
    data: Vec<u8>,
    algorithms: &[ChecksumAlgorithm],
) -> Result<WriteOutcome, StorageError> {
    let stream = futures::stream::once(async move { Ok(Bytes::from(data)) }).boxed();
    store_stream(destination, stream, algorithms).await
}
