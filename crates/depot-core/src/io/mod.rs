//! IO modules - artifact writes and checksum companions

pub mod checksum;
pub mod writer;

pub use checksum::{DigestSet, companion_path, companion_paths, read_companion, write_companions};
pub use writer::{ArtifactWriter, WriteOutcome, store_bytes, store_stream};
