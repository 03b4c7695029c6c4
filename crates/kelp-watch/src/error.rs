//! Error types for the event pipeline.

use kelp_chunk::ChunkError;
use kelp_filer::FilerError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, WatchError>;

#[derive(Debug, Error)]
pub enum WatchError {
    /// The configuration selects a subscription flavor this client does not
    /// implement.
    #[error("metadata subscription type is unsupported: {0}")]
    Unsupported(String),

    /// The configuration names a hash algorithm this client does not
    /// implement.
    #[error("unsupported hash algorithm: {0}")]
    UnsupportedHashAlgorithm(String),

    /// The watcher was already closed.
    #[error("already closed")]
    Closed,

    /// The watcher is misconfigured.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The subscription stream failed.
    #[error("subscription stream: {0}")]
    Stream(tonic::Status),

    /// The catalog collaborator failed to classify a path.
    #[error("catalog: {0}")]
    Catalog(String),

    /// The content-address collaborator failed.
    #[error("content address: {0}")]
    ContentAddress(String),

    #[error(transparent)]
    Filer(#[from] FilerError),

    #[error(transparent)]
    Chunk(#[from] ChunkError),
}
