//! Error types for chunk operations.
//!
//! The writer and reader remember the first error they hit and fail every
//! later call with it, so [`ChunkError`] is `Clone`; the one non-clonable
//! source (`reqwest::Error`) is wrapped in an `Arc`.

use std::sync::Arc;

use thiserror::Error;

/// Convenience alias used throughout the chunk layer.
pub type Result<T> = std::result::Result<T, ChunkError>;

#[derive(Debug, Clone, Error)]
pub enum ChunkError {
    /// No chunk covers the requested offset.
    #[error("chunk not found")]
    ChunkNotFound,

    /// The data node rejected the requested byte range (HTTP 416).
    #[error("invalid range")]
    InvalidRange,

    /// Caller misuse of a public facade.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An internal invariant did not hold, e.g. an entry missing the
    /// attributes the on-mutation hook needs.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The writer or reader was already closed.
    #[error("already closed")]
    Closed,

    /// In-flight work was cancelled before completing.
    #[error("cancelled")]
    Cancelled,

    /// The master returned no live location for a chunk.
    #[error("volumes not found: file_id={0}")]
    VolumesNotFound(String),

    /// A file id did not parse as `volume,needle-cookie`.
    #[error("invalid file id: {0}")]
    InvalidFileId(String),

    /// A chunk upload came back non-2xx.
    #[error("upload failed for {location}: status {status}")]
    UploadFailed { status: u16, location: String },

    /// A data node answered with a status the client cannot act on.
    #[error("request failed for {location}: status {status}")]
    UpstreamFailure { status: u16, location: String },

    /// A chunk download returned a body shorter or longer than the chunk.
    #[error(
        "expected content with length {expected}, but received {actual} for chunk: \
         location={location}, path={path}"
    )]
    ContentLengthMismatch {
        expected: u64,
        actual: u64,
        location: String,
        path: String,
    },

    /// Transport-level HTTP failure after retries.
    #[error("transport: {0}")]
    Transport(Arc<reqwest::Error>),

    /// Failure surfaced by the volume assigner or locator collaborator.
    #[error("volume service: {0}")]
    VolumeService(String),
}

impl From<reqwest::Error> for ChunkError {
    fn from(err: reqwest::Error) -> Self {
        ChunkError::Transport(Arc::new(err))
    }
}
