//! Error types for filer and master operations.
//!
//! Every operation tags its errors with the operation name so a failure deep
//! in a write or event pipeline still names the entry-level call it belongs
//! to.

use kelp_chunk::ChunkError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FilerError>;

#[derive(Debug, Error)]
pub enum FilerError {
    /// The named entry does not exist.
    #[error("{op}: {path}: entry not found")]
    NotFound { op: &'static str, path: String },

    /// The named entry already exists.
    #[error("{op}: {path}: entry already exists")]
    AlreadyExists { op: &'static str, path: String },

    /// The client was already closed.
    #[error("client already closed")]
    Closed,

    /// Caller misuse of a public facade.
    #[error("{op}: {message}")]
    InvalidArgument { op: &'static str, message: String },

    /// The server accepted the RPC but reported a failure of its own.
    #[error("{op}: {message}")]
    Remote { op: &'static str, message: String },

    /// The RPC channel failed in a way the client cannot interpret.
    #[error("{op}: {status}")]
    Upstream {
        op: &'static str,
        status: tonic::Status,
    },

    /// A chunk-layer failure bubbled through an entry operation.
    #[error(transparent)]
    Chunk(#[from] ChunkError),
}

impl FilerError {
    /// Reports whether the error means "the entry does not exist".
    pub fn is_not_found(&self) -> bool {
        matches!(self, FilerError::NotFound { .. })
    }

    /// Reports whether the error means "the entry already exists".
    pub fn is_already_exists(&self) -> bool {
        matches!(self, FilerError::AlreadyExists { .. })
    }
}
