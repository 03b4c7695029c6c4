//! The immutable value type describing a single stored chunk.

use kelp_proto::FileChunk;

use crate::error::{ChunkError, Result};
use crate::offset::Offset;

/// Default size in bytes for a chunk buffer.
pub const CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Part of the content for a file: a server-assigned file id plus the byte
/// interval the chunk occupies in the logical file.
#[derive(Debug, Clone)]
pub struct Chunk {
    pb: FileChunk,
    offset: Offset,
    position: usize,
}

impl Chunk {
    /// Creates a new `Chunk` from its wire representation.
    ///
    /// Fails when the file id is missing or when `offset + size` would
    /// overflow.
    pub fn new(pb: FileChunk) -> Result<Self> {
        if pb.file_id.is_empty() {
            return Err(ChunkError::InvalidArgument(
                "chunk file id is required".to_string(),
            ));
        }
        if pb.offset < 0 {
            return Err(ChunkError::InvalidArgument(format!(
                "negative chunk offset: {}",
                pb.offset
            )));
        }
        let end = pb
            .offset
            .checked_add(i64::try_from(pb.size).map_err(|_| {
                ChunkError::InvalidArgument(format!("chunk size out of range: {}", pb.size))
            })?)
            .ok_or_else(|| {
                ChunkError::InvalidArgument(format!(
                    "chunk interval overflows: offset={} size={}",
                    pb.offset, pb.size
                ))
            })?;

        let offset = Offset::new(pb.offset, end);
        Ok(Self {
            pb,
            offset,
            position: 0,
        })
    }

    pub(crate) fn with_position(mut self, position: usize) -> Self {
        self.position = position;
        self
    }

    /// The opaque file id naming the chunk's coordinates on the cluster.
    pub fn file_id(&self) -> &str {
        &self.pb.file_id
    }

    /// The byte interval the chunk occupies in the logical file.
    pub fn offset(&self) -> Offset {
        self.offset
    }

    /// The position of the chunk relative to its siblings.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn size(&self) -> i64 {
        self.offset.len()
    }

    pub fn etag(&self) -> &str {
        &self.pb.e_tag
    }

    pub fn cipher_key(&self) -> &[u8] {
        &self.pb.cipher_key
    }

    pub fn is_compressed(&self) -> bool {
        self.pb.is_compressed
    }

    pub fn modified_ts_ns(&self) -> i64 {
        self.pb.modified_ts_ns
    }

    /// The underlying wire representation.
    pub fn pb(&self) -> &FileChunk {
        &self.pb
    }
}
