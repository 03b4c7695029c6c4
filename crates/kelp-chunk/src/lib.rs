//! Chunked content I/O for the kelp client.
//!
//! File content on the cluster is split into immutable, content-addressed
//! chunks held by data nodes. This crate owns everything on the byte path:
//!
//! - [`Offset`] / [`Chunk`]: the value types describing one chunk's place in
//!   a logical file.
//! - [`ChunkSet`]: the ordered, offset-keyed collection of chunks for one
//!   file, with an on-mutation hook that keeps the owning entry's metadata
//!   in sync.
//! - [`ChunkWriter`]: a sequential byte sink that batches writes into
//!   chunk-sized buffers, asks the metadata service for a volume assignment
//!   per chunk, and uploads each chunk with a multipart POST.
//! - [`ChunkReader`]: a random-access reader that resolves each chunk's data
//!   node through the master, prefetches through a bounded pipeline, and
//!   serves reads in strict offset order.
//!
//! The metadata and master services are reached through the
//! [`VolumeAssigner`] and [`VolumeLocator`] traits; `kelp-filer` provides the
//! production implementations.
//!
//! ## Write path
//!
//! ```text
//! write(bytes) ──► queue ──► buffer task ──► assign volume ──► POST chunk
//!                                 │                                │
//!                                 └── on threshold (4 MiB) ────────┘
//!                                                                  ▼
//!                                                           ChunkSet::add
//! ```
//!
//! ## Read path
//!
//! ```text
//! seek(off) ──► owning chunk ──► ordered prefetch (≤ Q in flight)
//! read(buf) ◄── window buffer ◄── HEAD probe + GET from a live replica
//! ```

pub mod chunk;
pub mod chunks;
pub mod error;
pub mod http;
pub mod offset;
pub mod pool;
pub mod reader;
pub mod upload;
pub mod writer;

pub use chunk::{Chunk, CHUNK_SIZE};
pub use chunks::{ChunkListing, ChunkSet, OnAdd};
pub use error::{ChunkError, Result};
pub use http::RetryPolicy;
pub use offset::Offset;
pub use reader::{ChunkReader, VolumeLocator, DEFAULT_QUEUE_SIZE};
pub use upload::UploadResult;
pub use writer::{ChunkWriter, VolumeAssigner, VolumeAssignment};
