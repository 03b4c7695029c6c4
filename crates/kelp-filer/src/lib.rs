//! Entry metadata and service facades for the kelp client.
//!
//! A metadata server owns the hierarchical namespace: every file or
//! directory is an [`Entry`] with POSIX-flavored attributes and, for files,
//! the ordered chunk list describing where its bytes live. This crate
//! provides:
//!
//! - [`FilerPath`]: absolute path wrapper with the resource classifiers the
//!   event pipeline filters on (file fragments, temporary uploads, system
//!   paths).
//! - [`Entry`]: the metadata object wiring a
//!   [`ChunkSet`](kelp_chunk::ChunkSet) to its raw wire representation so
//!   that the entry's size and serialized chunk list stay consistent under
//!   writes.
//! - [`FilerRpc`] / [`MasterRpc`]: the abstract RPC surfaces of the metadata
//!   and master servers. Connection management and generated stubs live
//!   outside this workspace; tests substitute in-memory implementations.
//! - [`Filer`] / [`Master`]: the client facades implementing entry-level
//!   operations (`stat`, `create`, `update`, `remove`, `rename`,
//!   `assign_volume`) and volume lookup on top of the RPC traits, including
//!   the error mapping and path normalization the servers expect.
//!
//! The facades also implement the chunk layer's
//! [`VolumeAssigner`](kelp_chunk::VolumeAssigner) and
//! [`VolumeLocator`](kelp_chunk::VolumeLocator) traits, which is how a
//! [`ChunkWriter`](kelp_chunk::ChunkWriter) or
//! [`ChunkReader`](kelp_chunk::ChunkReader) reaches the cluster.

pub mod entry;
pub mod error;
pub mod filer;
pub mod master;
pub mod path;
pub mod rpc;

pub use entry::{Collection, Entry};
pub use error::{FilerError, Result};
pub use filer::{Filer, Root};
pub use master::Master;
pub use path::FilerPath;
pub use rpc::{FilerRpc, MasterRpc, NotificationStream};
