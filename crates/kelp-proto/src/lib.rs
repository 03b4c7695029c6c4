//! Wire message shapes for the kelp metadata cluster.
//!
//! The metadata server, master server, and data nodes speak a protobuf-based
//! protocol. This crate carries the message types the client needs to build
//! requests and interpret responses. The messages are hand-derived with
//! `prost` rather than generated from `.proto` files: the client only ever
//! consumes these shapes through the RPC traits in `kelp-filer`, and the
//! concrete transport (connection setup, readiness probing, generated stubs)
//! lives outside this workspace.
//!
//! Field numbers follow the upstream cluster schema so the encoded bytes stay
//! compatible with servers that do use the generated code.

/// Structured form of a chunk's file id: the coordinates of a chunk on the
/// cluster, as `volume,needle-cookie`.
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct FileId {
    #[prost(uint32, tag = "1")]
    pub volume_id: u32,
    #[prost(uint64, tag = "2")]
    pub file_key: u64,
    #[prost(fixed32, tag = "3")]
    pub cookie: u32,
}

/// One chunk of file content, addressed by its server-assigned file id.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FileChunk {
    /// Opaque file id in `volume,needle-cookie` text form.
    #[prost(string, tag = "1")]
    pub file_id: ::prost::alloc::string::String,
    /// Byte offset of this chunk within the logical file.
    #[prost(int64, tag = "2")]
    pub offset: i64,
    #[prost(uint64, tag = "3")]
    pub size: u64,
    #[prost(int64, tag = "4")]
    pub modified_ts_ns: i64,
    #[prost(string, tag = "5")]
    pub e_tag: ::prost::alloc::string::String,
    /// Structured form of `file_id`.
    #[prost(message, optional, tag = "6")]
    pub fid: ::core::option::Option<FileId>,
    #[prost(bytes = "vec", tag = "7")]
    pub cipher_key: ::prost::alloc::vec::Vec<u8>,
    #[prost(bool, tag = "8")]
    pub is_compressed: bool,
}

/// POSIX-flavored attributes attached to an entry.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EntryAttributes {
    #[prost(uint64, tag = "1")]
    pub file_size: u64,
    /// Modification time, seconds since epoch.
    #[prost(int64, tag = "2")]
    pub mtime: i64,
    /// Creation time, seconds since epoch.
    #[prost(int64, tag = "3")]
    pub crtime: i64,
    #[prost(uint32, tag = "4")]
    pub file_mode: u32,
    #[prost(uint32, tag = "5")]
    pub uid: u32,
    #[prost(uint32, tag = "6")]
    pub gid: u32,
    #[prost(string, tag = "7")]
    pub mime: ::prost::alloc::string::String,
}

/// A file or directory as stored by the metadata server.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Entry {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(bool, tag = "2")]
    pub is_directory: bool,
    #[prost(message, repeated, tag = "3")]
    pub chunks: ::prost::alloc::vec::Vec<FileChunk>,
    #[prost(message, optional, tag = "4")]
    pub attributes: ::core::option::Option<EntryAttributes>,
}

/// Configuration attributes reported by a metadata server.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FilerConfiguration {
    /// Directory under which buckets are rooted, e.g. `/buckets`.
    #[prost(string, tag = "1")]
    pub dir_buckets: ::prost::alloc::string::String,
    #[prost(string, repeated, tag = "2")]
    pub masters: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    #[prost(uint32, tag = "3")]
    pub max_mb: u32,
    #[prost(int32, tag = "4")]
    pub metrics_interval_sec: i32,
    #[prost(int32, tag = "5")]
    pub signature: i32,
    #[prost(string, tag = "6")]
    pub version: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LookupEntryRequest {
    #[prost(string, tag = "1")]
    pub directory: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub name: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LookupEntryResponse {
    #[prost(message, optional, tag = "1")]
    pub entry: ::core::option::Option<Entry>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateEntryRequest {
    #[prost(string, tag = "1")]
    pub directory: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub entry: ::core::option::Option<Entry>,
    #[prost(int32, repeated, tag = "3")]
    pub signatures: ::prost::alloc::vec::Vec<i32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateEntryResponse {
    /// Non-empty when the server accepted the RPC but rejected the entry.
    #[prost(string, tag = "1")]
    pub error: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateEntryRequest {
    #[prost(string, tag = "1")]
    pub directory: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub entry: ::core::option::Option<Entry>,
    #[prost(int32, repeated, tag = "3")]
    pub signatures: ::prost::alloc::vec::Vec<i32>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct UpdateEntryResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteEntryRequest {
    #[prost(string, tag = "1")]
    pub directory: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub name: ::prost::alloc::string::String,
    #[prost(bool, tag = "3")]
    pub is_delete_data: bool,
    #[prost(bool, tag = "4")]
    pub is_recursive: bool,
    #[prost(bool, tag = "5")]
    pub ignore_recursive_error: bool,
    #[prost(int32, repeated, tag = "6")]
    pub signatures: ::prost::alloc::vec::Vec<i32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteEntryResponse {
    #[prost(string, tag = "1")]
    pub error: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RenameEntryRequest {
    #[prost(string, tag = "1")]
    pub old_directory: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub old_name: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub new_directory: ::prost::alloc::string::String,
    #[prost(string, tag = "4")]
    pub new_name: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AssignVolumeRequest {
    #[prost(int32, tag = "1")]
    pub count: i32,
    #[prost(string, tag = "2")]
    pub path: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub collection: ::prost::alloc::string::String,
}

/// Address of a data node able to accept a chunk write.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VolumeLocation {
    #[prost(string, tag = "1")]
    pub url: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub public_url: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AssignVolumeResponse {
    #[prost(string, tag = "1")]
    pub file_id: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub location: ::core::option::Option<VolumeLocation>,
    #[prost(string, tag = "3")]
    pub error: ::prost::alloc::string::String,
}

/// Request for a metadata change subscription.
///
/// `since_ns`/`until_ns` bound the replayed window; zero means unbounded on
/// that side.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubscribeRequest {
    #[prost(int32, tag = "1")]
    pub client_id: i32,
    #[prost(string, tag = "2")]
    pub client_name: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub path_prefix: ::prost::alloc::string::String,
    #[prost(string, repeated, tag = "4")]
    pub path_prefixes: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    #[prost(int32, tag = "5")]
    pub signature: i32,
    #[prost(int64, tag = "6")]
    pub since_ns: i64,
    #[prost(int64, tag = "7")]
    pub until_ns: i64,
}

/// One change described by the metadata server: an old and/or a new entry.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EventNotification {
    #[prost(message, optional, tag = "1")]
    pub old_entry: ::core::option::Option<Entry>,
    #[prost(message, optional, tag = "2")]
    pub new_entry: ::core::option::Option<Entry>,
    #[prost(string, tag = "3")]
    pub new_parent_path: ::prost::alloc::string::String,
    #[prost(bool, tag = "4")]
    pub delete_chunks: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubscribeResponse {
    /// Directory the change happened in.
    #[prost(string, tag = "1")]
    pub directory: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub notification: ::core::option::Option<EventNotification>,
    /// Server-side timestamp of the change, nanoseconds since epoch.
    #[prost(int64, tag = "3")]
    pub ts_ns: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LookupVolumeRequest {
    #[prost(string, repeated, tag = "1")]
    pub volume_or_file_ids: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    #[prost(string, tag = "2")]
    pub collection: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VolumeIdLocation {
    #[prost(string, tag = "1")]
    pub volume_or_file_id: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "2")]
    pub locations: ::prost::alloc::vec::Vec<VolumeLocation>,
    #[prost(string, tag = "3")]
    pub error: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LookupVolumeResponse {
    #[prost(message, repeated, tag = "1")]
    pub volume_id_locations: ::prost::alloc::vec::Vec<VolumeIdLocation>,
}
