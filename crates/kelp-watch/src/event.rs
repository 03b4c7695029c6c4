//! Storage events emitted to downstream consumers.

use std::time::UNIX_EPOCH;

use kelp_filer::Entry;
use serde::Serialize;

/// Namespace suffix marking fragment uploads, parts of a larger logical
/// upload that need no hashing or content addressing.
pub const FRAGMENT_NAMESPACE_SUFFIX: &str = "::fragment-upload";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Creation,
    Change,
    Deletion,
}

/// Hex-encoded digests over a file's content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Digests {
    pub sha256: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adler32: Option<String>,
}

/// Metadata carried by a storage event.
#[derive(Debug, Clone, Serialize)]
pub struct FileMetadata {
    pub path: String,
    pub name: String,
    pub size: i64,
    /// Modification time, seconds since epoch.
    pub mod_time: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub mime: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<Digests>,
    /// Content identifier, when content addressing is enabled for the
    /// namespace.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
}

impl FileMetadata {
    pub fn from_entry(entry: &Entry) -> Self {
        let mod_time = entry
            .mod_time()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();
        Self {
            path: entry.path().as_str().to_string(),
            name: entry.name().to_string(),
            size: entry.size(),
            mod_time,
            mime: entry.mime(),
            hash: None,
            cid: None,
        }
    }
}

/// A typed event describing one observed metadata change.
#[derive(Debug, Clone, Serialize)]
pub struct StorageEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub namespace: String,
    pub metadata: FileMetadata,
}

impl StorageEvent {
    pub fn new(event_type: EventType, namespace: impl Into<String>, metadata: FileMetadata) -> Self {
        Self {
            event_type,
            namespace: namespace.into(),
            metadata,
        }
    }

    /// Reports whether the event is a fragment upload.
    pub fn is_fragment_upload(&self) -> bool {
        self.namespace.ends_with(FRAGMENT_NAMESPACE_SUFFIX)
    }
}
