//! File and directory metadata entries.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use kelp_chunk::{ChunkError, ChunkListing, ChunkSet};
use kelp_proto as proto;
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::Result;
use crate::path::FilerPath;

/// Fallback owner ids used when an entry carries no attributes.
pub const DEFAULT_UID: u32 = 0;
pub const DEFAULT_GID: u32 = 0;

/// Properties of a bucket within the filer namespace.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Collection {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
}

/// Metadata for a file or directory managed by the filer.
///
/// An entry owns its [`ChunkSet`]; the set's on-mutation hook keeps the raw
/// wire entry consistent, so `attributes.file_size` equals the chunk total
/// whenever the entry is observed after an add or truncate.
pub struct Entry {
    path: FilerPath,
    pb: Arc<Mutex<proto::Entry>>,
    chunks: Arc<ChunkSet>,
    collection: Option<Collection>,
}

impl Entry {
    /// Builds an entry from its wire representation, wiring the chunk set's
    /// mutation hook into the shared raw metadata.
    pub fn new(path: FilerPath, pb: proto::Entry) -> Result<Self> {
        let seed = pb.chunks.clone();
        let pb = Arc::new(Mutex::new(pb));
        let hook_target = Arc::clone(&pb);
        let chunks = ChunkSet::new(path.as_str())?
            .with_on_add(Arc::new(move |listing| sync_raw(&hook_target, listing)))
            .with_chunks(&seed)?;

        Ok(Self {
            path,
            pb,
            chunks: Arc::new(chunks),
            collection: None,
        })
    }

    pub fn with_collection(mut self, collection: Collection) -> Self {
        self.collection = Some(collection);
        self
    }

    /// The chunk metadata for the entry's content.
    pub fn chunks(&self) -> Arc<ChunkSet> {
        Arc::clone(&self.chunks)
    }

    pub fn collection(&self) -> Option<&Collection> {
        self.collection.as_ref()
    }

    /// The file id of each chunk, in position order.
    pub fn file_ids(&self) -> Vec<String> {
        self.chunks
            .list()
            .iter()
            .map(|c| c.file_id().to_string())
            .collect()
    }

    pub fn is_dir(&self) -> bool {
        self.pb.lock().is_directory
    }

    /// Modification time; the epoch when the entry has no attributes.
    pub fn mod_time(&self) -> SystemTime {
        let mtime = self
            .pb
            .lock()
            .attributes
            .as_ref()
            .map(|a| a.mtime)
            .unwrap_or_default();
        UNIX_EPOCH + Duration::from_secs(mtime.max(0) as u64)
    }

    pub fn name(&self) -> &str {
        self.path.name()
    }

    pub fn path(&self) -> &FilerPath {
        &self.path
    }

    /// Size in bytes for files, zero for directories.
    pub fn size(&self) -> i64 {
        let pb = self.pb.lock();
        if pb.is_directory {
            return 0;
        }
        pb.attributes
            .as_ref()
            .map(|a| a.file_size as i64)
            .unwrap_or_default()
    }

    pub fn uid(&self) -> u32 {
        self.pb
            .lock()
            .attributes
            .as_ref()
            .map(|a| a.uid)
            .unwrap_or(DEFAULT_UID)
    }

    pub fn gid(&self) -> u32 {
        self.pb
            .lock()
            .attributes
            .as_ref()
            .map(|a| a.gid)
            .unwrap_or(DEFAULT_GID)
    }

    pub fn mime(&self) -> String {
        self.pb
            .lock()
            .attributes
            .as_ref()
            .map(|a| a.mime.clone())
            .unwrap_or_default()
    }

    pub fn mode(&self) -> u32 {
        self.pb
            .lock()
            .attributes
            .as_ref()
            .map(|a| a.file_mode)
            .unwrap_or_default()
    }

    /// Removes all chunks and zeroes the size, atomically with respect to
    /// the raw metadata. Directories are left untouched.
    pub fn truncate(&self) {
        let mut pb = self.pb.lock();
        if pb.is_directory {
            return;
        }
        if let Some(attrs) = pb.attributes.as_mut() {
            attrs.file_size = 0;
        }
        pb.chunks.clear();
        self.chunks.clear();
    }

    /// A snapshot of the raw wire representation.
    pub fn to_pb(&self) -> proto::Entry {
        self.pb.lock().clone()
    }

    /// Stamps the modification time and returns the updated snapshot.
    pub(crate) fn refresh_mtime(&self, mtime: i64) -> proto::Entry {
        let mut pb = self.pb.lock();
        if let Some(attrs) = pb.attributes.as_mut() {
            attrs.mtime = mtime;
        }
        pb.clone()
    }
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("path", &self.path)
            .field("is_dir", &self.is_dir())
            .field("size", &self.size())
            .field("chunks", &self.chunks.len())
            .finish()
    }
}

/// On-mutation hook target: refreshes the raw entry's size and serialized
/// chunk list. Fails when a file entry is missing its attributes.
fn sync_raw(
    pb: &Arc<Mutex<proto::Entry>>,
    listing: &ChunkListing,
) -> std::result::Result<(), ChunkError> {
    let mut pb = pb.lock();
    if pb.is_directory {
        return Ok(());
    }
    let attrs = pb.attributes.as_mut().ok_or_else(|| {
        ChunkError::InvalidState("entry attributes are missing for a file".to_string())
    })?;
    attrs.file_size = listing.size.max(0) as u64;
    pb.chunks = listing.chunks.clone();
    Ok(())
}

/// Builds the wire entry for a newly created file or directory.
pub(crate) fn new_pb_entry(name: &str, mode: u32, is_dir: bool, uid: u32, gid: u32) -> proto::Entry {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default();
    proto::Entry {
        name: name.to_string(),
        is_directory: is_dir,
        chunks: Vec::new(),
        attributes: Some(proto::EntryAttributes {
            file_size: 0,
            mtime: now,
            crtime: now,
            file_mode: mode,
            uid,
            gid,
            mime: String::new(),
        }),
    }
}
