//! The ordered, offset-keyed collection of chunks for one logical file.

use std::collections::BTreeMap;
use std::sync::Arc;

use kelp_proto::FileChunk;
use parking_lot::Mutex;

use crate::chunk::Chunk;
use crate::error::{ChunkError, Result};
use crate::offset::Offset;

/// Snapshot handed to the on-mutation hook after a successful insert.
///
/// The hook must not call back into the [`ChunkSet`] it was installed on; the
/// set's lock is held while the hook runs so that hooks observe mutations in
/// order.
#[derive(Debug, Clone)]
pub struct ChunkListing {
    /// Total size in bytes across all chunks.
    pub size: i64,
    /// Wire representations in position order.
    pub chunks: Vec<FileChunk>,
}

/// Signature for the function to call when new chunks are added.
pub type OnAdd = Arc<dyn Fn(&ChunkListing) -> Result<()> + Send + Sync>;

#[derive(Default)]
struct Inner {
    chunks: BTreeMap<Offset, Chunk>,
    next_position: usize,
    size: i64,
    chunk_size_min: i64,
    chunk_size_max: i64,
}

/// Container for the collection of chunks representing file content.
///
/// All mutation goes through [`ChunkSet::add`] and [`ChunkSet::clear`];
/// both serialize on an internal lock, so the set can be shared between an
/// entry and a writer.
pub struct ChunkSet {
    inner: Mutex<Inner>,
    on_add: Option<OnAdd>,
    path: String,
}

impl ChunkSet {
    /// Creates an empty set for the logical file at `path`.
    pub fn new(path: impl Into<String>) -> Result<Self> {
        let path = path.into().trim().to_string();
        if path.is_empty() {
            return Err(ChunkError::InvalidArgument(
                "chunk set path is required".to_string(),
            ));
        }
        Ok(Self {
            inner: Mutex::new(Inner::default()),
            on_add: None,
            path,
        })
    }

    /// Installs the hook fired after each successful `add`.
    pub fn with_on_add(mut self, hook: OnAdd) -> Self {
        self.on_add = Some(hook);
        self
    }

    /// Seeds the set from an existing chunk list.
    pub fn with_chunks(self, chunks: &[FileChunk]) -> Result<Self> {
        self.add(chunks)?;
        Ok(self)
    }

    /// Inserts each chunk keyed by its byte interval.
    ///
    /// A chunk whose interval is already present is skipped; the first
    /// insertion wins. Positions are assigned monotonically. Returns the
    /// number of chunks actually inserted. A hook failure aborts the call
    /// and is propagated.
    pub fn add(&self, chunks: &[FileChunk]) -> Result<usize> {
        let mut inner = self.inner.lock();

        let mut inserted = 0;
        for pb in chunks {
            let chunk = Chunk::new(pb.clone())?;
            let key = chunk.offset();
            if inner.chunks.contains_key(&key) {
                continue;
            }
            let position = inner.next_position;
            let size = chunk.size();
            inner.chunks.insert(key, chunk.with_position(position));
            inner.next_position += 1;
            inner.size += size;
            if inner.chunk_size_min == 0 || size < inner.chunk_size_min {
                inner.chunk_size_min = size;
            }
            if size > inner.chunk_size_max {
                inner.chunk_size_max = size;
            }
            inserted += 1;
        }

        if inserted > 0 {
            if let Some(hook) = &self.on_add {
                let listing = ChunkListing {
                    size: inner.size,
                    chunks: inner.chunks.values().map(|c| c.pb().clone()).collect(),
                };
                hook(&listing)?;
            }
        }
        Ok(inserted)
    }

    /// Returns the chunk whose interval covers the offset, half-open:
    /// `start <= offset < end`. Zero-length chunks are never matched.
    pub fn at_offset(&self, offset: i64) -> Result<Chunk> {
        let inner = self.inner.lock();
        if offset < 0 || offset > inner.size {
            return Err(ChunkError::InvalidArgument(format!(
                "invalid offset {} for chunks with size {}",
                offset, inner.size
            )));
        }
        inner
            .chunks
            .values()
            .find(|c| c.offset().start <= offset && offset < c.offset().end)
            .cloned()
            .ok_or(ChunkError::ChunkNotFound)
    }

    /// All chunks sorted by ascending interval, which for a single writer is
    /// also position order.
    pub fn list(&self) -> Vec<Chunk> {
        self.inner.lock().chunks.values().cloned().collect()
    }

    /// Wire representations in the same order as [`ChunkSet::list`].
    pub fn to_pb(&self) -> Vec<FileChunk> {
        self.inner
            .lock()
            .chunks
            .values()
            .map(|c| c.pb().clone())
            .collect()
    }

    /// Removes all chunks and resets the size bookkeeping.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.chunks.clear();
        inner.next_position = 0;
        inner.size = 0;
        inner.chunk_size_min = 0;
        inner.chunk_size_max = 0;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total size in bytes across all chunks.
    pub fn size(&self) -> i64 {
        self.inner.lock().size
    }

    /// Size in bytes of the smallest chunk.
    pub fn chunk_size_min(&self) -> i64 {
        self.inner.lock().chunk_size_min
    }

    /// Size in bytes of the largest chunk.
    pub fn chunk_size_max(&self) -> i64 {
        self.inner.lock().chunk_size_max
    }

    /// The path of the logical file the set represents.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl std::fmt::Debug for ChunkSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ChunkSet")
            .field("path", &self.path)
            .field("len", &inner.chunks.len())
            .field("size", &inner.size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn file_chunk(id: &str, offset: i64, size: u64) -> FileChunk {
        FileChunk {
            file_id: id.to_string(),
            offset,
            size,
            ..Default::default()
        }
    }

    #[test]
    fn add_assigns_positions_in_offset_order() {
        let set = ChunkSet::new("/buckets/a/b").unwrap();
        let n = set
            .add(&[
                file_chunk("3,01", 0, 100),
                file_chunk("3,02", 100, 100),
                file_chunk("3,03", 200, 50),
            ])
            .unwrap();
        assert_eq!(n, 3);
        assert_eq!(set.size(), 250);
        assert_eq!(set.chunk_size_min(), 50);
        assert_eq!(set.chunk_size_max(), 100);

        let chunks = set.list();
        let positions: Vec<usize> = chunks.iter().map(|c| c.position()).collect();
        assert_eq!(positions, vec![0, 1, 2]);
        let mut starts: Vec<i64> = chunks.iter().map(|c| c.offset().start).collect();
        let sorted = starts.clone();
        starts.sort();
        assert_eq!(starts, sorted);
    }

    #[test]
    fn duplicate_interval_first_wins() {
        let set = ChunkSet::new("/buckets/a/b").unwrap();
        set.add(&[file_chunk("3,01", 0, 100)]).unwrap();
        let n = set.add(&[file_chunk("3,ff", 0, 100)]).unwrap();
        assert_eq!(n, 0);
        assert_eq!(set.len(), 1);
        assert_eq!(set.list()[0].file_id(), "3,01");
    }

    #[test]
    fn at_offset_covers_every_position() {
        let set = ChunkSet::new("/buckets/a/b").unwrap();
        set.add(&[
            file_chunk("3,01", 0, 64),
            file_chunk("3,02", 64, 64),
            file_chunk("3,03", 128, 16),
        ])
        .unwrap();

        for p in 0..set.size() {
            let c = set.at_offset(p).unwrap();
            assert!(c.offset().start <= p && p < c.offset().end, "offset {p}");
        }
        // Boundary between two chunks resolves to the one starting there.
        assert_eq!(set.at_offset(64).unwrap().file_id(), "3,02");
    }

    #[test]
    fn at_offset_bounds() {
        let set = ChunkSet::new("/buckets/a/b").unwrap();
        set.add(&[file_chunk("3,01", 0, 64)]).unwrap();
        assert!(matches!(
            set.at_offset(-1),
            Err(ChunkError::InvalidArgument(_))
        ));
        assert!(matches!(
            set.at_offset(65),
            Err(ChunkError::InvalidArgument(_))
        ));
        // Exactly `size` is in bounds but covered by nothing.
        assert!(matches!(set.at_offset(64), Err(ChunkError::ChunkNotFound)));
    }

    #[test]
    fn zero_length_chunk_listed_but_never_matched() {
        let set = ChunkSet::new("/buckets/a/b").unwrap();
        set.add(&[file_chunk("3,01", 0, 0), file_chunk("3,02", 0, 32)])
            .unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.at_offset(0).unwrap().file_id(), "3,02");
    }

    #[test]
    fn clear_resets_everything() {
        let set = ChunkSet::new("/buckets/a/b").unwrap();
        set.add(&[file_chunk("3,01", 0, 64)]).unwrap();
        set.clear();
        assert_eq!(set.len(), 0);
        assert_eq!(set.size(), 0);
        assert_eq!(set.chunk_size_min(), 0);
        assert_eq!(set.chunk_size_max(), 0);
        // Positions restart after a clear.
        set.add(&[file_chunk("3,02", 0, 64)]).unwrap();
        assert_eq!(set.list()[0].position(), 0);
    }

    #[test]
    fn hook_sees_each_mutation_and_failures_propagate() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let set = ChunkSet::new("/buckets/a/b")
            .unwrap()
            .with_on_add(Arc::new(move |listing| {
                seen.fetch_add(1, Ordering::SeqCst);
                if listing.size > 100 {
                    return Err(ChunkError::InvalidState("too big".to_string()));
                }
                Ok(())
            }));

        set.add(&[file_chunk("3,01", 0, 100)]).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let err = set.add(&[file_chunk("3,02", 100, 1)]).unwrap_err();
        assert!(matches!(err, ChunkError::InvalidState(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // Duplicate-only adds do not fire the hook.
        set.add(&[file_chunk("3,01", 0, 100)]).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
