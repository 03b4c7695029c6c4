//! Random-access reading over the concatenated bytes of a chunk set.

use std::collections::VecDeque;
use std::io::SeekFrom;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use rand::Rng;
use reqwest::header::RANGE;
use reqwest::StatusCode;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::trace;
use url::Url;

use crate::chunk::Chunk;
use crate::chunks::ChunkSet;
use crate::error::{ChunkError, Result};
use crate::http::{client, retry_transport, RetryPolicy};
use crate::pool;

/// Default number of chunks the prefetch pipeline keeps in flight.
pub const DEFAULT_QUEUE_SIZE: usize = 8;

/// Master-service collaborator that maps a chunk's file id to the data nodes
/// holding it.
#[async_trait]
pub trait VolumeLocator: Send + Sync {
    async fn find_volumes(&self, collection: &str, file_id: &str) -> Result<Vec<Url>>;
}

/// Reads chunk content for a file.
///
/// Bytes are delivered strictly in ascending logical offset. Seeking anywhere
/// other than the current position cancels in-flight prefetch and
/// re-initializes the pipeline at the chunk owning the target offset; a seek
/// to or past the total size turns subsequent reads into clean end-of-stream.
///
/// `read` returns `Ok(0)` once the total consumed bytes reach the logical
/// size.
pub struct ChunkReader {
    locator: Arc<dyn VolumeLocator>,
    chunks: Arc<ChunkSet>,
    collection: String,
    path: String,
    size: i64,
    queue_size: usize,
    retry: RetryPolicy,
    window: BytesMut,
    pending: VecDeque<JoinHandle<Result<FetchedChunk>>>,
    pos: i64,
    err: Option<ChunkError>,
    closed: bool,
}

impl ChunkReader {
    /// Opens a reader positioned at offset zero.
    pub fn new(locator: Arc<dyn VolumeLocator>, chunks: Arc<ChunkSet>) -> Result<Self> {
        Self::builder(locator, chunks).build()
    }

    pub fn builder(locator: Arc<dyn VolumeLocator>, chunks: Arc<ChunkSet>) -> ChunkReaderBuilder {
        ChunkReaderBuilder {
            locator,
            chunks,
            collection: String::new(),
            queue_size: DEFAULT_QUEUE_SIZE,
            retry: RetryPolicy::default(),
        }
    }

    /// Fills `b` from the current position, pulling prefetched chunks as the
    /// internal window drains. Returns the number of bytes copied, `Ok(0)`
    /// at end of stream.
    pub async fn read(&mut self, b: &mut [u8]) -> Result<usize> {
        if b.is_empty() {
            return Ok(0);
        }
        if self.closed {
            return Err(ChunkError::Closed);
        }
        if let Some(err) = &self.err {
            return Err(err.clone());
        }
        if self.pos >= self.size {
            return Ok(0);
        }

        let mut n = 0;
        while n < b.len() && self.pos + (n as i64) < self.size {
            if !self.window.is_empty() {
                let take = self.window.len().min(b.len() - n);
                b[n..n + take].copy_from_slice(&self.window[..take]);
                self.window.advance(take);
                n += take;
                continue;
            }
            let handle = match self.pending.pop_front() {
                Some(handle) => handle,
                None => break,
            };
            let fetched = match handle.await {
                Ok(Ok(fetched)) => fetched,
                Ok(Err(err)) => return Err(self.store_err(err)),
                Err(_) => return Err(self.store_err(ChunkError::Cancelled)),
            };
            // Adopting the bytes consumes the chunk's prefetch slot.
            let drained = std::mem::replace(&mut self.window, fetched.bytes);
            pool::release(drained);
        }
        self.pos += n as i64;
        Ok(n)
    }

    /// Reads the remaining bytes from the current position.
    pub async fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = self.read(&mut buf).await?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    /// Moves the read position. Negative results are rejected; positions at
    /// or beyond the total size are accepted and read as end-of-stream.
    pub async fn seek(&mut self, seek: SeekFrom) -> Result<u64> {
        if self.closed {
            return Err(ChunkError::Closed);
        }
        if let Some(err) = &self.err {
            return Err(err.clone());
        }
        let target = match seek {
            SeekFrom::Start(off) => i64::try_from(off)
                .map_err(|_| ChunkError::InvalidArgument(format!("offset out of range: {off}")))?,
            SeekFrom::Current(delta) => self.pos + delta,
            SeekFrom::End(delta) => self.size + delta,
        };
        if target < 0 {
            return Err(ChunkError::InvalidArgument(format!(
                "negative position: {target}"
            )));
        }
        if target != self.pos {
            self.init(target)?;
        }
        Ok(target as u64)
    }

    /// Cancels in-flight work and releases buffers. The second call returns
    /// [`ChunkError::Closed`].
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(ChunkError::Closed);
        }
        self.closed = true;
        self.cancel_pending();
        let window = std::mem::take(&mut self.window);
        pool::release(window);
        Ok(())
    }

    /// Total size in bytes of the logical file.
    pub fn size(&self) -> i64 {
        self.size
    }

    /// The current read position.
    pub fn position(&self) -> i64 {
        self.pos
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Rebuilds the prefetch pipeline starting at the chunk owning `off`.
    fn init(&mut self, off: i64) -> Result<()> {
        self.cancel_pending();
        self.window.clear();
        self.pos = off;
        if off >= self.size || self.chunks.is_empty() {
            return Ok(());
        }

        let start = if off > 0 {
            self.chunks.at_offset(off)?
        } else {
            match self.chunks.list().into_iter().next() {
                Some(chunk) => chunk,
                None => return Ok(()),
            }
        };
        let skip = off - start.offset().start;
        let start_position = start.position();

        let semaphore = Arc::new(Semaphore::new(self.queue_size));
        for chunk in self
            .chunks
            .list()
            .into_iter()
            .filter(|c| c.position() >= start_position)
        {
            let skip = if chunk.position() == start_position {
                skip
            } else {
                0
            };
            let fetch = Fetch {
                locator: Arc::clone(&self.locator),
                collection: self.collection.clone(),
                path: self.path.clone(),
                retry: self.retry.clone(),
            };
            let semaphore = Arc::clone(&semaphore);
            self.pending.push_back(tokio::spawn(async move {
                // The permit rides along with the fetched bytes so at most
                // `queue_size` chunks are in flight or waiting for the
                // consumer at any moment.
                let permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| ChunkError::Cancelled)?;
                let bytes = fetch.chunk_content(chunk, skip).await?;
                Ok(FetchedChunk {
                    bytes,
                    _permit: permit,
                })
            }));
        }
        Ok(())
    }

    fn cancel_pending(&mut self) {
        for handle in self.pending.drain(..) {
            handle.abort();
        }
    }

    fn store_err(&mut self, err: ChunkError) -> ChunkError {
        if self.err.is_none() {
            self.err = Some(err.clone());
        }
        err
    }
}

impl Drop for ChunkReader {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

pub struct ChunkReaderBuilder {
    locator: Arc<dyn VolumeLocator>,
    chunks: Arc<ChunkSet>,
    collection: String,
    queue_size: usize,
    retry: RetryPolicy,
}

impl ChunkReaderBuilder {
    /// Number of chunks to keep in flight. Zero selects the default.
    pub fn queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = if queue_size == 0 {
            DEFAULT_QUEUE_SIZE
        } else {
            queue_size
        };
        self
    }

    /// Collection (bucket namespace) passed through to volume lookups.
    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn build(self) -> Result<ChunkReader> {
        let size = self.chunks.size();
        // A file no larger than its biggest chunk gains nothing from fan-out.
        let queue_size = if size <= self.chunks.chunk_size_max() {
            1
        } else {
            self.queue_size
        };

        let mut reader = ChunkReader {
            locator: self.locator,
            path: self.chunks.path().to_string(),
            collection: self.collection,
            size,
            queue_size,
            retry: self.retry,
            chunks: self.chunks,
            window: BytesMut::new(),
            pending: VecDeque::new(),
            pos: 0,
            err: None,
            closed: false,
        };
        if !reader.chunks.is_empty() {
            reader.init(0)?;
        }
        Ok(reader)
    }
}

/// One prefetched chunk body, still holding its pipeline slot.
struct FetchedChunk {
    bytes: BytesMut,
    _permit: OwnedSemaphorePermit,
}

struct Fetch {
    locator: Arc<dyn VolumeLocator>,
    collection: String,
    path: String,
    retry: RetryPolicy,
}

impl Fetch {
    /// Downloads one chunk's bytes, skipping `skip` leading bytes via a range
    /// request when resuming mid-chunk.
    async fn chunk_content(&self, chunk: Chunk, skip: i64) -> Result<BytesMut> {
        let locations = self.live_locations(&chunk).await?;
        let location = pick_location(&locations);
        let expected = chunk.size() - skip;

        trace!(
            path = %self.path,
            file_id = %chunk.file_id(),
            location = %location,
            skip,
            "fetching chunk"
        );

        let resp = retry_transport(&self.retry, || {
            let mut req = client().get(location.clone());
            if skip > 0 {
                req = req.header(RANGE, format!("bytes={skip}-"));
            }
            req.send()
        })
        .await?;

        match resp.status() {
            StatusCode::OK | StatusCode::PARTIAL_CONTENT => {}
            StatusCode::RANGE_NOT_SATISFIABLE => return Err(ChunkError::InvalidRange),
            status => {
                return Err(ChunkError::UpstreamFailure {
                    status: status.as_u16(),
                    location: location.to_string(),
                })
            }
        }

        let mut buf = pool::acquire(expected.max(0) as usize);
        let mut resp = resp;
        while let Some(bytes) = resp.chunk().await? {
            buf.extend_from_slice(&bytes);
        }
        if buf.len() as i64 != expected {
            let actual = buf.len() as u64;
            pool::release(buf);
            return Err(ChunkError::ContentLengthMismatch {
                expected: expected.max(0) as u64,
                actual,
                location: location.to_string(),
                path: self.path.clone(),
            });
        }
        Ok(buf)
    }

    /// Resolves the chunk's candidate URLs and keeps the ones that answer a
    /// HEAD probe.
    async fn live_locations(&self, chunk: &Chunk) -> Result<Vec<Url>> {
        let volumes = self
            .locator
            .find_volumes(&self.collection, chunk.file_id())
            .await?;
        if volumes.is_empty() {
            return Err(ChunkError::VolumesNotFound(chunk.file_id().to_string()));
        }

        let mut live = Vec::with_capacity(volumes.len());
        for volume in volumes {
            match chunk_location(&volume, chunk.file_id()) {
                Ok(location) => {
                    if probe(&location).await {
                        live.push(location);
                    }
                }
                Err(err) => {
                    trace!(volume = %volume, error = %err, "skipping unusable volume url");
                }
            }
        }
        if live.is_empty() {
            return Err(ChunkError::VolumesNotFound(chunk.file_id().to_string()));
        }
        Ok(live)
    }
}

fn chunk_location(volume: &Url, file_id: &str) -> Result<Url> {
    let mut location = volume.clone();
    location
        .path_segments_mut()
        .map_err(|_| ChunkError::InvalidArgument(format!("volume url cannot be a base: {volume}")))?
        .pop_if_empty()
        .push(file_id);
    Ok(location)
}

fn pick_location(locations: &[Url]) -> &Url {
    if locations.len() == 1 {
        &locations[0]
    } else {
        &locations[rand::thread_rng().gen_range(0..locations.len())]
    }
}

async fn probe(location: &Url) -> bool {
    match client().head(location.clone()).send().await {
        Ok(resp) => {
            let status = resp.status();
            status.is_success() || status.is_redirection()
        }
        Err(_) => false,
    }
}
