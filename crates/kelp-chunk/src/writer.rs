//! Sequential chunk-writing byte sink.
//!
//! Bytes accepted by [`ChunkWriter::write`] flow over a bounded queue to a
//! buffer task. Whenever the buffer reaches the chunk size, the task asks the
//! metadata service for a fresh volume assignment, uploads exactly one
//! chunk's worth of bytes with a multipart POST, and appends the resulting
//! descriptor to the shared [`ChunkSet`]. Closing drains the queue and
//! flushes any partial tail as a final, smaller chunk.
//!
//! The queue is bounded at one slice, so callers observe back-pressure from
//! the upload path instead of growing the buffer without limit.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RANGE};
use reqwest::multipart::{Form, Part};
use reqwest::Body;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use url::Url;

use crate::chunk::CHUNK_SIZE;
use crate::chunks::ChunkSet;
use crate::error::{ChunkError, Result};
use crate::http::{client, retry_transport, RetryPolicy};
use crate::pool;
use crate::upload::{decode_upload_response, UploadResult};

const IDEMPOTENCY_KEY: HeaderName = HeaderName::from_static("idempotency-key");

/// A freshly assigned destination for one chunk: the server-issued file id
/// and the data-node URL to upload to.
#[derive(Debug, Clone)]
pub struct VolumeAssignment {
    pub file_id: String,
    pub location: Url,
}

/// Metadata-service collaborator that hands out writeable chunk destinations.
#[async_trait]
pub trait VolumeAssigner: Send + Sync {
    async fn assign_volume(&self, path: &str) -> Result<VolumeAssignment>;
}

/// A write-only byte sink producing a sequence of uploaded chunks.
///
/// The writer remembers the first error it hits and fails every subsequent
/// operation with it. A failed upload is never reflected in the chunk set.
pub struct ChunkWriter {
    path: String,
    tx: Option<mpsc::Sender<Bytes>>,
    task: Option<JoinHandle<Result<()>>>,
    err: Arc<Mutex<Option<ChunkError>>>,
    closed: bool,
}

impl ChunkWriter {
    /// Starts a writer appending to `chunks`, with the default chunk size.
    pub fn new(assigner: Arc<dyn VolumeAssigner>, chunks: Arc<ChunkSet>) -> Self {
        Self::builder(assigner, chunks).build()
    }

    pub fn builder(assigner: Arc<dyn VolumeAssigner>, chunks: Arc<ChunkSet>) -> ChunkWriterBuilder {
        ChunkWriterBuilder {
            assigner,
            chunks,
            chunk_size: CHUNK_SIZE,
            retry: RetryPolicy::default(),
        }
    }

    /// Enqueues bytes for buffering and returns `b.len()` once the pipeline
    /// has accepted them. A zero-length write is a no-op.
    pub async fn write(&mut self, b: &[u8]) -> Result<usize> {
        if b.is_empty() {
            return Ok(0);
        }
        if self.closed {
            return Err(self.stored_or(ChunkError::Closed));
        }
        if let Some(err) = self.err.lock().clone() {
            return Err(err);
        }
        let tx = match &self.tx {
            Some(tx) => tx,
            None => return Err(ChunkError::Closed),
        };
        if tx.send(Bytes::copy_from_slice(b)).await.is_err() {
            // The uploader exited early; its stored error explains why.
            return Err(self.stored_or(ChunkError::Cancelled));
        }
        Ok(b.len())
    }

    /// Drains the queue, flushes any partial tail as a final smaller chunk,
    /// and returns the first error encountered, if any.
    ///
    /// The second and later calls return [`ChunkError::Closed`].
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(ChunkError::Closed);
        }
        self.closed = true;
        self.tx.take();
        let task = match self.task.take() {
            Some(task) => task,
            None => return Ok(()),
        };
        match task.await {
            Ok(result) => result,
            Err(_) => Err(ChunkError::Cancelled),
        }
    }

    /// The logical path being written.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn stored_or(&self, fallback: ChunkError) -> ChunkError {
        self.err.lock().clone().unwrap_or(fallback)
    }
}

pub struct ChunkWriterBuilder {
    assigner: Arc<dyn VolumeAssigner>,
    chunks: Arc<ChunkSet>,
    chunk_size: usize,
    retry: RetryPolicy,
}

impl ChunkWriterBuilder {
    /// Target chunk size in bytes. Zero selects the default (4 MiB).
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = if chunk_size == 0 { CHUNK_SIZE } else { chunk_size };
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn build(self) -> ChunkWriter {
        let path = self.chunks.path().to_string();
        let err = Arc::new(Mutex::new(None));
        let (tx, rx) = mpsc::channel(1);

        let uploader = Uploader {
            assigner: self.assigner,
            chunks: self.chunks,
            chunk_size: self.chunk_size,
            retry: self.retry,
            path: path.clone(),
            offset: 0,
        };
        let err_slot = Arc::clone(&err);
        let task = tokio::spawn(async move {
            let result = uploader.run(rx).await;
            if let Err(e) = &result {
                *err_slot.lock() = Some(e.clone());
            }
            result
        });

        ChunkWriter {
            path,
            tx: Some(tx),
            task: Some(task),
            err,
            closed: false,
        }
    }
}

struct Uploader {
    assigner: Arc<dyn VolumeAssigner>,
    chunks: Arc<ChunkSet>,
    chunk_size: usize,
    retry: RetryPolicy,
    path: String,
    offset: i64,
}

impl Uploader {
    async fn run(mut self, mut rx: mpsc::Receiver<Bytes>) -> Result<()> {
        let mut buf = pool::acquire(self.chunk_size);
        let result = self.pump(&mut rx, &mut buf).await;
        pool::release(buf);
        result
    }

    async fn pump(&mut self, rx: &mut mpsc::Receiver<Bytes>, buf: &mut BytesMut) -> Result<()> {
        while let Some(bytes) = rx.recv().await {
            buf.extend_from_slice(&bytes);
            while buf.len() >= self.chunk_size {
                let n = self.chunk_size;
                self.flush_chunk(buf, n).await?;
            }
        }
        // Queue closed: flush the residual tail as one final smaller chunk.
        if !buf.is_empty() {
            let n = buf.len();
            self.flush_chunk(buf, n).await?;
        }
        Ok(())
    }

    async fn flush_chunk(&mut self, buf: &mut BytesMut, n: usize) -> Result<()> {
        let assignment = self
            .assigner
            .assign_volume(&self.path)
            .await?;
        let content = buf.split_to(n).freeze();
        let result = self.upload(&assignment, content).await?;
        if !result.error.is_empty() {
            return Err(ChunkError::UpstreamFailure {
                status: 200,
                location: assignment.location.to_string(),
            });
        }

        let ts_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or_default();
        let chunk = result.file_chunk(&assignment.file_id, self.offset, ts_ns)?;
        self.chunks.add(&[chunk])?;

        debug!(
            path = %self.path,
            offset = self.offset,
            size = n,
            file_id = %assignment.file_id,
            "uploaded chunk"
        );
        self.offset += n as i64;
        Ok(())
    }

    async fn upload(
        &self,
        assignment: &VolumeAssignment,
        content: Bytes,
    ) -> Result<UploadResult> {
        let location = assignment.location.clone();
        let filename = escape_quotes(&self.path);
        let idempotency = HeaderValue::from_str(location.as_str()).map_err(|_| {
            ChunkError::InvalidArgument(format!("unusable assignment url: {location}"))
        })?;
        let offset = self.offset;

        let resp = retry_transport(&self.retry, || {
            let mut part_headers = HeaderMap::new();
            part_headers.insert(IDEMPOTENCY_KEY, idempotency.clone());
            let part = Part::stream(Body::from(content.clone()))
                .file_name(filename.clone())
                .headers(part_headers);
            let form = Form::new().part("file", part);
            client()
                .post(location.clone())
                .header(RANGE, format!("bytes={offset}-"))
                .multipart(form)
                .send()
        })
        .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ChunkError::UploadFailed {
                status: status.as_u16(),
                location: location.to_string(),
            });
        }
        decode_upload_response(resp).await
    }
}

fn escape_quotes(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_quote_escaping() {
        assert_eq!(escape_quotes("/buckets/a/b.txt"), "/buckets/a/b.txt");
        assert_eq!(escape_quotes(r#"/a/"b".txt"#), r#"/a/\"b\".txt"#);
        assert_eq!(escape_quotes(r"/a/b\c"), r"/a/b\\c");
    }
}
