//! End-to-end write/read tests against an in-process data node.

use std::collections::HashMap;
use std::io::SeekFrom;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use url::Url;

use kelp_chunk::{
    ChunkError, ChunkReader, ChunkSet, ChunkWriter, Result, VolumeAssigner, VolumeAssignment,
    VolumeLocator,
};

const MIB: usize = 1024 * 1024;

#[derive(Default)]
struct DataNode {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    fail_uploads: std::sync::atomic::AtomicBool,
}

async fn start_data_node() -> (Url, Arc<DataNode>) {
    let state = Arc::new(DataNode::default());
    let app = Router::new()
        .route("/:fid", post(upload).get(download))
        .layer(axum::extract::DefaultBodyLimit::max(16 * MIB))
        .with_state(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let base = Url::parse(&format!("http://{addr}")).unwrap();
    (base, state)
}

async fn upload(
    State(node): State<Arc<DataNode>>,
    Path(fid): Path<String>,
    mut multipart: Multipart,
) -> Response {
    if node.fail_uploads.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    let mut body = Vec::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        if field.name() == Some("file") {
            body = field.bytes().await.unwrap().to_vec();
        }
    }
    let size = body.len();
    node.blobs.lock().insert(fid, body);
    Json(serde_json::json!({
        "eTag": "test-etag",
        "size": size,
        "mime": "application/octet-stream",
    }))
    .into_response()
}

async fn download(
    State(node): State<Arc<DataNode>>,
    Path(fid): Path<String>,
    headers: HeaderMap,
) -> Response {
    let blobs = node.blobs.lock();
    let Some(blob) = blobs.get(&fid) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if let Some(range) = headers.get(header::RANGE).and_then(|v| v.to_str().ok()) {
        let Some(start) = parse_range_start(range) else {
            return StatusCode::BAD_REQUEST.into_response();
        };
        if start >= blob.len() {
            return StatusCode::RANGE_NOT_SATISFIABLE.into_response();
        }
        return (StatusCode::PARTIAL_CONTENT, blob[start..].to_vec()).into_response();
    }
    blob.clone().into_response()
}

fn parse_range_start(range: &str) -> Option<usize> {
    let ranges = range.strip_prefix("bytes=")?;
    let (start, _) = ranges.split_once('-')?;
    start.parse().ok()
}

struct NodeAssigner {
    base: Url,
    counter: AtomicU64,
}

impl NodeAssigner {
    fn new(base: Url) -> Arc<Self> {
        Arc::new(Self {
            base,
            counter: AtomicU64::new(0),
        })
    }
}

#[async_trait]
impl VolumeAssigner for NodeAssigner {
    async fn assign_volume(&self, _path: &str) -> Result<VolumeAssignment> {
        let needle = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let file_id = format!("3,{needle:016x}637037d6");
        let mut location = self.base.clone();
        location
            .path_segments_mut()
            .unwrap()
            .pop_if_empty()
            .push(&file_id);
        Ok(VolumeAssignment { file_id, location })
    }
}

struct NodeLocator {
    volumes: Vec<Url>,
}

#[async_trait]
impl VolumeLocator for NodeLocator {
    async fn find_volumes(&self, _collection: &str, _file_id: &str) -> Result<Vec<Url>> {
        Ok(self.volumes.clone())
    }
}

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

async fn read_exact(reader: &mut ChunkReader, len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    let mut read = 0;
    while read < len {
        let n = reader.read(&mut out[read..]).await.unwrap();
        assert!(n > 0, "unexpected end of stream at {read}/{len}");
        read += n;
    }
    out
}

#[tokio::test]
async fn write_then_read_round_trip() {
    let (base, _node) = start_data_node().await;
    let chunks = Arc::new(ChunkSet::new("/buckets/a/roundtrip.bin").unwrap());
    let data = payload(300 * 1024);

    let mut writer = ChunkWriter::builder(NodeAssigner::new(base.clone()), Arc::clone(&chunks))
        .chunk_size(64 * 1024)
        .build();
    // Uneven write sizes exercise the buffering threshold.
    for part in data.chunks(50 * 1024 + 13) {
        assert_eq!(writer.write(part).await.unwrap(), part.len());
    }
    writer.close().await.unwrap();

    assert_eq!(chunks.size(), data.len() as i64);
    assert_eq!(chunks.len(), 5);
    let listed = chunks.list();
    for (i, chunk) in listed.iter().enumerate() {
        assert_eq!(chunk.position(), i);
    }
    assert_eq!(listed[4].size(), (300 * 1024 - 4 * 64 * 1024) as i64);

    let locator = Arc::new(NodeLocator {
        volumes: vec![base],
    });
    let mut reader = ChunkReader::new(locator, chunks).unwrap();
    let read_back = reader.read_to_end().await.unwrap();
    assert_eq!(read_back, data);
    assert_eq!(reader.read(&mut [0u8; 16]).await.unwrap(), 0);
    reader.close().unwrap();
}

#[tokio::test]
async fn three_chunks_with_default_chunk_size() {
    let (base, _node) = start_data_node().await;
    let chunks = Arc::new(ChunkSet::new("/buckets/a/three.bin").unwrap());
    let data = payload(2 * 4 * MIB + 1024);

    let mut writer = ChunkWriter::new(NodeAssigner::new(base.clone()), Arc::clone(&chunks));
    writer.write(&data[..4 * MIB]).await.unwrap();
    writer.write(&data[4 * MIB..8 * MIB]).await.unwrap();
    writer.write(&data[8 * MIB..]).await.unwrap();
    writer.close().await.unwrap();

    let listed = chunks.list();
    assert_eq!(listed.len(), 3);
    assert_eq!(
        listed.iter().map(|c| c.position()).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    assert_eq!(
        listed.iter().map(|c| c.size()).collect::<Vec<_>>(),
        vec![4 * MIB as i64, 4 * MIB as i64, 1024]
    );
    assert_eq!(chunks.size(), 8_389_632);

    // Random access into the second chunk.
    let locator = Arc::new(NodeLocator {
        volumes: vec![base],
    });
    let mut reader = ChunkReader::new(locator, chunks).unwrap();
    let off = 4 * MIB + 100;
    assert_eq!(
        reader.seek(SeekFrom::Start(off as u64)).await.unwrap(),
        off as u64
    );
    let got = read_exact(&mut reader, 1024).await;
    assert_eq!(got, &data[off..off + 1024]);
}

#[tokio::test]
async fn seek_boundaries() {
    let (base, _node) = start_data_node().await;
    let chunks = Arc::new(ChunkSet::new("/buckets/a/seek.bin").unwrap());
    let data = payload(96 * 1024);

    let mut writer = ChunkWriter::builder(NodeAssigner::new(base.clone()), Arc::clone(&chunks))
        .chunk_size(32 * 1024)
        .build();
    writer.write(&data).await.unwrap();
    writer.close().await.unwrap();

    let locator = Arc::new(NodeLocator {
        volumes: vec![base],
    });
    let mut reader = ChunkReader::new(locator, chunks).unwrap();

    // Seek to exactly `size` succeeds and reads cleanly report end of stream.
    let size = data.len() as u64;
    assert_eq!(reader.seek(SeekFrom::Start(size)).await.unwrap(), size);
    assert_eq!(reader.read(&mut [0u8; 8]).await.unwrap(), 0);

    // A short read near the end returns the available bytes.
    let tail_start = data.len() - 100;
    reader.seek(SeekFrom::Start(tail_start as u64)).await.unwrap();
    let mut buf = vec![0u8; 4096];
    let n = reader.read(&mut buf).await.unwrap();
    assert_eq!(n, 100);
    assert_eq!(&buf[..n], &data[tail_start..]);
    assert_eq!(reader.read(&mut buf).await.unwrap(), 0);

    // Negative positions are rejected.
    assert!(matches!(
        reader.seek(SeekFrom::End(-(data.len() as i64) - 1)).await,
        Err(ChunkError::InvalidArgument(_))
    ));

    // Seeking backwards re-initializes at the owning chunk.
    reader.seek(SeekFrom::Start(40 * 1024)).await.unwrap();
    let got = read_exact(&mut reader, 8 * 1024).await;
    assert_eq!(got, &data[40 * 1024..48 * 1024]);
}

#[tokio::test]
async fn close_is_idempotent() {
    let (base, _node) = start_data_node().await;
    let chunks = Arc::new(ChunkSet::new("/buckets/a/close.bin").unwrap());

    let mut writer = ChunkWriter::new(NodeAssigner::new(base.clone()), Arc::clone(&chunks));
    assert_eq!(writer.write(&[]).await.unwrap(), 0);
    writer.write(b"tail").await.unwrap();
    writer.close().await.unwrap();
    assert!(matches!(writer.close().await, Err(ChunkError::Closed)));
    assert_eq!(chunks.len(), 1);

    let locator = Arc::new(NodeLocator {
        volumes: vec![base],
    });
    let mut reader = ChunkReader::new(locator, chunks).unwrap();
    reader.close().unwrap();
    assert!(matches!(reader.close(), Err(ChunkError::Closed)));
}

#[tokio::test]
async fn failed_upload_poisons_the_writer() {
    let (base, node) = start_data_node().await;
    node.fail_uploads.store(true, Ordering::SeqCst);

    let chunks = Arc::new(ChunkSet::new("/buckets/a/fail.bin").unwrap());
    let mut writer = ChunkWriter::builder(NodeAssigner::new(base), Arc::clone(&chunks))
        .chunk_size(16 * 1024)
        .build();

    // The write itself may be accepted into the queue; the failure surfaces
    // at close at the latest.
    let _ = writer.write(&payload(64 * 1024)).await;
    let err = writer.close().await.unwrap_err();
    assert!(matches!(err, ChunkError::UploadFailed { status: 500, .. }));

    // Nothing from the failed upload landed in the chunk set.
    assert_eq!(chunks.len(), 0);

    // The writer stays poisoned with the stored error.
    assert!(matches!(
        writer.write(b"more").await,
        Err(ChunkError::UploadFailed { .. })
    ));
}

#[tokio::test]
async fn truncated_chunk_is_a_content_length_mismatch() {
    let (base, node) = start_data_node().await;
    let chunks = Arc::new(ChunkSet::new("/buckets/a/torn.bin").unwrap());
    let data = payload(32 * 1024);

    let mut writer = ChunkWriter::builder(NodeAssigner::new(base.clone()), Arc::clone(&chunks))
        .chunk_size(16 * 1024)
        .build();
    writer.write(&data).await.unwrap();
    writer.close().await.unwrap();

    // Corrupt one stored blob behind the reader's back.
    {
        let mut blobs = node.blobs.lock();
        let fid = chunks.list()[1].file_id().to_string();
        blobs.get_mut(&fid).unwrap().truncate(10);
    }

    let locator = Arc::new(NodeLocator {
        volumes: vec![base],
    });
    let mut reader = ChunkReader::new(locator, chunks).unwrap();
    let err = reader.read_to_end().await.unwrap_err();
    assert!(matches!(err, ChunkError::ContentLengthMismatch { .. }));

    // The error sticks.
    assert!(matches!(
        reader.read(&mut [0u8; 8]).await,
        Err(ChunkError::ContentLengthMismatch { .. })
    ));
}

#[tokio::test]
async fn missing_volumes_surface_as_volumes_not_found() {
    let (base, _node) = start_data_node().await;
    let chunks = Arc::new(ChunkSet::new("/buckets/a/lost.bin").unwrap());

    let mut writer = ChunkWriter::new(NodeAssigner::new(base), Arc::clone(&chunks));
    writer.write(b"orphaned").await.unwrap();
    writer.close().await.unwrap();

    let locator = Arc::new(NodeLocator { volumes: vec![] });
    let mut reader = ChunkReader::new(locator, chunks).unwrap();
    assert!(matches!(
        reader.read_to_end().await,
        Err(ChunkError::VolumesNotFound(_))
    ));
}

#[tokio::test]
async fn empty_file_reads_as_eof() {
    let (base, _node) = start_data_node().await;
    let chunks = Arc::new(ChunkSet::new("/buckets/a/empty.bin").unwrap());

    let mut writer = ChunkWriter::new(NodeAssigner::new(base.clone()), Arc::clone(&chunks));
    writer.close().await.unwrap();
    assert_eq!(chunks.len(), 0);

    let locator = Arc::new(NodeLocator {
        volumes: vec![base],
    });
    let mut reader = ChunkReader::new(locator, chunks).unwrap();
    assert_eq!(reader.read(&mut [0u8; 8]).await.unwrap(), 0);
}
