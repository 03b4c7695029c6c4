//! Filer facade tests against an in-memory metadata server.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use kelp_chunk::{ChunkError, VolumeLocator};
use kelp_filer::{Filer, FilerError, FilerRpc, Master, MasterRpc, NotificationStream};
use kelp_proto::{
    AssignVolumeRequest, AssignVolumeResponse, CreateEntryRequest, CreateEntryResponse,
    DeleteEntryRequest, DeleteEntryResponse, Entry as PbEntry, EntryAttributes, FileChunk,
    FilerConfiguration, LookupEntryRequest, LookupEntryResponse, LookupVolumeRequest,
    LookupVolumeResponse, RenameEntryRequest, SubscribeRequest, UpdateEntryRequest,
    UpdateEntryResponse, VolumeIdLocation, VolumeLocation,
};
use parking_lot::Mutex;
use tonic::Status;

fn entry_key(directory: &str, name: &str) -> String {
    if name.is_empty() {
        directory.to_string()
    } else {
        format!("{}/{}", directory.trim_end_matches('/'), name)
    }
}

fn dir_entry(name: &str) -> PbEntry {
    PbEntry {
        name: name.to_string(),
        is_directory: true,
        chunks: vec![],
        attributes: Some(EntryAttributes {
            uid: 1000,
            gid: 1000,
            file_mode: 0o755,
            ..Default::default()
        }),
    }
}

#[derive(Default)]
struct MemoryFiler {
    entries: Mutex<HashMap<String, PbEntry>>,
    updates: Mutex<Vec<UpdateEntryRequest>>,
    assign_counter: AtomicU64,
    /// When set, missing entries are reported the way older servers do:
    /// `Unknown` with a "no entry is found" message.
    not_found_as_unknown: bool,
}

impl MemoryFiler {
    fn with_root() -> Arc<Self> {
        let filer = Self::default();
        filer
            .entries
            .lock()
            .insert("/buckets".to_string(), dir_entry("buckets"));
        Arc::new(filer)
    }

    fn missing(&self, key: &str) -> Status {
        if self.not_found_as_unknown {
            Status::unknown(format!("filer: no entry is found in filer store: {key}"))
        } else {
            Status::not_found(key.to_string())
        }
    }
}

#[async_trait]
impl FilerRpc for MemoryFiler {
    async fn get_configuration(&self) -> Result<FilerConfiguration, Status> {
        Ok(FilerConfiguration {
            dir_buckets: "/buckets".to_string(),
            masters: vec!["127.0.0.1:9333".to_string()],
            max_mb: 4,
            metrics_interval_sec: 0,
            signature: 77,
            version: "3.59".to_string(),
        })
    }

    async fn lookup_entry(
        &self,
        request: LookupEntryRequest,
    ) -> Result<LookupEntryResponse, Status> {
        let key = entry_key(&request.directory, &request.name);
        match self.entries.lock().get(&key) {
            Some(entry) => Ok(LookupEntryResponse {
                entry: Some(entry.clone()),
            }),
            None => Err(self.missing(&key)),
        }
    }

    async fn create_entry(
        &self,
        request: CreateEntryRequest,
    ) -> Result<CreateEntryResponse, Status> {
        let entry = request
            .entry
            .ok_or_else(|| Status::invalid_argument("entry required"))?;
        let key = entry_key(&request.directory, &entry.name);
        self.entries.lock().insert(key, entry);
        Ok(CreateEntryResponse {
            error: String::new(),
        })
    }

    async fn update_entry(
        &self,
        request: UpdateEntryRequest,
    ) -> Result<UpdateEntryResponse, Status> {
        let entry = request
            .entry
            .clone()
            .ok_or_else(|| Status::invalid_argument("entry required"))?;
        let key = entry_key(&request.directory, &entry.name);
        self.entries.lock().insert(key, entry);
        self.updates.lock().push(request);
        Ok(UpdateEntryResponse::default())
    }

    async fn delete_entry(
        &self,
        request: DeleteEntryRequest,
    ) -> Result<DeleteEntryResponse, Status> {
        let key = entry_key(&request.directory, &request.name);
        let mut entries = self.entries.lock();
        entries.remove(&key);
        if request.is_recursive {
            let prefix = format!("{key}/");
            entries.retain(|k, _| !k.starts_with(&prefix));
        }
        Ok(DeleteEntryResponse {
            error: String::new(),
        })
    }

    async fn rename_entry(&self, request: RenameEntryRequest) -> Result<(), Status> {
        let old_key = entry_key(&request.old_directory, &request.old_name);
        let mut entries = self.entries.lock();
        let mut entry = entries
            .remove(&old_key)
            .ok_or_else(|| Status::not_found(old_key))?;
        entry.name = request.new_name.clone();
        entries.insert(entry_key(&request.new_directory, &request.new_name), entry);
        Ok(())
    }

    async fn assign_volume(
        &self,
        _request: AssignVolumeRequest,
    ) -> Result<AssignVolumeResponse, Status> {
        let needle = self.assign_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(AssignVolumeResponse {
            file_id: format!("7,{needle:016x}aabbccdd"),
            location: Some(VolumeLocation {
                url: "127.0.0.1:8080".to_string(),
                public_url: "127.0.0.1:8080".to_string(),
            }),
            error: String::new(),
        })
    }

    async fn subscribe_local_metadata(
        &self,
        _request: SubscribeRequest,
    ) -> Result<NotificationStream, Status> {
        Err(Status::unimplemented("no subscriptions in this test server"))
    }

    async fn subscribe_metadata(
        &self,
        _request: SubscribeRequest,
    ) -> Result<NotificationStream, Status> {
        Err(Status::unimplemented("no subscriptions in this test server"))
    }
}

#[tokio::test]
async fn create_then_stat_round_trip() {
    let filer = Filer::connect(MemoryFiler::with_root()).await.unwrap();

    let created = filer.create("a/b.txt", 0o644, false).await.unwrap();
    assert_eq!(created.path().as_str(), "/buckets/a/b.txt");
    assert!(!created.is_dir());
    assert_eq!(created.size(), 0);
    assert!(created.chunks().is_empty());
    // Owner defaults come from the root entry.
    assert_eq!(created.uid(), 1000);
    assert_eq!(created.gid(), 1000);

    let stated = filer.stat("a/b.txt").await.unwrap();
    assert_eq!(stated.path(), created.path());
    assert_eq!(stated.size(), 0);
    assert!(!stated.is_dir());
    assert!(stated.chunks().is_empty());
}

#[tokio::test]
async fn create_existing_entry_is_rejected() {
    let filer = Filer::connect(MemoryFiler::with_root()).await.unwrap();
    filer.create("a/b.txt", 0o644, false).await.unwrap();
    let err = filer.create("a/b.txt", 0o644, false).await.unwrap_err();
    assert!(err.is_already_exists(), "got {err}");
}

#[tokio::test]
async fn stat_missing_maps_to_not_found() {
    let filer = Filer::connect(MemoryFiler::with_root()).await.unwrap();
    let err = filer.stat("a/missing.txt").await.unwrap_err();
    assert!(err.is_not_found(), "got {err}");
}

#[tokio::test]
async fn stat_missing_with_unknown_status_maps_to_not_found() {
    let rpc = MemoryFiler::with_root();
    let rpc = Arc::new(MemoryFiler {
        entries: Mutex::new(rpc.entries.lock().clone()),
        not_found_as_unknown: true,
        ..Default::default()
    });
    let filer = Filer::connect(rpc).await.unwrap();
    let err = filer.stat("a/missing.txt").await.unwrap_err();
    assert!(err.is_not_found(), "got {err}");
}

#[tokio::test]
async fn update_persists_the_chunk_list() {
    let rpc = MemoryFiler::with_root();
    let filer = Filer::connect(Arc::clone(&rpc) as Arc<dyn FilerRpc>)
        .await
        .unwrap();

    let entry = filer.create("a/data.bin", 0o644, false).await.unwrap();
    entry
        .chunks()
        .add(&[
            FileChunk {
                file_id: "7,01aabbccdd".to_string(),
                offset: 0,
                size: 4096,
                ..Default::default()
            },
            FileChunk {
                file_id: "7,02aabbccdd".to_string(),
                offset: 4096,
                size: 512,
                ..Default::default()
            },
        ])
        .unwrap();
    assert_eq!(entry.size(), 4608);

    filer.update(&entry).await.unwrap();

    let updates = rpc.updates.lock();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].signatures, vec![77]);
    let stored = updates[0].entry.as_ref().unwrap();
    assert_eq!(stored.chunks.len(), 2);
    assert_eq!(stored.attributes.as_ref().unwrap().file_size, 4608);
    drop(updates);

    let stated = filer.stat("a/data.bin").await.unwrap();
    assert_eq!(stated.size(), 4608);
    assert_eq!(stated.file_ids(), vec!["7,01aabbccdd", "7,02aabbccdd"]);
}

#[tokio::test]
async fn remove_deletes_the_entry() {
    let filer = Filer::connect(MemoryFiler::with_root()).await.unwrap();
    filer.create("a/b.txt", 0o644, false).await.unwrap();

    let removed = filer.remove("a/b.txt").await.unwrap();
    assert_eq!(removed.path().as_str(), "/buckets/a/b.txt");
    assert!(filer.stat("a/b.txt").await.unwrap_err().is_not_found());

    let err = filer.remove("a/b.txt").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn rename_moves_and_refuses_directory_targets() {
    let filer = Filer::connect(MemoryFiler::with_root()).await.unwrap();
    filer.create("a/b.txt", 0o644, false).await.unwrap();
    filer.create("a/dir", 0o755, true).await.unwrap();

    let err = filer.rename("a/b.txt", "a/dir").await.unwrap_err();
    assert!(err.is_already_exists(), "got {err}");

    filer.rename("a/b.txt", "a/c.txt").await.unwrap();
    assert!(filer.stat("a/b.txt").await.unwrap_err().is_not_found());
    assert_eq!(
        filer.stat("a/c.txt").await.unwrap().path().as_str(),
        "/buckets/a/c.txt"
    );
}

#[tokio::test]
async fn assign_builds_an_upload_url() {
    let filer = Filer::connect(MemoryFiler::with_root()).await.unwrap();
    let assignment = filer.assign("/buckets/a/b.txt").await.unwrap();
    assert!(assignment.file_id.starts_with("7,"));
    assert_eq!(
        assignment.location.as_str(),
        format!("http://127.0.0.1:8080/{}", assignment.file_id)
    );

    let err = filer.assign("  ").await.unwrap_err();
    assert!(matches!(err, FilerError::InvalidArgument { op: "assign", .. }));
}

#[tokio::test]
async fn new_entry_anchors_paths_under_the_root() {
    let filer = Filer::connect(MemoryFiler::with_root()).await.unwrap();
    let pb = PbEntry {
        name: "b.txt".to_string(),
        is_directory: false,
        chunks: vec![],
        attributes: Some(EntryAttributes::default()),
    };
    let entry = filer.new_entry("a", pb.clone()).unwrap();
    assert_eq!(entry.path().as_str(), "/buckets/a/b.txt");

    let err = filer
        .new_entry("a", PbEntry {
            attributes: None,
            ..pb
        })
        .unwrap_err();
    assert!(matches!(err, FilerError::InvalidArgument { .. }));
}

#[tokio::test]
async fn close_is_idempotent() {
    let filer = Filer::connect(MemoryFiler::with_root()).await.unwrap();
    filer.close().unwrap();
    assert!(matches!(filer.close(), Err(FilerError::Closed)));
}

struct MemoryMaster {
    locations: Vec<String>,
}

#[async_trait]
impl MasterRpc for MemoryMaster {
    async fn lookup_volume(
        &self,
        request: LookupVolumeRequest,
    ) -> Result<LookupVolumeResponse, Status> {
        Ok(LookupVolumeResponse {
            volume_id_locations: vec![VolumeIdLocation {
                volume_or_file_id: request.volume_or_file_ids[0].clone(),
                locations: self
                    .locations
                    .iter()
                    .map(|url| VolumeLocation {
                        url: url.clone(),
                        public_url: url.clone(),
                    })
                    .collect(),
                error: String::new(),
            }],
        })
    }
}

#[tokio::test]
async fn master_resolves_volume_urls() {
    let master = Master::new(Arc::new(MemoryMaster {
        locations: vec!["127.0.0.1:8080".to_string(), "10.0.0.2:8080".to_string()],
    }));
    let urls = master.find_volumes("", "7,01aabbccdd").await.unwrap();
    assert_eq!(urls.len(), 2);
    assert_eq!(urls[0].as_str(), "http://127.0.0.1:8080/");
}

#[tokio::test]
async fn master_rejects_malformed_file_ids() {
    let master = Master::new(Arc::new(MemoryMaster { locations: vec![] }));
    let err = Master::find_volumes(&master, "", "no-comma").await.unwrap_err();
    assert!(matches!(err, FilerError::InvalidArgument { .. }));
}

#[tokio::test]
async fn master_maps_empty_locations_to_volumes_not_found() {
    let master = Master::new(Arc::new(MemoryMaster { locations: vec![] }));
    let err = Master::find_volumes(&master, "", "7,01aabbccdd")
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    // Through the chunk layer's trait the same failure is VolumesNotFound.
    let err = VolumeLocator::find_volumes(&master, "", "7,01aabbccdd")
        .await
        .unwrap_err();
    assert!(matches!(err, ChunkError::VolumesNotFound(_)));
}
