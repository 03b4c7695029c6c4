//! Client facade for the metadata (filer) server.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use kelp_chunk::{ChunkError, VolumeAssigner, VolumeAssignment};
use kelp_proto as proto;
use kelp_proto::{
    AssignVolumeRequest, CreateEntryRequest, DeleteEntryRequest, FilerConfiguration,
    LookupEntryRequest, RenameEntryRequest, UpdateEntryRequest,
};
use tonic::{Code, Status};
use tracing::{debug, trace};
use url::Url;

use crate::entry::{new_pb_entry, Entry};
use crate::error::{FilerError, Result};
use crate::path::{clean, FilerPath};
use crate::rpc::FilerRpc;

/// Some filer builds report a missing entry as `Unknown` with this message
/// instead of a proper `NotFound` code.
const NOT_FOUND_MESSAGE: &str = "no entry is found";

/// The root of the filer namespace as seen by this client: the buckets
/// directory the server reported at connect time.
#[derive(Debug, Clone)]
pub struct Root {
    path: FilerPath,
    pb: proto::Entry,
}

impl Root {
    pub fn path(&self) -> &FilerPath {
        &self.path
    }

    pub fn name(&self) -> &str {
        self.path.name()
    }

    pub fn uid(&self) -> u32 {
        self.pb
            .attributes
            .as_ref()
            .map(|a| a.uid)
            .unwrap_or_default()
    }

    pub fn gid(&self) -> u32 {
        self.pb
            .attributes
            .as_ref()
            .map(|a| a.gid)
            .unwrap_or_default()
    }

    /// A fresh [`Entry`] for the root directory.
    pub fn entry(&self) -> Result<Entry> {
        Entry::new(self.path.clone(), self.pb.clone())
    }
}

/// API client for entry-level operations on a filer server.
///
/// Operations tag their errors with the operation name (`stat`, `create`,
/// `update`, `remove`, `rename`, `assign`) and map the server's not-found
/// shapes onto [`FilerError::NotFound`].
pub struct Filer {
    rpc: Arc<dyn FilerRpc>,
    config: FilerConfiguration,
    root: Root,
    signature: i32,
    closed: AtomicBool,
}

impl Filer {
    /// Connects the facade: fetches the server configuration and resolves
    /// the root entry from its buckets directory.
    pub async fn connect(rpc: Arc<dyn FilerRpc>) -> Result<Self> {
        let config = rpc
            .get_configuration()
            .await
            .map_err(|status| FilerError::Upstream {
                op: "connect",
                status,
            })?;

        let root_path = FilerPath::new(clean(&config.dir_buckets));
        let resp = rpc
            .lookup_entry(LookupEntryRequest {
                directory: config.dir_buckets.clone(),
                name: String::new(),
            })
            .await
            .map_err(|status| map_status("connect", root_path.as_str(), status))?;
        let pb = resp.entry.ok_or_else(|| FilerError::NotFound {
            op: "connect",
            path: root_path.as_str().to_string(),
        })?;

        let signature = config.signature;
        debug!(root = %root_path, signature, "connected filer client");
        Ok(Self {
            rpc,
            config,
            root: Root {
                path: root_path,
                pb,
            },
            signature,
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &FilerConfiguration {
        &self.config
    }

    pub fn root(&self) -> &Root {
        &self.root
    }

    pub fn rpc(&self) -> Arc<dyn FilerRpc> {
        Arc::clone(&self.rpc)
    }

    /// Marks the client closed. The second call reports [`FilerError::Closed`].
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(FilerError::Closed);
        }
        Ok(())
    }

    /// Returns the entry describing the named file or directory.
    pub async fn stat(&self, name: &str) -> Result<Entry> {
        if name == self.root.name() {
            return self.root.entry();
        }
        let path = self.resolve(name);
        trace!(name, path = %path, "stat");

        let resp = self
            .rpc
            .lookup_entry(LookupEntryRequest {
                directory: path.dir().to_string(),
                name: path.name().to_string(),
            })
            .await
            .map_err(|status| map_status("stat", path.as_str(), status))?;

        match resp.entry {
            Some(pb) => Entry::new(path, pb),
            None => Err(FilerError::NotFound {
                op: "stat",
                path: path.as_str().to_string(),
            }),
        }
    }

    /// Creates a new entry. Fails with [`FilerError::AlreadyExists`] when the
    /// name is taken.
    pub async fn create(&self, name: &str, mode: u32, is_dir: bool) -> Result<Entry> {
        match self.stat(name).await {
            Ok(_) => {
                return Err(FilerError::AlreadyExists {
                    op: "create",
                    path: self.resolve(name).as_str().to_string(),
                })
            }
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }

        let path = self.resolve(name);
        trace!(name, path = %path, is_dir, mode, "create");

        let pb = new_pb_entry(path.name(), mode, is_dir, self.root.uid(), self.root.gid());
        let resp = self
            .rpc
            .create_entry(CreateEntryRequest {
                directory: path.dir().to_string(),
                entry: Some(pb.clone()),
                signatures: vec![self.signature],
            })
            .await
            .map_err(|status| map_status("create", path.as_str(), status))?;
        if !resp.error.is_empty() {
            return Err(FilerError::Remote {
                op: "create",
                message: resp.error,
            });
        }
        Entry::new(path, pb)
    }

    /// Persists the entry's current metadata, including its chunk list.
    pub async fn update(&self, entry: &Entry) -> Result<()> {
        self.stat(entry.path().as_str()).await?;
        trace!(path = %entry.path(), size = entry.size(), "update");

        let pb = entry.refresh_mtime(now_secs());
        if pb.attributes.is_none() {
            return Err(FilerError::InvalidArgument {
                op: "update",
                message: "entry attributes are missing".to_string(),
            });
        }

        self.rpc
            .update_entry(UpdateEntryRequest {
                directory: entry.path().dir().to_string(),
                entry: Some(pb),
                signatures: vec![self.signature],
            })
            .await
            .map_err(|status| map_status("update", entry.path().as_str(), status))?;
        Ok(())
    }

    /// Removes the named entry, recursively for directories, and returns the
    /// entry that was removed.
    pub async fn remove(&self, name: &str) -> Result<Entry> {
        let entry = self.stat(name).await?;
        trace!(name, path = %entry.path(), "remove");

        let resp = self
            .rpc
            .delete_entry(DeleteEntryRequest {
                directory: entry.path().dir().to_string(),
                name: entry.path().name().to_string(),
                is_delete_data: true,
                is_recursive: entry.is_dir(),
                ignore_recursive_error: false,
                signatures: vec![self.signature],
            })
            .await
            .map_err(|status| map_status("remove", entry.path().as_str(), status))?;
        if !resp.error.is_empty() {
            return Err(FilerError::Remote {
                op: "remove",
                message: resp.error,
            });
        }
        Ok(entry)
    }

    /// Renames (moves) `old_name` to `new_name`. An existing non-directory
    /// target is replaced; a directory target is refused.
    pub async fn rename(&self, old_name: &str, new_name: &str) -> Result<()> {
        self.stat(old_name).await?;
        match self.stat(new_name).await {
            Ok(target) if target.is_dir() => {
                return Err(FilerError::AlreadyExists {
                    op: "rename",
                    path: target.path().as_str().to_string(),
                })
            }
            Ok(_) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }

        let old_path = self.resolve(old_name);
        let new_path = self.resolve(new_name);
        trace!(old = %old_path, new = %new_path, "rename");

        self.rpc
            .rename_entry(RenameEntryRequest {
                old_directory: old_path.dir().to_string(),
                old_name: old_path.name().to_string(),
                new_directory: new_path.dir().to_string(),
                new_name: new_path.name().to_string(),
            })
            .await
            .map_err(|status| map_status("rename", old_path.as_str(), status))?;
        Ok(())
    }

    /// Assigns a chunk of the file at `path` to a volume server, returning
    /// the file id and upload URL.
    pub async fn assign(&self, path: &str) -> Result<VolumeAssignment> {
        if path.trim().is_empty() {
            return Err(FilerError::InvalidArgument {
                op: "assign",
                message: "path is required for assigning a volume".to_string(),
            });
        }

        let resp = self
            .rpc
            .assign_volume(AssignVolumeRequest {
                count: 1,
                path: path.to_string(),
                collection: String::new(),
            })
            .await
            .map_err(|status| map_status("assign", path, status))?;
        if !resp.error.is_empty() {
            return Err(FilerError::Remote {
                op: "assign",
                message: resp.error,
            });
        }

        let location = resp.location.ok_or_else(|| FilerError::Remote {
            op: "assign",
            message: "assignment carries no volume location".to_string(),
        })?;
        let url = Url::parse(&format!("http://{}/{}", location.url, resp.file_id)).map_err(
            |err| FilerError::Remote {
                op: "assign",
                message: format!("unusable assignment location {}: {err}", location.url),
            },
        )?;
        trace!(path, file_id = %resp.file_id, location = %url, "assigned volume");
        Ok(VolumeAssignment {
            file_id: resp.file_id,
            location: url,
        })
    }

    /// Builds an [`Entry`] for a wire entry observed under `dir`, the way
    /// the event pipeline receives them.
    pub fn new_entry(&self, dir: &str, pb: proto::Entry) -> Result<Entry> {
        let dir = dir.trim();
        if dir.is_empty() {
            return Err(FilerError::InvalidArgument {
                op: "new_entry",
                message: "directory for entry is required".to_string(),
            });
        }
        if pb.attributes.is_none() {
            return Err(FilerError::InvalidArgument {
                op: "new_entry",
                message: "entry attributes are missing".to_string(),
            });
        }

        let name = if dir == self.root.name() {
            pb.name.clone()
        } else {
            format!("{}/{}", dir, pb.name)
        };
        let path = self.resolve(&name);
        trace!(dir, name = %path.name(), path = %path, "building entry ref");
        Entry::new(path, pb)
    }

    /// Normalizes a caller-supplied name into an absolute path anchored
    /// under the root.
    fn resolve(&self, name: &str) -> FilerPath {
        let cleaned = clean(name);
        let root = self.root.path.root();
        if cleaned.starts_with(&root) {
            FilerPath::new(cleaned)
        } else {
            FilerPath::new(format!("{root}{cleaned}"))
        }
    }
}

#[async_trait]
impl VolumeAssigner for Filer {
    async fn assign_volume(
        &self,
        path: &str,
    ) -> std::result::Result<VolumeAssignment, ChunkError> {
        self.assign(path)
            .await
            .map_err(|err| ChunkError::VolumeService(err.to_string()))
    }
}

fn map_status(op: &'static str, path: &str, status: Status) -> FilerError {
    match status.code() {
        Code::NotFound => FilerError::NotFound {
            op,
            path: path.to_string(),
        },
        Code::Unknown if status.message().contains(NOT_FOUND_MESSAGE) => FilerError::NotFound {
            op,
            path: path.to_string(),
        },
        _ => FilerError::Upstream { op, status },
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
