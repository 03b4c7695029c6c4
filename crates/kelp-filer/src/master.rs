//! Client facade for the master server.

use std::sync::Arc;

use async_trait::async_trait;
use kelp_chunk::{ChunkError, VolumeLocator};
use kelp_proto::LookupVolumeRequest;
use tracing::trace;
use url::Url;

use crate::error::{FilerError, Result};
use crate::rpc::MasterRpc;

/// API client for volume lookups against a master server.
pub struct Master {
    rpc: Arc<dyn MasterRpc>,
}

impl Master {
    pub fn new(rpc: Arc<dyn MasterRpc>) -> Self {
        Self { rpc }
    }

    /// Returns the data-node URLs holding the chunk named by `file_id`,
    /// which must have the `volume,needle` shape.
    pub async fn find_volumes(&self, collection: &str, file_id: &str) -> Result<Vec<Url>> {
        let (volume_id, _needle) =
            file_id
                .split_once(',')
                .ok_or_else(|| FilerError::InvalidArgument {
                    op: "lookup",
                    message: format!("invalid file id: {file_id}"),
                })?;

        let resp = self
            .rpc
            .lookup_volume(LookupVolumeRequest {
                volume_or_file_ids: vec![volume_id.to_string()],
                collection: collection.to_string(),
            })
            .await
            .map_err(|status| FilerError::Upstream {
                op: "lookup",
                status,
            })?;

        let locations = resp
            .volume_id_locations
            .first()
            .map(|l| l.locations.as_slice())
            .unwrap_or_default();
        if locations.is_empty() {
            return Err(FilerError::NotFound {
                op: "lookup",
                path: file_id.to_string(),
            });
        }

        let mut addrs = Vec::with_capacity(locations.len());
        for location in locations {
            addrs.push(volume_url(&location.url).map_err(|message| FilerError::Remote {
                op: "lookup",
                message,
            })?);
        }
        trace!(collection, file_id, volumes_found = addrs.len(), "located volumes");
        Ok(addrs)
    }
}

/// Volume locations usually arrive as bare `host:port`; some deployments
/// report full URLs.
fn volume_url(location: &str) -> std::result::Result<Url, String> {
    let candidate = if location.contains("://") {
        location.to_string()
    } else {
        format!("http://{location}")
    };
    Url::parse(&candidate).map_err(|err| format!("unusable volume location {location}: {err}"))
}

#[async_trait]
impl VolumeLocator for Master {
    async fn find_volumes(
        &self,
        collection: &str,
        file_id: &str,
    ) -> std::result::Result<Vec<Url>, ChunkError> {
        Master::find_volumes(self, collection, file_id)
            .await
            .map_err(|err| match err {
                FilerError::NotFound { path, .. } => ChunkError::VolumesNotFound(path),
                err => ChunkError::VolumeService(err.to_string()),
            })
    }
}
