//! Abstract RPC surfaces of the metadata and master servers.
//!
//! The cluster speaks gRPC; connection setup, readiness probing, and the
//! generated stubs are deliberately outside this workspace. The facades in
//! this crate consume these traits, and tests provide in-memory
//! implementations. Errors are `tonic::Status` so the facades can classify
//! failures by gRPC code the same way a generated client would.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use kelp_proto::{
    AssignVolumeRequest, AssignVolumeResponse, CreateEntryRequest, CreateEntryResponse,
    DeleteEntryRequest, DeleteEntryResponse, FilerConfiguration, LookupEntryRequest,
    LookupEntryResponse, LookupVolumeRequest, LookupVolumeResponse, RenameEntryRequest,
    SubscribeRequest, SubscribeResponse, UpdateEntryRequest, UpdateEntryResponse,
};
use tonic::Status;

pub type RpcResult<T> = std::result::Result<T, Status>;

/// Ordered, long-lived stream of metadata change notifications.
pub type NotificationStream =
    Pin<Box<dyn Stream<Item = RpcResult<SubscribeResponse>> + Send + 'static>>;

/// The metadata server's RPC surface as consumed by the client.
#[async_trait]
pub trait FilerRpc: Send + Sync {
    async fn get_configuration(&self) -> RpcResult<FilerConfiguration>;

    async fn lookup_entry(&self, request: LookupEntryRequest) -> RpcResult<LookupEntryResponse>;

    async fn create_entry(&self, request: CreateEntryRequest) -> RpcResult<CreateEntryResponse>;

    async fn update_entry(&self, request: UpdateEntryRequest) -> RpcResult<UpdateEntryResponse>;

    async fn delete_entry(&self, request: DeleteEntryRequest) -> RpcResult<DeleteEntryResponse>;

    async fn rename_entry(&self, request: RenameEntryRequest) -> RpcResult<()>;

    async fn assign_volume(&self, request: AssignVolumeRequest) -> RpcResult<AssignVolumeResponse>;

    /// Subscribes to changes observed by this filer only.
    async fn subscribe_local_metadata(
        &self,
        request: SubscribeRequest,
    ) -> RpcResult<NotificationStream>;

    /// Subscribes to changes replicated across the cluster.
    async fn subscribe_metadata(&self, request: SubscribeRequest)
        -> RpcResult<NotificationStream>;
}

/// The master server's RPC surface as consumed by the client.
#[async_trait]
pub trait MasterRpc: Send + Sync {
    async fn lookup_volume(&self, request: LookupVolumeRequest) -> RpcResult<LookupVolumeResponse>;
}
