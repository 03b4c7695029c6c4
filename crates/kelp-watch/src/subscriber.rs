//! The metadata subscription client.

use futures::StreamExt;
use kelp_filer::{FilerRpc, NotificationStream};
use kelp_proto::{SubscribeRequest, SubscribeResponse};
use parking_lot::RwLock;
use tracing::debug;

use crate::config::{SubscriptionMode, WatchConfig};
use crate::error::{Result, WatchError};

/// A long-lived, ordered stream of metadata notifications with a replay
/// cursor.
///
/// Every received notification advances the cursor past its timestamp, so a
/// reconnect with [`MetadataSubscriber::resume_request`] resumes exactly
/// after the last observed change. The cursor is in-memory only; a process
/// restart replays from the configured begin offset.
pub struct MetadataSubscriber {
    stream: NotificationStream,
    request: SubscribeRequest,
    cursor: RwLock<i64>,
}

impl MetadataSubscriber {
    /// Opens the subscription flavor selected by the configuration.
    pub async fn open(rpc: &dyn FilerRpc, config: &WatchConfig) -> Result<Self> {
        let request = config.subscribe_request();
        debug!(
            client_name = %request.client_name,
            path_prefix = %request.path_prefix,
            subscription = %config.subscription,
            since_ns = request.since_ns,
            "opening metadata subscription"
        );

        let stream = match config.subscription {
            SubscriptionMode::Local => rpc.subscribe_local_metadata(request.clone()).await,
            SubscriptionMode::Remote => rpc.subscribe_metadata(request.clone()).await,
        }
        .map_err(WatchError::Stream)?;

        let cursor = request.since_ns;
        Ok(Self {
            stream,
            request,
            cursor: RwLock::new(cursor),
        })
    }

    /// Receives the next notification, advancing the replay cursor past its
    /// timestamp. Returns `None` at end of stream.
    pub async fn recv(&mut self) -> Result<Option<SubscribeResponse>> {
        match self.stream.next().await {
            None => Ok(None),
            Some(Err(status)) => Err(WatchError::Stream(status)),
            Some(Ok(resp)) => {
                *self.cursor.write() = resp.ts_ns + 1;
                Ok(Some(resp))
            }
        }
    }

    /// The request a reconnect should use to resume after the last observed
    /// notification.
    pub fn resume_request(&self) -> SubscribeRequest {
        SubscribeRequest {
            since_ns: *self.cursor.read(),
            ..self.request.clone()
        }
    }
}
