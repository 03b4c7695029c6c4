//! The metadata event pipeline.

use std::sync::Arc;

use kelp_chunk::{ChunkReader, RetryPolicy, VolumeLocator};
use kelp_filer::{Entry, Filer, Master};
use kelp_proto as proto;
use kelp_proto::SubscribeResponse;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::catalog::{CatalogEntry, CatalogService, ContentAddressService};
use crate::config::WatchConfig;
use crate::error::{Result, WatchError};
use crate::event::{EventType, FileMetadata, StorageEvent, FRAGMENT_NAMESPACE_SUFFIX};
use crate::hash::DigestWriter;
use crate::subscriber::MetadataSubscriber;

/// Stat attempts before giving up on a just-written entry.
const STAT_MAX_ATTEMPTS: usize = 5;

/// Subscribes to metadata changes and emits typed storage events.
///
/// One notification produces zero, one, or two events, in the order
/// (deletion for old, creation/change for new). Notifications are processed
/// strictly in receive order. A failure while preparing a notification drops
/// the whole notification, never a partial emission.
#[derive(Clone)]
pub struct Watcher {
    filer: Arc<Filer>,
    master: Arc<Master>,
    catalog: Arc<dyn CatalogService>,
    content_address: Option<Arc<dyn ContentAddressService>>,
    config: WatchConfig,
}

impl Watcher {
    pub fn builder() -> WatcherBuilder {
        WatcherBuilder::default()
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Opens the subscription and spawns the processing loop.
    ///
    /// The returned channel yields events until the subscription terminates
    /// or `token` is cancelled; either way the channel closes. Per-
    /// notification failures are logged and skipped, a stream failure ends
    /// the loop.
    pub async fn run(&self, token: CancellationToken) -> Result<mpsc::Receiver<StorageEvent>> {
        let rpc = self.filer.rpc();
        let mut subscriber = MetadataSubscriber::open(rpc.as_ref(), &self.config).await?;
        debug!(path_prefix = %self.config.path_prefix, "begin listening for metadata events");

        let (tx, rx) = mpsc::channel(16);
        let watcher = self.clone();
        tokio::spawn(async move {
            let root = watcher.filer.root().path().as_str().to_string();
            loop {
                let received = tokio::select! {
                    _ = token.cancelled() => {
                        debug!("event pipeline cancelled");
                        return;
                    }
                    received = subscriber.recv() => received,
                };
                let resp = match received {
                    Ok(Some(resp)) => resp,
                    Ok(None) => {
                        warn!("terminating event stream");
                        return;
                    }
                    Err(err) => {
                        error!(error = %err, "could not receive event on stream");
                        return;
                    }
                };

                let directory = resp.directory.clone();
                if directory == watcher.config.path_prefix || directory == root {
                    trace!(directory = %directory, "skipping event for directory");
                    continue;
                }

                let events = match watcher.prepare_events(&resp).await {
                    Ok(events) => events,
                    Err(err) => {
                        error!(directory = %directory, error = %err, "could not prepare events");
                        continue;
                    }
                };
                for event in events {
                    tokio::select! {
                        _ = token.cancelled() => return,
                        sent = tx.send(event) => {
                            if sent.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        });
        Ok(rx)
    }

    /// Turns one notification into its storage events.
    async fn prepare_events(&self, resp: &SubscribeResponse) -> Result<Vec<StorageEvent>> {
        let notification = resp.notification.clone().unwrap_or_default();
        let old_entry = self.resolve_entry(&resp.directory, notification.old_entry)?;
        let new_entry = self.resolve_entry(&notification.new_parent_path, notification.new_entry)?;

        let mut events = Vec::new();

        if let Some(old) = &old_entry {
            if !old.path().is_temp_resource() && !old.path().is_system_resource() {
                let catalog = self.catalog.find(old.path().as_str()).await?;
                if !self.config.namespace_excludes.contains(&catalog.namespace) {
                    // The old entry is gone from its path when the entry was
                    // removed outright, renamed away, or replaced by a
                    // directory.
                    let displaced = match &new_entry {
                        None => true,
                        Some(new) => {
                            new.is_dir()
                                || old.path() != new.path()
                                || old.name() != new.name()
                        }
                    };
                    if displaced {
                        events.push(
                            self.prepare_event(&catalog, old, EventType::Deletion)
                                .await?,
                        );
                    }
                }
            }
        }

        if let Some(new) = &new_entry {
            if !new.path().is_temp_resource() && !new.path().is_system_resource() {
                let event_type = match &old_entry {
                    Some(old) if !old.is_dir() && old.path() == new.path() => EventType::Change,
                    _ => EventType::Creation,
                };
                let catalog = self.catalog.find(new.path().as_str()).await?;
                if !self.config.namespace_excludes.contains(&catalog.namespace) {
                    events.push(self.prepare_event(&catalog, new, event_type).await?);
                }
            }
        }
        Ok(events)
    }

    /// Builds the event for one entry, hashing and content-addressing file
    /// content where it still exists.
    async fn prepare_event(
        &self,
        catalog: &CatalogEntry,
        entry: &Entry,
        event_type: EventType,
    ) -> Result<StorageEvent> {
        let mut metadata = FileMetadata::from_entry(entry);

        // Fragments need no further processing.
        if entry.path().is_file_fragment() {
            return Ok(StorageEvent::new(
                event_type,
                format!("{}{}", catalog.namespace, FRAGMENT_NAMESPACE_SUFFIX),
                metadata,
            ));
        }

        if !entry.is_dir() && event_type != EventType::Deletion {
            if catalog.content_address_enabled {
                if let Some(content_address) = &self.content_address {
                    metadata.cid =
                        Some(content_address.add(entry.path().as_str()).await?);
                }
            }

            let (digests, size) = self.hash_entry(entry.path().as_str()).await?;
            metadata.hash = Some(digests);
            metadata.size = size;
        }

        debug!(
            path = %metadata.path,
            size = metadata.size,
            namespace = %catalog.namespace,
            "generated event metadata"
        );
        Ok(StorageEvent::new(
            event_type,
            catalog.namespace.clone(),
            metadata,
        ))
    }

    /// Streams the file's bytes through the configured digest set.
    ///
    /// The entry is re-stat'ed first, with bounded backoff, to tolerate
    /// notifications arriving before the write is fully visible.
    async fn hash_entry(&self, path: &str) -> Result<(crate::event::Digests, i64)> {
        let entry = self.stat_with_retry(path).await?;
        let locator: Arc<dyn VolumeLocator> = self.master.clone() as Arc<dyn VolumeLocator>;
        let mut reader = ChunkReader::builder(locator, entry.chunks())
            .queue_size(self.config.writer_concurrency)
            .build()?;

        let mut digests = DigestWriter::new(&self.config.hash_algorithms);
        let mut buf = vec![0u8; 64 * 1024];
        let mut size: i64 = 0;
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            digests.update(&buf[..n]);
            size += n as i64;
        }
        reader.close()?;
        Ok((digests.finalize(), size))
    }

    async fn stat_with_retry(&self, path: &str) -> Result<Entry> {
        let retry = RetryPolicy::default();
        let mut attempt = 0;
        loop {
            match self.filer.stat(path).await {
                Ok(entry) => return Ok(entry),
                Err(err) => {
                    if attempt + 1 >= STAT_MAX_ATTEMPTS {
                        return Err(err.into());
                    }
                    trace!(path, attempt, error = %err, "retrying stat");
                    tokio::time::sleep(retry.backoff(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Resolves a notification-side wire entry into a filer entry. An entry
    /// that does not resolve to an existing path is `None`, not an error.
    fn resolve_entry(
        &self,
        directory: &str,
        pb: Option<proto::Entry>,
    ) -> Result<Option<Entry>> {
        let Some(pb) = pb else {
            return Ok(None);
        };
        let mut directory = directory.trim();
        if directory.starts_with(&self.config.path_prefix) && !directory.is_empty() {
            directory = &directory[1..];
        }
        if directory.is_empty() {
            return Ok(None);
        }
        match self.filer.new_entry(directory, pb) {
            Ok(entry) => Ok(Some(entry)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

#[derive(Default)]
pub struct WatcherBuilder {
    filer: Option<Arc<Filer>>,
    master: Option<Arc<Master>>,
    catalog: Option<Arc<dyn CatalogService>>,
    content_address: Option<Arc<dyn ContentAddressService>>,
    config: Option<WatchConfig>,
}

impl WatcherBuilder {
    pub fn filer(mut self, filer: Arc<Filer>) -> Self {
        self.filer = Some(filer);
        self
    }

    pub fn master(mut self, master: Arc<Master>) -> Self {
        self.master = Some(master);
        self
    }

    pub fn catalog(mut self, catalog: Arc<dyn CatalogService>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Enables content addressing. Identifiers are still only computed for
    /// namespaces the catalog enables it for.
    pub fn content_address(mut self, service: Arc<dyn ContentAddressService>) -> Self {
        self.content_address = Some(service);
        self
    }

    pub fn config(mut self, config: WatchConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Result<Watcher> {
        let filer = self
            .filer
            .ok_or_else(|| WatchError::InvalidConfig("a filer client is required".to_string()))?;
        let master = self
            .master
            .ok_or_else(|| WatchError::InvalidConfig("a master client is required".to_string()))?;
        let catalog = self
            .catalog
            .ok_or_else(|| WatchError::InvalidConfig("a catalog service is required".to_string()))?;
        let config = self
            .config
            .ok_or_else(|| WatchError::InvalidConfig("a watch configuration is required".to_string()))?;
        if config.path_prefix.trim().is_empty() {
            return Err(WatchError::InvalidConfig(
                "a path prefix for watch events is required".to_string(),
            ));
        }
        Ok(Watcher {
            filer,
            master,
            catalog,
            content_address: self.content_address,
            config,
        })
    }
}
