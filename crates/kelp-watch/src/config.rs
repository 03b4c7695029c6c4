//! Subscription configuration.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use kelp_proto::SubscribeRequest;
use serde::{Deserialize, Serialize};

use crate::error::WatchError;

/// Which flavor of metadata subscription to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionMode {
    /// Changes observed by the connected filer only.
    Local,
    /// Changes replicated across the cluster.
    Remote,
}

impl FromStr for SubscriptionMode {
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(SubscriptionMode::Local),
            "remote" => Ok(SubscriptionMode::Remote),
            other => Err(WatchError::Unsupported(other.to_string())),
        }
    }
}

impl fmt::Display for SubscriptionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionMode::Local => f.write_str("local"),
            SubscriptionMode::Remote => f.write_str("remote"),
        }
    }
}

/// Digest algorithms the pipeline can compute. SHA-256 is always computed
/// whether or not it is listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Adler32,
    Md5,
    Sha256,
}

impl FromStr for HashAlgorithm {
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "adler32" => Ok(HashAlgorithm::Adler32),
            "md5" => Ok(HashAlgorithm::Md5),
            "sha256" => Ok(HashAlgorithm::Sha256),
            other => Err(WatchError::UnsupportedHashAlgorithm(other.to_string())),
        }
    }
}

/// Configuration for a metadata event subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Client id reported to the metadata server.
    #[serde(default)]
    pub client_id: i32,

    /// Client name reported to the metadata server.
    #[serde(default = "default_client_name")]
    pub client_name: String,

    /// Signature identifying this subscriber's own writes.
    #[serde(default)]
    pub signature: i32,

    /// Subtree the subscription is restricted to.
    pub path_prefix: String,

    /// Additional subtrees to watch.
    #[serde(default)]
    pub path_prefixes: Vec<String>,

    #[serde(default = "default_subscription")]
    pub subscription: SubscriptionMode,

    /// Timestamp to start replay from, nanoseconds since epoch. Zero means
    /// "from now".
    #[serde(default)]
    pub time_offset_begin_ns: i64,

    /// Timestamp to stop at, nanoseconds since epoch. Zero, or any value at
    /// or before the begin offset, means unbounded.
    #[serde(default)]
    pub time_offset_end_ns: i64,

    /// Extra digests to compute per file; SHA-256 is always included.
    #[serde(default)]
    pub hash_algorithms: Vec<HashAlgorithm>,

    /// Namespaces whose events are dropped.
    #[serde(default)]
    pub namespace_excludes: HashSet<String>,

    /// Target chunk size for writers, bytes.
    #[serde(default = "default_writer_chunk_size")]
    pub writer_chunk_size: usize,

    /// Prefetch depth for chunk readers.
    #[serde(default = "default_writer_concurrency")]
    pub writer_concurrency: usize,
}

impl WatchConfig {
    /// A configuration watching `path_prefix` with all defaults.
    pub fn for_prefix(path_prefix: impl Into<String>) -> Self {
        Self {
            client_id: 0,
            client_name: default_client_name(),
            signature: 0,
            path_prefix: path_prefix.into(),
            path_prefixes: Vec::new(),
            subscription: default_subscription(),
            time_offset_begin_ns: 0,
            time_offset_end_ns: 0,
            hash_algorithms: Vec::new(),
            namespace_excludes: HashSet::new(),
            writer_chunk_size: default_writer_chunk_size(),
            writer_concurrency: default_writer_concurrency(),
        }
    }

    /// Builds the subscribe request this configuration describes.
    pub fn subscribe_request(&self) -> SubscribeRequest {
        let until_ns = if self.time_offset_end_ns > self.time_offset_begin_ns {
            self.time_offset_end_ns
        } else {
            0
        };
        SubscribeRequest {
            client_id: self.client_id,
            client_name: self.client_name.clone(),
            path_prefix: self.path_prefix.clone(),
            path_prefixes: self.path_prefixes.clone(),
            signature: self.signature,
            since_ns: self.time_offset_begin_ns,
            until_ns,
        }
    }
}

fn default_client_name() -> String {
    "kelp-watch".to_string()
}

fn default_subscription() -> SubscriptionMode {
    SubscriptionMode::Local
}

fn default_writer_chunk_size() -> usize {
    kelp_chunk::CHUNK_SIZE
}

fn default_writer_concurrency() -> usize {
    kelp_chunk::DEFAULT_QUEUE_SIZE
}
