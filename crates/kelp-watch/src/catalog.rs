//! Namespace catalog and content-address collaborators.

use async_trait::async_trait;

use crate::error::Result;

/// Classification of a path by the catalog.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    /// Logical grouping used for event filtering.
    pub namespace: String,
    /// Whether content identifiers should be computed for this namespace.
    pub content_address_enabled: bool,
}

/// Maps entry paths to their catalog namespace.
#[async_trait]
pub trait CatalogService: Send + Sync {
    async fn find(&self, path: &str) -> Result<CatalogEntry>;
}

/// Derives a content identifier by adding a file to an external
/// content-addressed store.
#[async_trait]
pub trait ContentAddressService: Send + Sync {
    async fn add(&self, path: &str) -> Result<String>;
}
