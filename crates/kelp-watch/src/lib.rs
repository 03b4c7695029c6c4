//! Metadata event pipeline for the kelp client.
//!
//! The metadata server streams a notification for every change under a path
//! prefix. This crate turns that stream into typed storage events for
//! downstream consumers:
//!
//! ```text
//! subscription stream ──► skip synthetic parents ──► resolve old/new entry
//!                                                          │
//!            namespace excludes ◄── catalog lookup ◄───────┘
//!                     │
//!                     ├── fragment (*.part) ──► event, no hashing
//!                     │
//!                     └── file ──► stat (retried) ──► chunk reader ──► digests
//!                                                          │
//!                                              content address (optional)
//!                                                          │
//!                                                          ▼
//!                                              creation | change | deletion
//! ```
//!
//! [`Watcher::run`] drives the loop and hands back a channel of
//! [`StorageEvent`]s; the channel closes when the subscription ends or the
//! caller cancels. Per-notification failures are logged and skipped so one
//! bad entry cannot stall the stream; a failing stream terminates the loop.

pub mod catalog;
pub mod config;
pub mod error;
pub mod event;
pub mod hash;
pub mod subscriber;
pub mod watcher;

pub use catalog::{CatalogEntry, CatalogService, ContentAddressService};
pub use config::{HashAlgorithm, SubscriptionMode, WatchConfig};
pub use error::{Result, WatchError};
pub use event::{Digests, EventType, FileMetadata, StorageEvent, FRAGMENT_NAMESPACE_SUFFIX};
pub use subscriber::MetadataSubscriber;
pub use watcher::Watcher;
